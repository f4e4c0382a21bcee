//! Rule engine: selects cached messages that should leave the inbox.
//!
//! Each rule reads an immutable [`Snapshot`] of the mirror and returns the
//! sequence numbers it wants moved. Rules never see each other's output;
//! [`RuleSet::classify`] unions them.
//!
//! Shared building blocks:
//! - [`filter`] / [`group_by`] / [`threads`]: select a bot's messages and
//!   split them per pull request, keeping mirror order inside each group
//! - [`sort_newest_first`] / [`sort_oldest_first`]: stable date ordering
//! - [`PatternSet`] / [`SeenKeys`]: declarative body matchers and
//!   first-occurrence bookkeeping

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::RulesConfig;
use crate::mailbox::{Address, Entry, Message, SequenceSet, Snapshot};

pub mod build_status;
pub mod ci_robot;
pub mod merge_robot;
pub mod patterns;
pub mod slash_commands;

pub use build_status::BuildStatus;
pub use ci_robot::CiRobot;
pub use merge_robot::MergeRobot;
pub use patterns::{PatternSet, SeenKeys};
pub use slash_commands::SlashCommands;

/// GitHub appends ` (#1234)` to notification subjects about pull requests.
static PULL_REQUEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" \(#(\d+)\)$").expect("pull request pattern"));

/// A classification policy over the mirror.
pub trait Rule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Sequence numbers to discard. Must be a pure function of the snapshot.
    fn classify(&self, snapshot: &Snapshot<'_>) -> SequenceSet;
}

/// The enabled rules, run in a fixed order.
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// Instantiate every rule the configuration enables.
    pub fn from_config(config: &RulesConfig) -> Self {
        let mut rules: Vec<Box<dyn Rule>> = Vec::new();
        if config.ci_robot {
            rules.push(Box::new(CiRobot::new(&config.identity)));
        }
        if config.merge_robot {
            rules.push(Box::new(MergeRobot::new(&config.identity)));
        }
        if config.slash_commands {
            rules.push(Box::new(SlashCommands));
        }
        if config.build_status {
            rules.push(Box::new(BuildStatus));
        }
        Self { rules }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Union of every rule's output.
    pub fn classify(&self, snapshot: &Snapshot<'_>) -> SequenceSet {
        let mut set = SequenceSet::new();
        for rule in &self.rules {
            let flagged = rule.classify(snapshot);
            if !flagged.is_empty() {
                debug!(rule = rule.name(), count = flagged.len(), seqs = %flagged, "Rule flagged messages");
            }
            set.union(&flagged);
        }
        set
    }
}

/// A notification bot identity: display name plus address.
#[derive(Debug, Clone, Copy)]
pub struct Bot {
    pub name: &'static str,
    pub mailbox: &'static str,
    pub host: &'static str,
}

impl Bot {
    pub fn matches(&self, address: &Address) -> bool {
        address.name.as_deref() == Some(self.name) && address.same_mailbox(self.mailbox, self.host)
    }
}

/// Lazily select the entries whose message satisfies `predicate`.
pub fn filter<'a, P>(snapshot: &Snapshot<'a>, predicate: P) -> impl Iterator<Item = Entry<'a>>
where
    P: Fn(&Message) -> bool,
{
    snapshot.entries().filter(move |e| predicate(e.message))
}

/// Partition entries by `key`, dropping entries without one.
///
/// Entries keep their input order within each group.
pub fn group_by<'a, K, I, F>(entries: I, key: F) -> BTreeMap<K, Vec<Entry<'a>>>
where
    K: Ord,
    I: IntoIterator<Item = Entry<'a>>,
    F: Fn(&Entry<'a>) -> Option<K>,
{
    let mut groups: BTreeMap<K, Vec<Entry<'a>>> = BTreeMap::new();
    for entry in entries {
        if let Some(k) = key(&entry) {
            groups.entry(k).or_default().push(entry);
        }
    }
    groups
}

/// Stable sort, newest first. Equal dates keep their relative order.
pub fn sort_newest_first(group: &mut [Entry<'_>]) {
    group.sort_by(|a, b| b.message.date.cmp(&a.message.date));
}

/// Stable sort, oldest first. Equal dates keep their relative order.
pub fn sort_oldest_first(group: &mut [Entry<'_>]) {
    group.sort_by_key(|e| e.message.date);
}

/// Pull request number from a GitHub notification subject.
pub fn pull_request(subject: &str) -> Option<&str> {
    PULL_REQUEST
        .captures(subject)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// `bot`'s pull request notifications, one group per pull request.
pub fn threads<'a>(snapshot: &Snapshot<'a>, bot: &Bot) -> BTreeMap<&'a str, Vec<Entry<'a>>> {
    group_by(filter(snapshot, |m| bot.matches(&m.sender)), |e| {
        let message: &'a Message = e.message;
        pull_request(&message.subject)
    })
}

/// The body opens with an at-mention of somebody other than `identity`.
///
/// Bots differ in what follows the mention, so `delimiter` is part of the match.
pub fn mentions_someone_else(body: &str, identity: &str, delimiter: &str) -> bool {
    body.starts_with('@') && !body.starts_with(&format!("@{identity}{delimiter}"))
}
