//! Merge robot: drop queue chatter and repeated approval summaries.

use std::sync::LazyLock;

use crate::mailbox::{SequenceSet, Snapshot};

use super::{Bot, PatternSet, Rule, SeenKeys, mentions_someone_else, sort_oldest_first, threads};

pub(crate) const SENDER: Bot = Bot {
    name: "OpenShift Merge Robot",
    mailbox: "notifications",
    host: "github.com",
};

const MENTION_DELIMITER: &str = " ";

static NOISE: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"^Automatic merge from submit-queue",
        r"^/test all \[submit-queue is verifying that this PR is safe to merge\]",
        r"^/lgtm cancel //PR changed after LGTM, removing LGTM",
    ])
});

/// Only the first message carrying each key survives.
static SINGLE_INSTANCE: LazyLock<PatternSet> =
    LazyLock::new(|| PatternSet::new(&[r"^(\[APPROVALNOTIFIER\])"]));

pub struct MergeRobot {
    identity: String,
}

impl MergeRobot {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
        }
    }
}

impl Rule for MergeRobot {
    fn name(&self) -> &'static str {
        "merge-robot"
    }

    fn classify(&self, snapshot: &Snapshot<'_>) -> SequenceSet {
        let mut set = SequenceSet::new();
        for (_, mut thread) in threads(snapshot, &SENDER) {
            sort_oldest_first(&mut thread);
            let mut seen = SeenKeys::default();
            for entry in &thread {
                let body = entry.message.body.as_str();
                let repeated = seen.record(SINGLE_INSTANCE.keys(body));
                if repeated
                    || NOISE.is_match(body)
                    || mentions_someone_else(body, &self.identity, MENTION_DELIMITER)
                {
                    set.insert(entry.seq);
                }
            }
        }
        set
    }
}
