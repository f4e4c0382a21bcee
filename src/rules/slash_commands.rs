//! Comments that only ask the bots to retest.

use std::sync::LazyLock;

use regex::Regex;

use crate::mailbox::{Message, SequenceSet, Snapshot};

use super::{Rule, filter};

const GITHUB_MAILBOX: &str = "notifications";
const GITHUB_HOST: &str = "github.com";

/// Lines below this one are a signature.
const SIGNATURE_DELIMITER: &str = "-- ";

static COMMAND_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*((/retest)|(/test\s+\S+)|(\[test\]))?\s*$").expect("command line pattern")
});

/// Discards GitHub notifications whose body is nothing but test commands.
pub struct SlashCommands;

/// Every line above the signature is blank or a single test command.
pub fn is_command_only(body: &str) -> bool {
    body.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .take_while(|line| *line != SIGNATURE_DELIMITER)
        .all(|line| COMMAND_LINE.is_match(line))
}

fn from_github(message: &Message) -> bool {
    message.sender.same_mailbox(GITHUB_MAILBOX, GITHUB_HOST)
}

impl Rule for SlashCommands {
    fn name(&self) -> &'static str {
        "slash-commands"
    }

    fn classify(&self, snapshot: &Snapshot<'_>) -> SequenceSet {
        filter(snapshot, |m| from_github(m) && is_command_only(&m.body))
            .map(|e| e.seq)
            .collect()
    }
}
