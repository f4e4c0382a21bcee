//! CI robot: only the latest status per pull request matters.

use crate::mailbox::{SequenceSet, Snapshot};

use super::{Bot, Rule, mentions_someone_else, sort_newest_first, threads};

pub(crate) const SENDER: Bot = Bot {
    name: "OpenShift CI Robot",
    mailbox: "notifications",
    host: "github.com",
};

const MENTION_DELIMITER: &str = ": ";

/// Keeps the newest CI robot message in each thread and discards the rest.
/// The newest one is discarded too when it is addressed to somebody else.
pub struct CiRobot {
    identity: String,
}

impl CiRobot {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
        }
    }
}

impl Rule for CiRobot {
    fn name(&self) -> &'static str {
        "ci-robot"
    }

    fn classify(&self, snapshot: &Snapshot<'_>) -> SequenceSet {
        let mut set = SequenceSet::new();
        for (_, mut thread) in threads(snapshot, &SENDER) {
            sort_newest_first(&mut thread);
            let Some((newest, older)) = thread.split_first() else {
                continue;
            };
            if mentions_someone_else(&newest.message.body, &self.identity, MENTION_DELIMITER) {
                set.insert(newest.seq);
            }
            set.extend(older.iter().map(|e| e.seq));
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::{from_bot, mirror};

    fn classify(messages: Vec<crate::mailbox::Message>, identity: &str) -> Vec<u32> {
        let mirror = mirror(messages);
        CiRobot::new(identity)
            .classify(&mirror.snapshot())
            .iter()
            .collect()
    }

    #[test]
    fn keeps_only_newest_per_thread() {
        let seqs = classify(
            vec![
                from_bot(&SENDER, "[o/r] Fix (#7)", 1, "tests failed"),
                from_bot(&SENDER, "[o/r] Other (#8)", 2, "tests failed"),
                from_bot(&SENDER, "[o/r] Fix (#7)", 3, "tests passed"),
                from_bot(&SENDER, "[o/r] Fix (#7)", 2, "retesting"),
            ],
            "bob",
        );
        assert_eq!(seqs, [1, 4]);
    }

    #[test]
    fn newest_mentioning_someone_else_is_discarded() {
        let seqs = classify(
            vec![
                from_bot(&SENDER, "[o/r] Fix (#7)", 1, "a"),
                from_bot(&SENDER, "[o/r] Fix (#7)", 2, "b"),
                from_bot(&SENDER, "[o/r] Fix (#7)", 3, "@alice: lgtm"),
            ],
            "bob",
        );
        assert_eq!(seqs, [1, 2, 3]);
    }

    #[test]
    fn newest_mentioning_identity_is_kept() {
        let seqs = classify(
            vec![
                from_bot(&SENDER, "[o/r] Fix (#7)", 1, "a"),
                from_bot(&SENDER, "[o/r] Fix (#7)", 3, "@bob: your tests failed"),
            ],
            "bob",
        );
        assert_eq!(seqs, [1]);
    }

    #[test]
    fn ignores_other_senders_and_non_pull_request_subjects() {
        let other = Bot {
            name: "OpenShift Bot",
            ..SENDER
        };
        let seqs = classify(
            vec![
                from_bot(&other, "[o/r] Fix (#7)", 1, "a"),
                from_bot(&other, "[o/r] Fix (#7)", 2, "b"),
                from_bot(&SENDER, "Weekly digest", 1, "x"),
                from_bot(&SENDER, "Weekly digest", 2, "y"),
            ],
            "bob",
        );
        assert!(seqs.is_empty());
    }
}
