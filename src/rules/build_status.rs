//! Build status bot: drop in-progress updates and superseded results.

use std::sync::LazyLock;

use crate::mailbox::{SequenceSet, Snapshot};

use super::{Bot, PatternSet, Rule, SeenKeys, sort_oldest_first, threads};

pub(crate) const SENDER: Bot = Bot {
    name: "OpenShift Bot",
    mailbox: "notifications",
    host: "github.com",
};

static IN_PROGRESS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"^[^\n]+ Merge Results: ((Evaluating)|(Running))",
        r"^Evaluated for [^\n]+ ((test)|(merge)) up to",
        r"^[^ ]+ Evaluating for testing",
        r"^[^ ]+ Running",
    ])
});

/// Keyed by job name; the first final result per job survives.
static RESULTS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"^([^\n]+ Merge Results): ((SUCCESS)|(FAILURE))",
        r"^([^ ]+) ((SUCCESS)|(FAILURE))",
    ])
});

pub struct BuildStatus;

impl Rule for BuildStatus {
    fn name(&self) -> &'static str {
        "build-status"
    }

    fn classify(&self, snapshot: &Snapshot<'_>) -> SequenceSet {
        let mut set = SequenceSet::new();
        for (_, mut thread) in threads(snapshot, &SENDER) {
            sort_oldest_first(&mut thread);
            let mut seen = SeenKeys::default();
            for entry in &thread {
                let body = entry.message.body.as_str();
                let repeated = seen.record(RESULTS.keys(body));
                if repeated || IN_PROGRESS.is_match(body) {
                    set.insert(entry.seq);
                }
            }
        }
        set
    }
}
