//! Sets of sequence numbers submitted together in one bulk command.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;

/// An ordered, duplicate-free set of message sequence numbers.
///
/// Renders in IMAP sequence-set syntax, collapsing runs into ranges
/// (`1:3,7,9:10`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceSet {
    seqs: BTreeSet<u32>,
}

impl SequenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, seq: u32) {
        self.seqs.insert(seq);
    }

    /// Merge another set into this one.
    pub fn union(&mut self, other: &SequenceSet) {
        self.seqs.extend(other.seqs.iter().copied());
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.seqs.contains(&seq)
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    /// Ascending iteration.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = u32> + '_ {
        self.seqs.iter().copied()
    }

    /// Maximal runs of consecutive numbers, ascending.
    pub fn ranges(&self) -> Vec<RangeInclusive<u32>> {
        let mut ranges: Vec<RangeInclusive<u32>> = Vec::new();
        for seq in self.iter() {
            match ranges.last_mut() {
                Some(last) if last.end().checked_add(1) == Some(seq) => {
                    *last = *last.start()..=seq;
                }
                _ => ranges.push(seq..=seq),
            }
        }
        ranges
    }
}

impl Extend<u32> for SequenceSet {
    fn extend<I: IntoIterator<Item = u32>>(&mut self, iter: I) {
        self.seqs.extend(iter);
    }
}

impl FromIterator<u32> for SequenceSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            seqs: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges().into_iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if range.start() == range.end() {
                write!(f, "{}", range.start())?;
            } else {
                write!(f, "{}:{}", range.start(), range.end())?;
            }
        }
        Ok(())
    }
}
