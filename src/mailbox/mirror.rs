//! Session mirror: the in-memory copy of the selected mailbox.
//!
//! The mirror is mutated only by replaying server notifications in the
//! order they were delivered:
//! - `Expunged(n)` removes position `n`; everything above shifts down.
//! - `CountChanged(n)` grows the mirror to `n` with *pending* slots.
//!
//! Pending slots always form a contiguous tail. The executor fetches that
//! tail once every queued notification has been applied, so an expunge
//! delivered after the growth but before the fetch shifts the fetch range
//! exactly as it shifted the server's numbering.

use std::ops::RangeInclusive;

use tracing::trace;

use crate::error::InvariantViolation;
use crate::mailbox::Message;

/// An unsolicited mailbox mutation reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// The message at this sequence number was removed.
    Expunged(u32),
    /// The mailbox now holds this many messages.
    CountChanged(u32),
}

#[derive(Debug, Clone)]
enum Slot {
    Loaded(Message),
    Pending,
}

/// Dense, positional copy of the mailbox.
#[derive(Debug, Default)]
pub struct SessionMirror {
    slots: Vec<Slot>,
}

impl SessionMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages the server currently reports, loaded or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Apply one notification.
    pub fn apply(&mut self, event: Notification) -> Result<(), InvariantViolation> {
        trace!(?event, len = self.slots.len(), "Applying mailbox notification");
        match event {
            Notification::Expunged(seq) => self.apply_expunge(seq),
            Notification::CountChanged(total) => self.apply_count_changed(total),
        }
    }

    /// Remove the message at `seq`, shifting later messages down by one.
    pub fn apply_expunge(&mut self, seq: u32) -> Result<(), InvariantViolation> {
        let len = self.slots.len();
        if seq == 0 || seq as usize > len {
            return Err(InvariantViolation::ExpungeOutOfRange { seq, len });
        }
        self.slots.remove(seq as usize - 1);
        Ok(())
    }

    /// Grow to `total` messages. Shrinking is impossible under correct ordering.
    pub fn apply_count_changed(&mut self, total: u32) -> Result<(), InvariantViolation> {
        let len = self.slots.len();
        let total = total as usize;
        if total < len {
            return Err(InvariantViolation::CountUnderflow {
                reported: total as u32,
                len,
            });
        }
        self.slots.resize_with(total, || Slot::Pending);
        Ok(())
    }

    /// Sequence numbers that still need fetching, if any.
    pub fn pending_range(&self) -> Option<RangeInclusive<u32>> {
        let first = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Slot::Pending))?;
        Some(first as u32 + 1..=self.slots.len() as u32)
    }

    /// Load fetched messages into the pending tail starting at `start`.
    ///
    /// The batch must cover the pending tail exactly.
    pub fn fill(&mut self, start: u32, messages: Vec<Message>) -> Result<(), InvariantViolation> {
        let expected = self
            .pending_range()
            .filter(|range| *range.start() == start)
            .map_or(0, |range| range.count());
        if expected == 0 || messages.len() != expected {
            return Err(InvariantViolation::FetchMismatch {
                start,
                expected,
                received: messages.len(),
            });
        }
        let offset = start as usize - 1;
        for (slot, message) in self.slots[offset..].iter_mut().zip(messages) {
            *slot = Slot::Loaded(message);
        }
        Ok(())
    }

    /// Read-only view of every loaded message with its current sequence number.
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot { slots: &self.slots }
    }

    /// Message at `seq`, if loaded.
    pub fn get(&self, seq: u32) -> Option<&Message> {
        match self.slots.get((seq as usize).checked_sub(1)?)? {
            Slot::Loaded(message) => Some(message),
            Slot::Pending => None,
        }
    }
}

/// Immutable view of the mirror taken at the start of classification.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    slots: &'a [Slot],
}

/// A message paired with its sequence number as of the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    pub seq: u32,
    pub message: &'a Message,
}

impl<'a> Snapshot<'a> {
    /// Loaded messages in mailbox order.
    pub fn entries(&self) -> impl Iterator<Item = Entry<'a>> + 'a {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Loaded(message) => Some(Entry {
                    seq: i as u32 + 1,
                    message,
                }),
                Slot::Pending => None,
            })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use proptest::prelude::*;

    use super::*;
    use crate::mailbox::Address;

    fn msg(id: u32) -> Message {
        Message {
            sender: Address::new(None, "someone", "example.com"),
            subject: format!("message {id}"),
            date: DateTime::default(),
            body: String::new(),
        }
    }

    fn subjects(mirror: &SessionMirror) -> Vec<String> {
        mirror
            .snapshot()
            .entries()
            .map(|e| e.message.subject.clone())
            .collect()
    }

    fn loaded(ids: &[u32]) -> SessionMirror {
        let mut mirror = SessionMirror::new();
        mirror.apply_count_changed(ids.len() as u32).unwrap();
        if !ids.is_empty() {
            mirror.fill(1, ids.iter().map(|&id| msg(id)).collect()).unwrap();
        }
        mirror
    }

    #[test]
    fn expunge_shifts_later_messages() {
        let mut mirror = loaded(&[1, 2, 3, 4]);
        mirror.apply(Notification::Expunged(2)).unwrap();
        assert_eq!(subjects(&mirror), ["message 1", "message 3", "message 4"]);
        let seqs: Vec<u32> = mirror.snapshot().entries().map(|e| e.seq).collect();
        assert_eq!(seqs, [1, 2, 3]);
        assert_eq!(mirror.get(2).unwrap().subject, "message 3");
    }

    #[test]
    fn expunge_past_end_is_violation() {
        let mut mirror = loaded(&[1, 2]);
        assert_eq!(
            mirror.apply(Notification::Expunged(3)),
            Err(InvariantViolation::ExpungeOutOfRange { seq: 3, len: 2 })
        );
        assert_eq!(
            mirror.apply(Notification::Expunged(0)),
            Err(InvariantViolation::ExpungeOutOfRange { seq: 0, len: 2 })
        );
        assert_eq!(mirror.len(), 2);
    }

    #[test]
    fn count_underflow_is_violation() {
        let mut mirror = loaded(&[1, 2, 3]);
        assert_eq!(
            mirror.apply(Notification::CountChanged(2)),
            Err(InvariantViolation::CountUnderflow {
                reported: 2,
                len: 3
            })
        );
    }

    #[test]
    fn unchanged_count_is_noop() {
        let mut mirror = loaded(&[1, 2]);
        mirror.apply(Notification::CountChanged(2)).unwrap();
        assert_eq!(mirror.pending_range(), None);
        assert_eq!(subjects(&mirror), ["message 1", "message 2"]);
    }

    #[test]
    fn growth_leaves_pending_tail() {
        let mut mirror = loaded(&[1, 2]);
        mirror.apply(Notification::CountChanged(5)).unwrap();
        assert_eq!(mirror.len(), 5);
        assert_eq!(mirror.pending_range(), Some(3..=5));
        assert_eq!(mirror.snapshot().entries().count(), 2);
        assert!(mirror.get(4).is_none());

        mirror.fill(3, vec![msg(3), msg(4), msg(5)]).unwrap();
        assert_eq!(mirror.pending_range(), None);
        assert_eq!(subjects(&mirror).len(), 5);
    }

    #[test]
    fn expunge_before_fetch_shifts_pending_range() {
        let mut mirror = loaded(&[1, 2, 3]);
        mirror.apply(Notification::CountChanged(6)).unwrap();
        mirror.apply(Notification::Expunged(1)).unwrap();
        assert_eq!(mirror.pending_range(), Some(3..=5));
        mirror.apply(Notification::Expunged(4)).unwrap();
        assert_eq!(mirror.pending_range(), Some(3..=4));
        mirror.fill(3, vec![msg(5), msg(6)]).unwrap();
        assert_eq!(
            subjects(&mirror),
            ["message 2", "message 3", "message 5", "message 6"]
        );
    }

    #[test]
    fn fill_must_cover_pending_tail() {
        let mut mirror = loaded(&[1]);
        mirror.apply(Notification::CountChanged(3)).unwrap();
        assert_eq!(
            mirror.fill(2, vec![msg(2)]),
            Err(InvariantViolation::FetchMismatch {
                start: 2,
                expected: 2,
                received: 1
            })
        );
        assert_eq!(
            mirror.fill(3, vec![msg(3)]),
            Err(InvariantViolation::FetchMismatch {
                start: 3,
                expected: 0,
                received: 1
            })
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Expunge(u32),
        Grow(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..64).prop_map(Op::Expunge),
            (0u32..4).prop_map(Op::Grow),
        ]
    }

    proptest! {
        /// Replaying any valid event sequence keeps the mirror equal to a
        /// model mailbox, with sequence numbers exactly `1..=N`.
        #[test]
        fn mirror_tracks_model_mailbox(ops in proptest::collection::vec(op(), 0..64)) {
            let mut model: Vec<u32> = Vec::new();
            let mut next_id = 0;
            let mut mirror = SessionMirror::new();
            let mut last_total = None;

            for op in ops {
                match op {
                    Op::Expunge(n) => {
                        if model.is_empty() {
                            continue;
                        }
                        let seq = n % model.len() as u32 + 1;
                        model.remove(seq as usize - 1);
                        mirror.apply(Notification::Expunged(seq)).unwrap();
                        last_total = last_total.map(|t: u32| t - 1);
                    }
                    Op::Grow(n) => {
                        for _ in 0..n {
                            next_id += 1;
                            model.push(next_id);
                        }
                        let total = model.len() as u32;
                        mirror.apply(Notification::CountChanged(total)).unwrap();
                        last_total = Some(total);
                        if let Some(range) = mirror.pending_range() {
                            let start = *range.start();
                            let batch = model[start as usize - 1..].iter().map(|&id| msg(id)).collect();
                            mirror.fill(start, batch).unwrap();
                        }
                    }
                }
                if let Some(total) = last_total {
                    prop_assert_eq!(mirror.len(), total as usize);
                }
                let seqs: Vec<u32> = mirror.snapshot().entries().map(|e| e.seq).collect();
                let dense: Vec<u32> = (1..=model.len() as u32).collect();
                prop_assert_eq!(seqs, dense);
                let expected: Vec<String> = model.iter().map(|id| format!("message {id}")).collect();
                prop_assert_eq!(subjects(&mirror), expected);
            }
        }
    }
}
