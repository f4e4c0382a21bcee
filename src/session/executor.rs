//! Command executor: runs one protocol primitive at a time while draining
//! server notifications into the mirror.
//!
//! Every primitive is raced against the notification stream. Events pulled
//! off the stream are queued in delivery order; once the primitive completes,
//! anything still buffered is drained without blocking and the whole queue is
//! replayed into the [`SessionMirror`]. Growth is fetched only after the queue
//! is empty, so the fetch range always reflects every expunge seen so far.

use std::collections::VecDeque;
use std::future::Future;
use std::ops::RangeInclusive;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, ProtocolError};
use crate::mailbox::{Message, Notification, SequenceSet, SessionMirror};
use crate::session::connection::{MailboxConnection, NotificationStream};

/// Why [`Executor::wait_for_push`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The server reported a new message count.
    Push,
    /// The deadline elapsed without a count change.
    Timeout,
    /// The caller's cancellation token fired.
    Cancelled,
}

/// Owns the connection, its notification stream, and the mirror they feed.
pub struct Executor<C> {
    conn: C,
    events: NotificationStream,
    queue: VecDeque<Notification>,
    mirror: SessionMirror,
}

impl<C: MailboxConnection> Executor<C> {
    pub fn new(mut conn: C) -> Self {
        let events = conn.notifications();
        Self {
            conn,
            events,
            queue: VecDeque::new(),
            mirror: SessionMirror::new(),
        }
    }

    /// The reconciled mirror. Never has pending messages between primitives.
    pub fn mirror(&self) -> &SessionMirror {
        &self.mirror
    }

    /// Select `mailbox` and populate the mirror with every message in it.
    ///
    /// Notifications raced with SELECT are discarded: the count SELECT
    /// returns already accounts for them.
    pub async fn select(&mut self, mailbox: &str, read_only: bool) -> Result<(), Error> {
        let mut discarded = VecDeque::new();
        let exists = drain_while(
            &mut self.events,
            &mut discarded,
            self.conn.select(mailbox, read_only),
            |_| {},
        )
        .await?;
        debug!(discarded = discarded.len(), "Dropped notifications raced with select");

        self.queue.clear();
        self.mirror = SessionMirror::new();
        self.mirror.apply_count_changed(exists)?;
        self.reconcile().await?;
        info!(mailbox, messages = self.mirror.len(), "Mailbox mirrored");
        Ok(())
    }

    /// Fetch a range of messages. Notifications raced with the fetch are
    /// applied to the mirror before returning.
    pub async fn fetch(&mut self, range: RangeInclusive<u32>) -> Result<Vec<Message>, Error> {
        let messages = self.fetch_raw(range).await?;
        self.reconcile().await?;
        Ok(messages)
    }

    /// Block until the server pushes a count change, `timeout` elapses, or
    /// `cancel` fires. Every notification observed is applied before returning,
    /// including growth seen alongside a cancellation.
    pub async fn wait_for_push(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Wake, Error> {
        let stop = cancel.child_token();
        let mut pushed = false;
        let early = stop.clone();
        drain_while(
            &mut self.events,
            &mut self.queue,
            self.conn.idle(timeout, stop),
            |event| {
                if matches!(event, Notification::CountChanged(_)) {
                    pushed = true;
                    early.cancel();
                }
            },
        )
        .await?;

        self.reconcile().await?;

        // Cancellation wins over a push seen in the same wait.
        let wake = if cancel.is_cancelled() {
            Wake::Cancelled
        } else if pushed {
            Wake::Push
        } else {
            Wake::Timeout
        };
        debug!(?wake, messages = self.mirror.len(), "Idle wait finished");
        Ok(wake)
    }

    /// Move `set` to `destination`.
    ///
    /// `set` must have been computed against the current mirror. The expunges
    /// the server reports for the moved messages are applied like any others.
    pub async fn move_messages(&mut self, set: &SequenceSet, destination: &str) -> Result<(), Error> {
        drain_while(
            &mut self.events,
            &mut self.queue,
            self.conn.move_messages(set, destination),
            |_| {},
        )
        .await?;
        info!(count = set.len(), destination, "Moved messages");
        self.reconcile().await
    }

    /// Log out, discarding any further notifications.
    pub async fn logout(mut self) -> Result<(), Error> {
        let mut discarded = VecDeque::new();
        drain_while(&mut self.events, &mut discarded, self.conn.logout(), |_| {}).await?;
        debug!(discarded = discarded.len(), "Logged out");
        Ok(())
    }

    async fn fetch_raw(&mut self, range: RangeInclusive<u32>) -> Result<Vec<Message>, Error> {
        let messages = drain_while(
            &mut self.events,
            &mut self.queue,
            self.conn.fetch(range),
            |_| {},
        )
        .await?;
        Ok(messages)
    }

    /// Replay queued notifications, then fetch any growth, until both are exhausted.
    async fn reconcile(&mut self) -> Result<(), Error> {
        loop {
            while let Some(event) = self.queue.pop_front() {
                self.mirror.apply(event)?;
            }
            let Some(range) = self.mirror.pending_range() else {
                return Ok(());
            };
            let start = *range.start();
            debug!(start, end = *range.end(), "Fetching new messages");
            let messages = self.fetch_raw(range).await?;
            self.mirror.fill(start, messages)?;
        }
    }
}

/// Run `primitive` to completion while queueing every notification that
/// arrives, then drain whatever is already buffered.
///
/// `observe` sees each event as it is queued.
async fn drain_while<T, F>(
    events: &mut NotificationStream,
    queue: &mut VecDeque<Notification>,
    primitive: F,
    mut observe: impl FnMut(&Notification),
) -> Result<T, ProtocolError>
where
    F: Future<Output = Result<T, ProtocolError>>,
{
    tokio::pin!(primitive);
    let result = loop {
        tokio::select! {
            biased;
            Some(event) = events.next() => {
                observe(&event);
                queue.push_back(event);
            }
            result = &mut primitive => break result,
        }
    };
    while let Some(Some(event)) = events.next().now_or_never() {
        observe(&event);
        queue.push_back(event);
    }
    result
}
