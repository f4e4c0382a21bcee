//! The protocol primitives a sweep session is built on.

use std::ops::RangeInclusive;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::ProtocolError;
use crate::mailbox::{Message, Notification, SequenceSet};

/// Unsolicited server notifications, in delivery order.
pub type NotificationStream = BoxStream<'static, Notification>;

/// An authenticated mailbox connection.
///
/// Any primitive may cause the server to emit notifications. They are always
/// delivered on [`MailboxConnection::notifications`], in the order the server
/// sent them, never through a primitive's return value. The stream must be
/// consumed while a primitive is in flight: implementations are allowed to
/// block on delivery.
#[async_trait]
pub trait MailboxConnection: Send {
    /// Take the notification stream. Called exactly once, before any primitive.
    fn notifications(&mut self) -> NotificationStream;

    /// Select a mailbox and return its message count.
    async fn select(&mut self, mailbox: &str, read_only: bool) -> Result<u32, ProtocolError>;

    /// Fetch header and first body part for a closed range, in sequence order.
    async fn fetch(&mut self, range: RangeInclusive<u32>) -> Result<Vec<Message>, ProtocolError>;

    /// Wait for server push.
    ///
    /// Returns when the server reports a new message count, when `timeout`
    /// elapses, or when `stop` is cancelled.
    async fn idle(&mut self, timeout: Duration, stop: CancellationToken)
    -> Result<(), ProtocolError>;

    /// Move every message in `set` to `destination`.
    async fn move_messages(
        &mut self,
        set: &SequenceSet,
        destination: &str,
    ) -> Result<(), ProtocolError>;

    async fn logout(&mut self) -> Result<(), ProtocolError>;
}
