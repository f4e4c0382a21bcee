//! Mailbox session: the protocol seam, its IMAP implementation, and the
//! executor that keeps the mirror in lockstep with server notifications.

pub mod connection;
pub mod executor;
pub mod imap;

pub use connection::{MailboxConnection, NotificationStream};
pub use executor::{Executor, Wake};
pub use imap::ImapConnection;
