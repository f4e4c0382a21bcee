//! Client-side model of the selected mailbox.
//!
//! Messages are addressed by IMAP sequence numbers, which are positional and
//! shift on every expunge. The mirror therefore never stores them: a message's
//! sequence number is its index in the mirror plus one.

pub mod message;
pub mod mirror;
pub mod sequence;

pub use message::{Address, Message};
pub use mirror::{Entry, Notification, SessionMirror, Snapshot};
pub use sequence::SequenceSet;
