//! Cached mailbox entries.

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;

/// A structured mail address, split the way IMAP envelopes carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Display name, if any.
    pub name: Option<String>,
    /// Local part.
    pub mailbox: String,
    /// Domain.
    pub host: String,
}

impl Address {
    pub fn new(name: Option<&str>, mailbox: &str, host: &str) -> Self {
        Self {
            name: name.map(String::from),
            mailbox: mailbox.to_string(),
            host: host.to_string(),
        }
    }

    /// Parse `local@domain` plus an optional display name.
    pub fn from_parts(name: Option<&str>, address: &str) -> Self {
        let (mailbox, host) = address.rsplit_once('@').unwrap_or((address, ""));
        Self::new(name, mailbox, host)
    }

    /// Same local part and domain, regardless of display name.
    pub fn same_mailbox(&self, mailbox: &str, host: &str) -> bool {
        self.mailbox.eq_ignore_ascii_case(mailbox) && self.host.eq_ignore_ascii_case(host)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}@{}>", self.mailbox, self.host),
            None => write!(f, "{}@{}", self.mailbox, self.host),
        }
    }
}

/// One mailbox entry as fetched from the server.
///
/// Sequence numbers live in the mirror, not here; see [`crate::mailbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: Address,
    pub subject: String,
    pub date: DateTime<Utc>,
    /// Raw content of the first MIME part.
    pub body: String,
}

impl Message {
    /// Build a message from a raw header block and the raw first body part.
    ///
    /// The `Sender` header wins over `From`, matching the IMAP envelope.
    /// Missing headers degrade to empty values rather than failing the fetch.
    pub fn parse(header: &[u8], first_part: &[u8]) -> Self {
        let body = String::from_utf8_lossy(first_part).into_owned();

        let Some(parsed) = MessageParser::default().parse(header) else {
            return Self {
                sender: Address::new(None, "", ""),
                subject: String::new(),
                date: DateTime::default(),
                body,
            };
        };

        let sender = parsed
            .sender()
            .and_then(|addr| addr.first())
            .or_else(|| parsed.from().and_then(|addr| addr.first()))
            .map(|a| Address::from_parts(a.name(), a.address().unwrap_or_default()))
            .unwrap_or_else(|| Address::new(None, "", ""));

        let date = parsed
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
            .unwrap_or_default();

        Self {
            sender,
            subject: parsed.subject().unwrap_or_default().to_string(),
            date,
            body,
        }
    }
}
