//! Error types for mailsweep.

/// Top-level error type for a sweep session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Mailbox mirror invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// Configuration-related errors. Always raised before a session is opened.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("{}", join_lines(.0))]
    Invalid(Vec<ConfigError>),
}

fn join_lines(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Connection, authentication, and command failures. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Failed to connect to {server}: {reason}")]
    Connect { server: String, reason: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed for {username}: {reason}")]
    AuthFailed { username: String, reason: String },

    #[error("Server does not support {0}")]
    MissingCapability(&'static str),

    #[error("{command} failed: {reason}")]
    Command {
        command: &'static str,
        reason: String,
    },

    #[error("IMAP session lost after an earlier failure")]
    SessionLost,
}

impl ProtocolError {
    /// Build a `map_err` adapter that tags a failure with the command that caused it.
    pub fn command<E: std::fmt::Display>(command: &'static str) -> impl FnOnce(E) -> Self {
        move |e| Self::Command {
            command,
            reason: e.to_string(),
        }
    }
}

/// The mirror and the server disagree in a way correct event ordering cannot produce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("expunge of message {seq} but the mirror holds only {len}")]
    ExpungeOutOfRange { seq: u32, len: usize },

    #[error("server reported {reported} messages but the mirror already holds {len}")]
    CountUnderflow { reported: u32, len: usize },

    #[error("fetch starting at {start} returned {received} messages, expected {expected}")]
    FetchMismatch {
        start: u32,
        expected: usize,
        received: usize,
    },
}

/// Result type alias for mailsweep.
pub type Result<T> = std::result::Result<T, Error>;
