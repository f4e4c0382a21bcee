//! mailsweep: keeps an IMAP inbox free of GitHub bot noise.

pub mod config;
pub mod error;
pub mod mailbox;
pub mod rules;
pub mod session;
pub mod sweeper;

pub use config::Config;
pub use error::{Error, Result};
pub use sweeper::{SweepOptions, Sweeper, sweep};
