//! Sweep orchestrator.
//!
//! Runs a four-state loop over one selected mailbox:
//!
//! ```text
//! select ─▶ Classify ─▶ Move ─▶ IdleWait ─┬─▶ Classify   (push or timeout)
//!                                         └─▶ Terminated (cancelled)
//! ```
//!
//! Any primitive failure ends the loop. There are no retries.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::mailbox::SequenceSet;
use crate::rules::RuleSet;
use crate::session::{Executor, ImapConnection, MailboxConnection, Wake};

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub mailbox: String,
    pub destination: String,
    /// Select read-only and report instead of moving.
    pub dry_run: bool,
    pub idle_timeout: Duration,
}

impl SweepOptions {
    pub fn from_config(config: &Config, dry_run: bool) -> Self {
        Self {
            mailbox: config.mailbox.clone(),
            destination: config.move_to.clone(),
            dry_run,
            idle_timeout: config.idle_timeout,
        }
    }
}

#[derive(Debug)]
enum State {
    Classify,
    Move(SequenceSet),
    IdleWait,
    Terminated,
}

pub struct Sweeper<C> {
    executor: Executor<C>,
    rules: RuleSet,
    options: SweepOptions,
}

impl<C: MailboxConnection> Sweeper<C> {
    pub fn new(conn: C, rules: RuleSet, options: SweepOptions) -> Self {
        Self {
            executor: Executor::new(conn),
            rules,
            options,
        }
    }

    /// Sweep until `cancel` fires or a primitive fails, then log out.
    ///
    /// A failed logout is only reported when the loop itself succeeded.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), Error> {
        let outcome = self.drive(&cancel).await;
        let Self { executor, .. } = self;
        match outcome {
            Ok(()) => {
                executor.logout().await?;
                info!("Sweep finished");
                Ok(())
            }
            Err(e) => {
                if let Err(logout) = executor.logout().await {
                    warn!(error = %logout, "Logout after failure also failed");
                }
                Err(e)
            }
        }
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
        self.executor
            .select(&self.options.mailbox, self.options.dry_run)
            .await?;

        let mut state = State::Classify;
        loop {
            state = match state {
                State::Classify => State::Move(self.classify()),
                State::Move(set) => {
                    self.discard(&set).await?;
                    State::IdleWait
                }
                State::IdleWait if cancel.is_cancelled() => State::Terminated,
                State::IdleWait => {
                    match self
                        .executor
                        .wait_for_push(self.options.idle_timeout, cancel)
                        .await?
                    {
                        Wake::Push | Wake::Timeout => State::Classify,
                        Wake::Cancelled => State::Terminated,
                    }
                }
                State::Terminated => return Ok(()),
            };
        }
    }

    fn classify(&self) -> SequenceSet {
        let mirror = self.executor.mirror();
        let set = self.rules.classify(&mirror.snapshot());
        debug!(messages = mirror.len(), flagged = set.len(), "Classified mailbox");
        set
    }

    async fn discard(&mut self, set: &SequenceSet) -> Result<(), Error> {
        if set.is_empty() {
            return Ok(());
        }

        let mirror = self.executor.mirror();
        for seq in set.iter() {
            if let Some(message) = mirror.get(seq) {
                debug!(seq, sender = %message.sender, subject = %message.subject, "Discarding");
            }
        }

        if self.options.dry_run {
            info!(
                count = set.len(),
                seqs = %set,
                destination = %self.options.destination,
                "Dry run, not moving"
            );
            return Ok(());
        }

        self.executor
            .move_messages(set, &self.options.destination)
            .await
    }
}

/// Connect with `config` and sweep until `cancel` fires or the session fails.
pub async fn sweep(config: &Config, dry_run: bool, cancel: CancellationToken) -> Result<(), Error> {
    let rules = RuleSet::from_config(&config.rules);
    info!(
        mailbox = %config.mailbox,
        destination = %config.move_to,
        rules = ?rules.names(),
        dry_run,
        "Starting sweep"
    );
    if rules.is_empty() {
        warn!("No rules enabled; nothing will be moved");
    }

    let conn = ImapConnection::connect(&config.imap).await?;
    Sweeper::new(conn, rules, SweepOptions::from_config(config, dry_run))
        .run(cancel)
        .await
}
