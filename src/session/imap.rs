//! IMAP implementation of [`MailboxConnection`] on top of `async-imap`.
//!
//! `async-imap` reports unsolicited EXISTS/EXPUNGE responses on a bounded
//! channel and blocks the connection when it is full, so the executor drains
//! it while every command runs. IDLE responses are returned to the IDLE
//! handle instead; those are parsed here and forwarded on a second channel
//! that is merged into the same notification stream.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_imap::extensions::idle::IdleResponse;
use async_imap::imap_proto::{MailboxDatum, Response, SectionPath};
use async_imap::types::UnsolicitedResponse;
use async_trait::async_trait;
use futures::stream::{self, PollNext};
use futures::{StreamExt, TryStreamExt, future};
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::ImapConfig;
use crate::error::ProtocolError;
use crate::mailbox::{Message, Notification, SequenceSet};
use crate::session::connection::{MailboxConnection, NotificationStream};

type ImapSession = async_imap::Session<TlsStream<TcpStream>>;

/// Header block plus the first MIME part, without setting `\Seen`.
const FETCH_QUERY: &str = "(BODY.PEEK[HEADER] BODY.PEEK[1])";

/// An authenticated IMAP session over TLS.
pub struct ImapConnection {
    /// `None` only after a failed IDLE or a logout.
    session: Option<ImapSession>,
    idle_tx: mpsc::UnboundedSender<Notification>,
    idle_rx: Option<mpsc::UnboundedReceiver<Notification>>,
}

impl ImapConnection {
    /// Connect over TLS, log in, and check for the MOVE and IDLE extensions.
    pub async fn connect(config: &ImapConfig) -> Result<Self, ProtocolError> {
        let server = config.server();
        info!(server = %server, username = %config.username, "Connecting to IMAP server");

        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|e| ProtocolError::Connect {
                server: server.clone(),
                reason: e.to_string(),
            })?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| ProtocolError::Tls(e.to_string()))?;
        let tls = TlsConnector::from(Arc::new(tls_config))
            .connect(server_name, tcp)
            .await
            .map_err(|e| ProtocolError::Tls(e.to_string()))?;

        let mut client = async_imap::Client::new(tls);
        let _greeting = client
            .read_response()
            .await
            .context("failed to read greeting")
            .map_err(|e| ProtocolError::Connect {
                server: server.clone(),
                reason: format!("{e:#}"),
            })?;

        let mut session = client
            .login(&config.username, config.password.expose_secret())
            .await
            .map_err(|(e, _client)| ProtocolError::AuthFailed {
                username: config.username.clone(),
                reason: e.to_string(),
            })?;

        let capabilities = session
            .capabilities()
            .await
            .map_err(ProtocolError::command("CAPABILITY"))?;
        for required in ["MOVE", "IDLE"] {
            if !capabilities.has_str(required) {
                return Err(ProtocolError::MissingCapability(required));
            }
        }

        info!(server = %server, "IMAP session established");

        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        Ok(Self {
            session: Some(session),
            idle_tx,
            idle_rx: Some(idle_rx),
        })
    }

    fn session(&mut self) -> Result<&mut ImapSession, ProtocolError> {
        self.session.as_mut().ok_or(ProtocolError::SessionLost)
    }
}

fn translate_unsolicited(response: UnsolicitedResponse) -> Option<Notification> {
    match response {
        UnsolicitedResponse::Exists(n) => Some(Notification::CountChanged(n)),
        UnsolicitedResponse::Expunge(n) => Some(Notification::Expunged(n)),
        other => {
            trace!(response = ?other, "Ignoring unsolicited response");
            None
        }
    }
}

fn translate_idle(response: &Response<'_>) -> Option<Notification> {
    match response {
        Response::MailboxData(MailboxDatum::Exists(n)) => Some(Notification::CountChanged(*n)),
        Response::Expunge(n) => Some(Notification::Expunged(*n)),
        _ => None,
    }
}

/// Translate an IDLE response and push it onto the notification stream.
fn forward_idle(
    tx: &mpsc::UnboundedSender<Notification>,
    response: &Response<'_>,
) -> Option<Notification> {
    let event = translate_idle(response)?;
    if tx.send(event).is_err() {
        debug!(?event, "Notification stream closed, dropping IDLE response");
    }
    Some(event)
}

/// Build messages from `(seq, header, first part)` triples, one per
/// requested sequence number, in order.
///
/// Unsolicited flag updates arrive as FETCH responses too: anything outside
/// `range` or without a header block is skipped, but every number in `range`
/// must end up with a header.
fn assemble<'a>(
    range: &RangeInclusive<u32>,
    fetches: impl IntoIterator<Item = (u32, Option<&'a [u8]>, Option<&'a [u8]>)>,
) -> Result<Vec<Message>, ProtocolError> {
    let mut messages = BTreeMap::new();
    for (seq, header, body) in fetches {
        if !range.contains(&seq) {
            continue;
        }
        if let Some(header) = header {
            messages.insert(seq, Message::parse(header, body.unwrap_or_default()));
        }
    }
    if let Some(missing) = range.clone().find(|seq| !messages.contains_key(seq)) {
        return Err(ProtocolError::Command {
            command: "FETCH",
            reason: format!("server returned no header for message {missing}"),
        });
    }
    Ok(messages.into_values().collect())
}

#[async_trait]
impl MailboxConnection for ImapConnection {
    fn notifications(&mut self) -> NotificationStream {
        let unsolicited = self
            .session
            .as_ref()
            .map(|s| s.unsolicited_responses.clone());
        let unsolicited = stream::iter(unsolicited)
            .flatten()
            .filter_map(|r| future::ready(translate_unsolicited(r)));
        let idle = stream::iter(self.idle_rx.take().map(UnboundedReceiverStream::new)).flatten();

        // Responses read while entering IDLE land on the unsolicited channel
        // and precede anything the IDLE handle sees.
        stream::select_with_strategy(unsolicited, idle, |_: &mut ()| PollNext::Left).boxed()
    }

    async fn select(&mut self, mailbox: &str, read_only: bool) -> Result<u32, ProtocolError> {
        let session = self.session()?;
        let selected = if read_only {
            session
                .examine(mailbox)
                .await
                .map_err(ProtocolError::command("EXAMINE"))?
        } else {
            session
                .select(mailbox)
                .await
                .map_err(ProtocolError::command("SELECT"))?
        };
        debug!(mailbox, exists = selected.exists, read_only, "Mailbox selected");
        Ok(selected.exists)
    }

    async fn fetch(&mut self, range: RangeInclusive<u32>) -> Result<Vec<Message>, ProtocolError> {
        let seqset = format!("{}:{}", range.start(), range.end());
        let session = self.session()?;
        let fetches: Vec<_> = session
            .fetch(&seqset, FETCH_QUERY)
            .await
            .map_err(ProtocolError::command("FETCH"))?
            .try_collect()
            .await
            .map_err(ProtocolError::command("FETCH"))?;

        let first_part = SectionPath::Part(vec![1], None);
        let messages = assemble(
            &range,
            fetches
                .iter()
                .map(|f| (f.message, f.header(), f.section(&first_part))),
        )?;

        debug!(range = %seqset, fetched = messages.len(), "Fetched messages");
        Ok(messages)
    }

    async fn idle(&mut self, timeout: Duration, stop: CancellationToken) -> Result<(), ProtocolError> {
        let session = self.session.take().ok_or(ProtocolError::SessionLost)?;
        let mut handle = session.idle();
        handle.init().await.map_err(ProtocolError::command("IDLE"))?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let (wait, _interrupt) = handle.wait_with_timeout(remaining);
            let response = tokio::select! {
                response = wait => response.map_err(ProtocolError::command("IDLE"))?,
                () = stop.cancelled() => break,
            };
            match response {
                IdleResponse::NewData(data) => match forward_idle(&self.idle_tx, data.parsed()) {
                    Some(Notification::CountChanged(_)) => break,
                    Some(Notification::Expunged(_)) => {}
                    None => trace!(response = ?data.parsed(), "Ignoring IDLE response"),
                },
                IdleResponse::Timeout | IdleResponse::ManualInterrupt => break,
            }
        }

        let session = handle.done().await.map_err(ProtocolError::command("DONE"))?;
        self.session = Some(session);
        Ok(())
    }

    async fn move_messages(
        &mut self,
        set: &SequenceSet,
        destination: &str,
    ) -> Result<(), ProtocolError> {
        self.session()?
            .mv(set.to_string(), destination)
            .await
            .map_err(ProtocolError::command("MOVE"))
    }

    async fn logout(&mut self) -> Result<(), ProtocolError> {
        match self.session.take() {
            Some(mut session) => session
                .logout()
                .await
                .map_err(ProtocolError::command("LOGOUT")),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &[u8] = b"From: OpenShift Bot <notifications@github.com>\r\n\
Subject: Re: [o/r] Fix (#7)\r\n\r\n";

    #[test]
    fn unsolicited_exists_and_expunge_become_notifications() {
        assert_eq!(
            translate_unsolicited(UnsolicitedResponse::Exists(4)),
            Some(Notification::CountChanged(4))
        );
        assert_eq!(
            translate_unsolicited(UnsolicitedResponse::Expunge(2)),
            Some(Notification::Expunged(2))
        );
        assert_eq!(translate_unsolicited(UnsolicitedResponse::Recent(1)), None);
    }

    #[test]
    fn idle_exists_and_expunge_become_notifications() {
        assert_eq!(
            translate_idle(&Response::MailboxData(MailboxDatum::Exists(9))),
            Some(Notification::CountChanged(9))
        );
        assert_eq!(
            translate_idle(&Response::Expunge(3)),
            Some(Notification::Expunged(3))
        );
        assert_eq!(
            translate_idle(&Response::MailboxData(MailboxDatum::Recent(1))),
            None
        );
    }

    #[test]
    fn idle_responses_are_forwarded_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        forward_idle(&tx, &Response::Expunge(3));
        forward_idle(&tx, &Response::MailboxData(MailboxDatum::Recent(1)));
        forward_idle(&tx, &Response::MailboxData(MailboxDatum::Exists(9)));
        assert_eq!(rx.try_recv().unwrap(), Notification::Expunged(3));
        assert_eq!(rx.try_recv().unwrap(), Notification::CountChanged(9));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn forwarding_to_a_closed_stream_still_reports_the_event() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert_eq!(
            forward_idle(&tx, &Response::MailboxData(MailboxDatum::Exists(2))),
            Some(Notification::CountChanged(2))
        );
    }

    #[test]
    fn assemble_orders_by_sequence_and_skips_flag_updates() {
        let fetches = vec![
            (3, Some(HEADER), Some(&b"third"[..])),
            (9, None, None),
            (2, None, None),
            (2, Some(HEADER), Some(&b"second"[..])),
        ];
        let messages = assemble(&(2..=3), fetches).unwrap();
        let bodies: Vec<&str> = messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["second", "third"]);
        assert_eq!(messages[0].subject, "Re: [o/r] Fix (#7)");
    }

    #[test]
    fn missing_header_is_a_fetch_failure() {
        let fetches = vec![(1, Some(HEADER), None), (2, None, None)];
        let err = assemble(&(1..=2), fetches).unwrap_err();
        assert!(matches!(err, ProtocolError::Command { command: "FETCH", .. }));
        assert!(err.to_string().contains("message 2"));
    }
}
