//! IMAP implementation of the mailbox seam.
//!
//! [`ImapConnector`] connects over TLS, logs in, and opens the folder with
//! `EXAMINE` so the session is read-only. Messages are fetched with
//! `BODY.PEEK[]`, which never sets `\Seen`. Every protocol step is bounded by
//! its entry in [`TimeoutConfig`].

use crate::config::{Credentials, ServerConfig, TimeoutConfig};
use crate::connection::{self, TlsStream};
use crate::error::{Error, Result};
use crate::mailbox::{Connector, MailboxSession};
use crate::message::CandidateMessage;
use crate::search::{sequence_set, SearchCriteria};
use async_imap::Session;
use chrono::Utc;
use futures::StreamExt;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument, warn};

/// Type alias for IMAP session over TLS.
type ImapSession = Session<TlsStream>;

const FETCH_ITEMS: &str = "(INTERNALDATE BODY.PEEK[])";

/// Opens read-only IMAP sessions against one server.
#[derive(Clone)]
pub struct ImapConnector {
    server: ServerConfig,
    timeouts: TimeoutConfig,
    tls: TlsConnector,
}

impl ImapConnector {
    /// Creates a connector for `server`.
    #[must_use]
    pub fn new(server: ServerConfig, timeouts: TimeoutConfig) -> Self {
        Self {
            server,
            timeouts,
            tls: connection::tls_connector(),
        }
    }

    /// Returns the server this connector talks to.
    #[must_use]
    pub fn server(&self) -> &ServerConfig {
        &self.server
    }
}

impl Default for ImapConnector {
    fn default() -> Self {
        Self::new(ServerConfig::default(), TimeoutConfig::default())
    }
}

impl std::fmt::Debug for ImapConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnector")
            .field("server", &self.server)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl Connector for ImapConnector {
    type Session = ImapMailbox;

    #[instrument(
        name = "ImapConnector::open",
        skip_all,
        fields(
            account = %credentials.masked_account(),
            imap_host = %self.server().host,
            folder = %self.server().folder
        )
    )]
    async fn open(&self, credentials: &Credentials) -> Result<ImapMailbox> {
        let server = self.server();
        let target_addr = server.address();
        let timeouts = &self.timeouts;

        let tls_stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_tls_connection(&self.tls, &server.host, &target_addr),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target_addr.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("TLS connection established");

        let mut session = tokio::time::timeout(timeouts.auth, authenticate(tls_stream, credentials))
            .await
            .map_err(|_| Error::AuthTimeout {
                account: credentials.masked_account().to_string(),
                timeout: timeouts.auth,
            })??;

        debug!("Authenticated");

        let folder = &server.folder;
        let examined = tokio::time::timeout(timeouts.examine, session.examine(folder))
            .await
            .map_err(|_| Error::ExamineTimeout {
                mailbox: folder.clone(),
                timeout: timeouts.examine,
            })?;

        let mailbox = match examined {
            Ok(mailbox) => mailbox,
            Err(source) => {
                // Best effort: the caller never sees a half-open session.
                let _ = tokio::time::timeout(timeouts.logout, session.logout()).await;
                return Err(Error::ExamineMailbox {
                    mailbox: folder.clone(),
                    source,
                });
            }
        };

        debug!(exists = mailbox.exists, "Examined folder read-only");

        Ok(ImapMailbox {
            session,
            exists: mailbox.exists,
            timeouts: timeouts.clone(),
        })
    }
}

/// Logs in and returns an authenticated session.
async fn authenticate(tls_stream: TlsStream, credentials: &Credentials) -> Result<ImapSession> {
    let client = async_imap::Client::new(tls_stream);

    debug!("Authenticating to IMAP server");

    client
        .login(credentials.account(), credentials.secret())
        .await
        .map_err(|e| Error::ImapLogin {
            account: credentials.masked_account().to_string(),
            source: e.0,
        })
}

/// A read-only IMAP session on one folder.
pub struct ImapMailbox {
    session: ImapSession,
    exists: u32,
    timeouts: TimeoutConfig,
}

impl std::fmt::Debug for ImapMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapMailbox")
            .field("exists", &self.exists)
            .finish_non_exhaustive()
    }
}

impl MailboxSession for ImapMailbox {
    fn message_count(&self) -> u32 {
        self.exists
    }

    #[instrument(name = "ImapMailbox::search", skip_all)]
    async fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<u32>> {
        let query = criteria.to_imap_query();
        let timeout = self.timeouts.search;

        let found = tokio::time::timeout(timeout, self.session.search(&query))
            .await
            .map_err(|_| Error::SearchTimeout { timeout })?
            .map_err(|source| Error::ImapSearch {
                query: query.clone(),
                source,
            })?;

        let mut sequence: Vec<u32> = found.into_iter().collect();
        sequence.sort_unstable();

        debug!(query = %query, count = sequence.len(), "Search complete");

        Ok(sequence)
    }

    #[instrument(name = "ImapMailbox::fetch", skip_all, fields(count = sequence.len()))]
    async fn fetch(&mut self, sequence: &[u32]) -> Result<Vec<CandidateMessage>> {
        if sequence.is_empty() {
            return Ok(Vec::new());
        }

        let set = sequence_set(sequence);
        let timeout = self.timeouts.fetch;

        let fetched = tokio::time::timeout(timeout, async {
            let mut stream = self
                .session
                .fetch(&set, FETCH_ITEMS)
                .await
                .map_err(|source| Error::ImapFetch {
                    sequence_set: set.clone(),
                    source,
                })?;

            let mut messages = Vec::with_capacity(sequence.len());
            while let Some(item) = stream.next().await {
                let fetch = item.map_err(|source| Error::FetchMessage { source })?;
                if let Some(message) = to_candidate(&fetch) {
                    messages.push(message);
                }
            }
            Ok::<_, Error>(messages)
        })
        .await
        .map_err(|_| Error::FetchTimeout {
            sequence_set: set.clone(),
            timeout,
        })??;

        let mut messages = fetched;
        messages.sort_by_key(|message| message.seq);

        debug!(sequence_set = %set, fetched = messages.len(), "Fetch complete");

        Ok(messages)
    }

    #[instrument(name = "ImapMailbox::close", skip_all)]
    async fn close(&mut self) -> Result<()> {
        let timeout = self.timeouts.logout;

        tokio::time::timeout(timeout, self.session.logout())
            .await
            .map_err(|_| Error::LogoutTimeout { timeout })?
            .map_err(|source| Error::ImapLogout { source })
    }
}

/// Converts one FETCH response into a candidate, skipping what cannot be parsed.
fn to_candidate(fetch: &async_imap::types::Fetch) -> Option<CandidateMessage> {
    let seq = fetch.message;

    let Some(body) = fetch.body() else {
        debug!(seq, "Message has no body");
        return None;
    };

    let internal_date = fetch.internal_date().map(|date| date.with_timezone(&Utc));

    match CandidateMessage::from_raw(seq, internal_date, body) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(seq, error = %e, "Failed to parse email, skipping message");
            None
        }
    }
}
