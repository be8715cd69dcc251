//! The mailbox seam: connectors open sessions, sessions search and fetch.
//!
//! [`ImapConnector`](crate::ImapConnector) is the production
//! implementation. Sessions are read-only and live for exactly one attempt;
//! [`with_session`] guarantees they are closed on every exit path.

use crate::config::Credentials;
use crate::error::Result;
use crate::message::CandidateMessage;
use crate::search::SearchCriteria;
use futures::future::BoxFuture;
use std::future::Future;
use tracing::{debug, warn};

/// An open, read-only view of one mailbox folder.
pub trait MailboxSession: Send {
    /// Number of messages in the folder when it was opened.
    fn message_count(&self) -> u32;

    /// Runs a server-side search and returns matching sequence numbers in
    /// ascending (arrival) order.
    fn search(&mut self, criteria: &SearchCriteria)
        -> impl Future<Output = Result<Vec<u32>>> + Send;

    /// Fetches the given messages, in ascending sequence order.
    ///
    /// Messages that cannot be parsed are skipped.
    fn fetch(&mut self, sequence: &[u32])
        -> impl Future<Output = Result<Vec<CandidateMessage>>> + Send;

    /// Ends the session.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens mailbox sessions. Never retries; retrying belongs to the poll loop.
pub trait Connector: Send + Sync {
    /// The session type produced by this connector.
    type Session: MailboxSession;

    /// Connects, authenticates and opens the folder read-only.
    fn open(&self, credentials: &Credentials)
        -> impl Future<Output = Result<Self::Session>> + Send;
}

/// Opens a session, runs `f` on it and closes it before returning.
///
/// The session is closed whether `f` succeeds or fails. A failure to close is
/// logged and never replaces `f`'s result.
///
/// # Errors
///
/// Returns the connector's error if the session cannot be opened, otherwise
/// whatever `f` returns.
pub async fn with_session<C, T, F>(connector: &C, credentials: &Credentials, f: F) -> Result<T>
where
    C: Connector,
    F: for<'s> FnOnce(&'s mut C::Session) -> BoxFuture<'s, Result<T>>,
{
    let mut session = connector.open(credentials).await?;
    let outcome = f(&mut session).await;

    match session.close().await {
        Ok(()) => debug!("Session closed"),
        Err(e) => warn!(error = %e, "Session close failed"),
    }

    outcome
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory mailbox used by the search and poll loop tests.

    use super::{Connector, MailboxSession};
    use crate::config::Credentials;
    use crate::content::ContentPart;
    use crate::error::{Error, Result};
    use crate::message::CandidateMessage;
    use crate::search::SearchCriteria;
    use chrono::{DateTime, Utc};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// A stored message; turned into a fresh `CandidateMessage` on each fetch.
    #[derive(Debug, Clone)]
    pub(crate) struct StoredMessage {
        pub subject: Option<String>,
        pub sender: Option<String>,
        pub received: Option<DateTime<Utc>>,
        pub body: String,
    }

    impl StoredMessage {
        pub(crate) fn new(
            sender: &str,
            subject: &str,
            body: &str,
            received: Option<DateTime<Utc>>,
        ) -> Self {
            Self {
                subject: Some(subject.to_string()),
                sender: Some(sender.to_string()),
                received,
                body: body.to_string(),
            }
        }
    }

    /// What the mailbox observed, shared between the test and the connector.
    #[derive(Debug, Default)]
    pub(crate) struct Journal {
        pub opens: Vec<Instant>,
        pub closes: usize,
        pub searches: Vec<SearchCriteria>,
        pub fetches: Vec<Vec<u32>>,
    }

    #[derive(Debug, Default)]
    struct State {
        messages: Vec<StoredMessage>,
        open_failures: VecDeque<bool>,
        fail_search: bool,
        journal: Journal,
    }

    /// Connector over an in-memory folder.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct FakeConnector {
        state: Arc<Mutex<State>>,
    }

    impl FakeConnector {
        pub(crate) fn with_messages(messages: Vec<StoredMessage>) -> Self {
            let connector = Self::default();
            connector.state.lock().unwrap().messages = messages;
            connector
        }

        /// Scripts the next opens: `true` fails with a connection error.
        pub(crate) fn script_opens(&self, failures: impl IntoIterator<Item = bool>) {
            self.state.lock().unwrap().open_failures = failures.into_iter().collect();
        }

        pub(crate) fn fail_searches(&self) {
            self.state.lock().unwrap().fail_search = true;
        }

        pub(crate) fn deliver(&self, message: StoredMessage) {
            self.state.lock().unwrap().messages.push(message);
        }

        pub(crate) fn journal<R>(&self, read: impl FnOnce(&Journal) -> R) -> R {
            read(&self.state.lock().unwrap().journal)
        }
    }

    pub(crate) struct FakeSession {
        state: Arc<Mutex<State>>,
        count: u32,
    }

    impl Connector for FakeConnector {
        type Session = FakeSession;

        async fn open(&self, _credentials: &Credentials) -> Result<FakeSession> {
            let mut state = self.state.lock().unwrap();
            state.journal.opens.push(Instant::now());

            if state.open_failures.pop_front().unwrap_or(false) {
                return Err(Error::TcpConnect {
                    target: "imap.gmail.com:993".into(),
                    source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
                });
            }

            let count = u32::try_from(state.messages.len()).unwrap();
            Ok(FakeSession {
                state: Arc::clone(&self.state),
                count,
            })
        }
    }

    impl MailboxSession for FakeSession {
        fn message_count(&self) -> u32 {
            self.count
        }

        async fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<u32>> {
            let mut state = self.state.lock().unwrap();
            state.journal.searches.push(criteria.clone());

            if state.fail_search {
                return Err(Error::SearchTimeout {
                    timeout: std::time::Duration::from_secs(10),
                });
            }

            // Mirrors a server: only what reaches the SEARCH command filters.
            let server = criteria.server_side();
            Ok((1..=self.count)
                .filter(|&seq| server.matches(&materialize(&state.messages, seq)))
                .collect())
        }

        async fn fetch(&mut self, sequence: &[u32]) -> Result<Vec<CandidateMessage>> {
            let mut state = self.state.lock().unwrap();
            state.journal.fetches.push(sequence.to_vec());
            Ok(sequence
                .iter()
                .map(|&seq| materialize(&state.messages, seq))
                .collect())
        }

        async fn close(&mut self) -> Result<()> {
            self.state.lock().unwrap().journal.closes += 1;
            Ok(())
        }
    }

    fn materialize(messages: &[StoredMessage], seq: u32) -> CandidateMessage {
        let stored = &messages[seq as usize - 1];
        CandidateMessage {
            seq,
            subject: stored.subject.clone(),
            sender: stored.sender.clone(),
            received: stored.received,
            content: ContentPart::text("text/plain", stored.body.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeConnector, StoredMessage};
    use super::*;
    use crate::error::Error;
    use futures::FutureExt;

    fn credentials() -> Credentials {
        Credentials::new("qa@gmail.com", "app password").unwrap()
    }

    #[tokio::test]
    async fn test_session_closed_after_success() {
        let connector = FakeConnector::with_messages(vec![StoredMessage::new(
            "a@b.c", "hi", "", None,
        )]);

        let count = with_session(&connector, &credentials(), |session| {
            async move { Ok(session.message_count()) }.boxed()
        })
        .await
        .unwrap();

        assert_eq!(count, 1);
        assert_eq!(connector.journal(|j| j.closes), 1);
    }

    #[tokio::test]
    async fn test_session_closed_after_error() {
        let connector = FakeConnector::default();
        connector.fail_searches();

        let result: Result<Vec<u32>> = with_session(&connector, &credentials(), |session| {
            async move { session.search(&SearchCriteria::default()).await }.boxed()
        })
        .await;

        assert!(matches!(result, Err(Error::SearchTimeout { .. })));
        assert_eq!(connector.journal(|j| j.closes), 1);
    }

    #[tokio::test]
    async fn test_failed_open_runs_nothing() {
        let connector = FakeConnector::default();
        connector.script_opens([true]);

        let result = with_session(&connector, &credentials(), |_| {
            async move { Ok(()) }.boxed()
        })
        .await;

        assert!(matches!(result, Err(Error::TcpConnect { .. })));
        assert_eq!(connector.journal(|j| j.closes), 0);
    }
}
