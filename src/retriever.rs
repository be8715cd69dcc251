//! The poll loop.
//!
//! [`CodeRetriever`] repeats search attempts until a code is found, the
//! request's deadline passes, or the caller cancels. Each attempt opens its
//! own session and closes it before the attempt returns.
//!
//! # Example
//!
//! ```no_run
//! use otp_mailbox::{CodeRetriever, EngineConfig, RetrievalRequest};
//! use std::time::Duration;
//!
//! # async fn example() -> otp_mailbox::Result<()> {
//! let request = RetrievalRequest::builder()
//!     .account("qa.bot@gmail.com")
//!     .secret("abcd efgh ijkl mnop")
//!     .sender_filter("noreply@booking.com")
//!     .timeout(Duration::from_secs(90))
//!     .build()?;
//!
//! let retriever = CodeRetriever::new(EngineConfig::default());
//! let code = retriever.retrieve(&request).await?;
//! println!("Got code: {code}");
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancelSignal;
use crate::config::{EngineConfig, RetrievalRequest};
use crate::error::{Error, Result};
use crate::mailbox::{with_session, Connector};
use crate::matcher::{Matcher, VerificationCodeMatcher};
use crate::scanner::MatchResult;
use crate::search::{run_search, SearchCriteria};
use crate::session::ImapConnector;
use chrono::Utc;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Retrieves verification codes from a mailbox.
///
/// One retriever can serve any number of requests, sequentially or
/// concurrently. Requests share nothing but the connector and configuration.
pub struct CodeRetriever<C: Connector = ImapConnector> {
    connector: C,
    config: EngineConfig,
    matcher: Arc<dyn Matcher>,
}

impl CodeRetriever<ImapConnector> {
    /// Creates a retriever that connects to `config.server` over IMAP.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let connector = ImapConnector::new(config.server.clone(), config.timeouts.clone());
        Self::with_connector(connector, config)
    }
}

impl<C: Connector> CodeRetriever<C> {
    /// Creates a retriever over a custom connector.
    pub fn with_connector(connector: C, config: EngineConfig) -> Self {
        Self {
            connector,
            config,
            matcher: Arc::new(VerificationCodeMatcher::new()),
        }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Polls the mailbox until a code arrives or `request.timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`Error::WaitTimeout`] if no code was found and every attempt completed.
    /// - [`Error::WaitTimeoutWithError`] if no code was found and at least one
    ///   attempt failed; wraps the most recent failure.
    /// - Errors for which [`Error::is_retryable`] is `false` are returned
    ///   immediately, without waiting for the deadline. These are configuration
    ///   problems such as [`Error::InvalidDnsName`] for an invalid host name.
    ///   Every attempt would fail the same way, so polling again cannot
    ///   produce a code.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<String> {
        self.retrieve_with_cancel(request, &CancelSignal::never())
            .await
    }

    /// Like [`retrieve`](Self::retrieve), but stops when `cancel` fires.
    ///
    /// Cancellation is observed during the initial delay and between
    /// attempts. An attempt already in flight runs to completion.
    ///
    /// # Errors
    ///
    /// As [`retrieve`](Self::retrieve), plus [`Error::Cancelled`].
    #[instrument(
        name = "CodeRetriever::retrieve",
        skip_all,
        fields(
            account = %request.masked_account(),
            sender_filter = ?request.sender_filter,
            subject_filter = ?request.subject_filter,
            timeout = ?request.timeout
        )
    )]
    pub async fn retrieve_with_cancel(
        &self,
        request: &RetrievalRequest,
        cancel: &CancelSignal,
    ) -> Result<String> {
        if let Some(delay) = request.initial_delay {
            debug!(?delay, "Waiting before first attempt");
            pause(delay, cancel).await?;
        }

        let timeout = request.timeout;
        let interval = self.config.polling.interval;
        let deadline = Instant::now() + timeout;
        let mut last_error: Option<Error> = None;
        let mut attempt = 0u32;

        while Instant::now() < deadline {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            attempt += 1;
            match self.attempt(request).await {
                Ok(Some(found)) => {
                    info!(
                        attempt,
                        seq = found.seq,
                        source = ?found.source,
                        received = ?found.received,
                        "Verification code found"
                    );
                    return Ok(found.code);
                }
                Ok(None) => debug!(attempt, "No verification code yet"),
                Err(e) if e.is_retryable() => {
                    warn!(attempt, error = %e, category = ?e.category(), "Attempt failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            pause(interval.min(remaining), cancel).await?;
        }

        Err(match last_error {
            Some(source) => Error::WaitTimeoutWithError {
                timeout,
                source: Box::new(source),
            },
            None => Error::WaitTimeout { timeout },
        })
    }

    /// Runs a single search attempt: open, search, scan, close.
    ///
    /// # Errors
    ///
    /// Returns the connector's or session's error. The session is closed
    /// either way.
    pub async fn attempt(&self, request: &RetrievalRequest) -> Result<Option<MatchResult>> {
        let criteria = SearchCriteria::from_request(request, &self.config.search, Utc::now());
        let search = self.config.search.clone();
        let matcher = Arc::clone(&self.matcher);

        with_session(&self.connector, request.credentials(), move |session| {
            async move { run_search(session, &criteria, &search, matcher.as_ref()).await }.boxed()
        })
        .await
    }
}

impl<C: Connector + std::fmt::Debug> std::fmt::Debug for CodeRetriever<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeRetriever")
            .field("connector", &self.connector)
            .field("config", &self.config)
            .field("matcher", &self.matcher.description())
            .finish()
    }
}

/// Sleeps for `duration` unless `cancel` fires first.
async fn pause(duration: Duration, cancel: &CancelSignal) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    tokio::select! {
        () = tokio::time::sleep(duration) => Ok(()),
        () = cancel.cancelled() => {
            debug!("Cancelled while waiting");
            Err(Error::Cancelled)
        }
    }
}
