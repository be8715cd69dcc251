//! Error types for the otp-mailbox crate.
//!
//! Per-attempt failures (network, protocol, per-operation timeouts) are
//! classified as retryable and absorbed by the poll loop. Only deadline
//! exhaustion, cancellation and configuration problems reach the caller.
//! See [`Error::is_retryable`] and [`Error::category`].

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while retrieving a verification code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Request and engine configuration (returned immediately)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid account address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The rejected address, already masked.
        email: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Per-attempt transport failures (recorded and retried)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Per-operation timeouts (recorded and retried)
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Authentication timeout.
    #[error("authentication timeout for {account} after {timeout:?}")]
    AuthTimeout {
        /// The account used for authentication, masked.
        account: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Read-only mailbox open timeout.
    #[error("mailbox examine timeout for '{mailbox}' after {timeout:?}")]
    ExamineTimeout {
        /// The mailbox name.
        mailbox: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Search command timeout.
    #[error("search timeout after {timeout:?}")]
    SearchTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Message fetch timeout.
    #[error("message fetch timeout for sequence set {sequence_set} after {timeout:?}")]
    FetchTimeout {
        /// The sequence set being fetched.
        sequence_set: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Per-attempt IMAP failures (recorded and retried)
    // ─────────────────────────────────────────────────────────────────────────
    /// IMAP login failed.
    #[error("IMAP login failed for {account}")]
    ImapLogin {
        /// The account used for login, masked.
        account: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to open the mailbox read-only.
    #[error("failed to examine mailbox '{mailbox}'")]
    ExamineMailbox {
        /// The mailbox name.
        mailbox: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP search failed.
    #[error("IMAP search failed for query {query}")]
    ImapSearch {
        /// The query that was sent.
        query: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP fetch failed.
    #[error("IMAP fetch failed for sequence set {sequence_set}")]
    ImapFetch {
        /// The sequence set that failed.
        sequence_set: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to fetch message from stream.
    #[error("failed to fetch message from stream")]
    FetchMessage {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP logout failed (logged, never surfaced by the poll loop).
    #[error("IMAP logout failed")]
    ImapLogout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Logout timeout (not critical).
    #[error("logout timeout after {timeout:?}")]
    LogoutTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Outcomes of the poll loop (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Deadline reached, no code found and every attempt reached the mailbox.
    #[error("verification code not found within {timeout:?}")]
    WaitTimeout {
        /// The overall timeout that was exceeded.
        timeout: Duration,
    },

    /// Deadline reached after at least one failed attempt.
    #[error("verification code could not be fetched within {timeout:?}")]
    WaitTimeoutWithError {
        /// The overall timeout that was exceeded.
        timeout: Duration,
        /// The last per-attempt failure.
        #[source]
        source: Box<Error>,
    },

    /// Cancellation was observed at a suspension point.
    #[error("verification code retrieval cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` if this error is a per-attempt failure that the poll loop
    /// records and retries after the polling interval.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::ExamineTimeout { .. }
            | Error::SearchTimeout { .. }
            | Error::FetchTimeout { .. }
            | Error::ImapLogin { .. }
            | Error::ExamineMailbox { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::FetchMessage { .. } => true,

            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. }
            | Error::ImapLogout { .. }
            | Error::LogoutTimeout { .. }
            | Error::WaitTimeout { .. }
            | Error::WaitTimeoutWithError { .. }
            | Error::Cancelled => false,
        }
    }

    /// Returns `true` if the deadline passed without the mailbox ever yielding a code.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::WaitTimeout { .. } | Error::WaitTimeoutWithError { .. }
        )
    }

    /// Returns the last per-attempt failure wrapped by [`Error::WaitTimeoutWithError`].
    #[must_use]
    pub fn last_attempt_error(&self) -> Option<&Error> {
        match self {
            Error::WaitTimeoutWithError { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. } => ErrorCategory::Configuration,

            Error::TcpConnect { .. } | Error::TlsConnect { .. } => ErrorCategory::Network,

            Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::ExamineTimeout { .. }
            | Error::SearchTimeout { .. }
            | Error::FetchTimeout { .. }
            | Error::LogoutTimeout { .. } => ErrorCategory::Timeout,

            Error::ImapLogin { .. }
            | Error::ExamineMailbox { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::FetchMessage { .. }
            | Error::ImapLogout { .. } => ErrorCategory::Protocol,

            Error::WaitTimeout { .. } => ErrorCategory::NotFound,
            Error::WaitTimeoutWithError { source, .. } => source.category(),

            Error::Cancelled => ErrorCategory::Cancelled,
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP protocol errors.
    Protocol,
    /// The code never arrived.
    NotFound,
    /// The caller cancelled the retrieval.
    Cancelled,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::Cancelled => write!(f, "cancelled"),
        }
    }
}
