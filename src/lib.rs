//! # otp-mailbox
//!
//! Async retrieval of one-time verification codes from an IMAP mailbox.
//!
//! Automated login flows often stop at "we sent you a code". This crate polls
//! the mailbox the code was sent to and returns the newest code it finds:
//!
//! - Opens a fresh read-only session per attempt (`EXAMINE`, `BODY.PEEK[]`),
//!   so nothing is ever marked as read
//! - Searches by sender, subject and a 24 hour recency bound, then falls back
//!   to the last 30 messages filtered by sender
//! - Picks the code from the most recently received matching message
//! - Retries connection failures until the deadline, then reports whether
//!   the mailbox was unreachable or the code simply never arrived
//!
//! A code is a 6 character alphanumeric token containing at least one digit.
//!
//! ## Features
//!
//! - **`observability`**: Enables OpenTelemetry integration for distributed tracing.
//!   Without this feature, tracing spans are still emitted but require no OTEL dependencies.
//!
//! ## Quick Start
//!
//! ```no_run
//! use otp_mailbox::{CodeRetriever, EngineConfig, RetrievalRequest};
//! use std::time::Duration;
//!
//! # async fn example() -> otp_mailbox::Result<()> {
//! let request = RetrievalRequest::builder()
//!     .account("qa.bot@gmail.com")
//!     .secret("abcd efgh ijkl mnop")  // Gmail app password; spaces are stripped
//!     .sender_filter("noreply@booking.com")
//!     .timeout(Duration::from_secs(120))
//!     .build()?;
//!
//! let retriever = CodeRetriever::new(EngineConfig::default());
//! let code = retriever.retrieve(&request).await?;
//! println!("Got code: {code}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration From the Environment
//!
//! ```no_run
//! use otp_mailbox::{CodeRetriever, EngineConfig, RetrievalRequestBuilder};
//!
//! # async fn example() -> otp_mailbox::Result<()> {
//! // Reads OTP_EMAIL_ACCOUNT, OTP_EMAIL_APP_PASSWORD and the optional filters.
//! let request = RetrievalRequestBuilder::from_env()?.build()?;
//! let code = CodeRetriever::new(EngineConfig::default()).retrieve(&request).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation
//!
//! ```no_run
//! use otp_mailbox::cancel::cancel_pair;
//! use otp_mailbox::{CodeRetriever, EngineConfig, RetrievalRequest};
//!
//! # async fn example(request: RetrievalRequest) -> otp_mailbox::Result<()> {
//! let (handle, signal) = cancel_pair();
//! let retriever = CodeRetriever::new(EngineConfig::default());
//!
//! // Elsewhere: handle.cancel();
//! # handle.cancel();
//! match retriever.retrieve_with_cancel(&request, &signal).await {
//!     Err(otp_mailbox::Error::Cancelled) => println!("stopped"),
//!     other => println!("{other:?}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Per-attempt failures are retried. Apart from configuration errors, a
//! retrieval without a code ends in one of three ways:
//!
//! ```
//! use otp_mailbox::Error;
//!
//! fn explain(error: &Error) -> &'static str {
//!     match error {
//!         Error::WaitTimeout { .. } => "the code never arrived",
//!         Error::WaitTimeoutWithError { .. } => "the mailbox was unreachable",
//!         Error::Cancelled => "cancelled",
//!         _ => "invalid configuration",
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. Account names only ever
//! reach logs masked (`q***o@gmail.com`).
//!
//! ### Span Naming Convention
//!
//! - `CodeRetriever::retrieve` - One retrieval, all attempts
//! - `ImapConnector::open` - Connect, authenticate, examine
//! - `search::primary` / `search::fallback` - The two search phases
//! - `ImapMailbox::search` / `ImapMailbox::fetch` / `ImapMailbox::close` - IMAP commands
//! - `connection::establish_tls` - TLS connection
//!
//! ### Standard Fields
//!
//! - `account` - Account name, masked
//! - `imap_host` - IMAP server hostname
//! - `sender_filter` / `subject_filter` - Search filters
//! - `seq` - Message sequence number
//!
//! Enable the `observability` feature for OpenTelemetry integration.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod cancel;
pub mod config;
pub mod content;
pub mod error;
pub mod mailbox;
pub mod mask;
pub mod matcher;
pub mod message;
pub mod scanner;
pub mod search;

// Internal modules
mod connection;
mod retriever;
mod session;

// Re-exports for ergonomic API
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use config::{
    Credentials, EngineConfig, EngineConfigBuilder, PollingConfig, RetrievalRequest,
    RetrievalRequestBuilder, SearchConfig, ServerConfig, TimeoutConfig,
};
pub use email_address::EmailAddress;
pub use error::{Error, ErrorCategory, Result};
pub use retriever::CodeRetriever;
pub use scanner::{MatchResult, MatchSource};
pub use session::{ImapConnector, ImapMailbox};
