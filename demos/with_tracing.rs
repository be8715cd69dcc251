//! Example: Using tracing for observability.
//!
//! This example demonstrates how to enable structured logging using
//! the `tracing` ecosystem. Every attempt, search phase and IMAP command
//! emits a span; account names appear masked.
//!
//! # Usage
//!
//! ```bash
//! export OTP_EMAIL_ACCOUNT="your@gmail.com"
//! export OTP_EMAIL_APP_PASSWORD="your-app-password"
//! # Set log level (trace, debug, info, warn, error)
//! export RUST_LOG=otp_mailbox=debug
//!
//! cargo run --example with_tracing
//! ```

use otp_mailbox::{CodeRetriever, EngineConfig, RetrievalRequestBuilder};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> otp_mailbox::Result<()> {
    // Initialize tracing subscriber with environment filter
    // Use RUST_LOG environment variable to control log levels
    // Example: RUST_LOG=otp_mailbox=debug,info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("otp_mailbox=info")),
        )
        .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let request = RetrievalRequestBuilder::from_env()?
        .timeout(Duration::from_secs(30))
        .build()?;

    tracing::info!(account = %request.masked_account(), "Starting otp-mailbox example");

    let config = EngineConfig::builder()
        .poll_interval(Duration::from_secs(5))
        .build()?;

    let retriever = CodeRetriever::new(config);
    tracing::debug!(
        interval = ?retriever.config().polling.interval,
        imap_host = %retriever.config().server.host,
        "Configuration built successfully"
    );

    // A single attempt emits spans for connect, search, fetch and logout
    match retriever.attempt(&request).await {
        Ok(Some(found)) => {
            tracing::info!(code = %found.code, source = ?found.source, "Found code already waiting");
            println!("\nFound code: {}", found.code);
            return Ok(());
        }
        Ok(None) => tracing::info!("No code yet, polling"),
        Err(e) => tracing::warn!(error = %e, "First attempt failed, polling anyway"),
    }

    match retriever.retrieve(&request).await {
        Ok(code) => {
            tracing::info!(code = %code, "Found code");
            println!("\nFound code: {code}");
        }
        Err(e) => {
            tracing::warn!(error = %e, category = %e.category(), "No code found");
            println!("\nNo code found: {e}");
        }
    }

    tracing::info!("Example completed");

    Ok(())
}
