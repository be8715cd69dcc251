//! Example: Branching on how a retrieval ended.
//!
//! This example demonstrates how to tell "the code never arrived" apart from
//! "the mailbox was unreachable", and how to cancel a retrieval from another
//! task.
//!
//! # Usage
//!
//! ```bash
//! export OTP_EMAIL_ACCOUNT="your@gmail.com"
//! export OTP_EMAIL_APP_PASSWORD="your-app-password"
//! cargo run --example error_handling
//! ```

use otp_mailbox::{
    cancel_pair, CodeRetriever, EngineConfig, Error, ErrorCategory, RetrievalRequestBuilder,
};
use std::time::Duration;

/// Gives up waiting after this long, even if the request timeout is longer.
const USER_PATIENCE: Duration = Duration::from_secs(45);

fn describe(error: &Error) {
    match error {
        Error::WaitTimeout { timeout } => {
            // The mailbox answered every time; nothing matched
            println!("No code arrived within {timeout:?}. Was it sent to this account?");
        }
        Error::WaitTimeoutWithError { timeout, source } => {
            // At least one attempt failed; this is the most recent failure
            println!("Mailbox unreachable for {timeout:?}");
            println!("  Last error: {source}");
            match source.category() {
                ErrorCategory::Protocol => {
                    println!("  Check the app password and that IMAP is enabled");
                }
                ErrorCategory::Network | ErrorCategory::Timeout => {
                    println!("  Check network access to imap.gmail.com:993");
                }
                _ => {}
            }
        }
        Error::Cancelled => println!("Cancelled before a code arrived"),
        other => {
            println!("Configuration error: {other}");
            println!("This error is NOT retryable - fix your configuration");
        }
    }
}

#[tokio::main]
async fn main() {
    println!("otp-mailbox - Error Handling Example\n");
    println!("====================================\n");

    let request = match RetrievalRequestBuilder::from_env().and_then(|b| b.build()) {
        Ok(r) => r,
        Err(e) => {
            describe(&e);
            std::process::exit(1);
        }
    };

    let config = match EngineConfig::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            describe(&e);
            std::process::exit(1);
        }
    };

    let (handle, signal) = cancel_pair();
    let watchdog = tokio::spawn(async move {
        tokio::time::sleep(USER_PATIENCE).await;
        println!("Out of patience, cancelling...");
        handle.cancel();
    });

    let retriever = CodeRetriever::new(config);
    match retriever.retrieve_with_cancel(&request, &signal).await {
        Ok(code) => println!("Found code: {code}"),
        Err(e) => describe(&e),
    }

    watchdog.abort();
    println!("Done!");
}
