//! Basic example: Wait for a verification code from email.
//!
//! This example demonstrates the most common use case - polling a Gmail inbox
//! until a login verification code arrives.
//!
//! # Usage
//!
//! ```bash
//! export OTP_EMAIL_ACCOUNT="your@gmail.com"
//! export OTP_EMAIL_APP_PASSWORD="your-app-password"
//! export OTP_EMAIL_FROM_FILTER="noreply@booking.com"   # optional
//! cargo run --example basic_otp
//! ```
//!
//! For Gmail, you'll need to use an [App Password](https://support.google.com/accounts/answer/185833).

use otp_mailbox::{CodeRetriever, EngineConfig, RetrievalRequestBuilder};

#[tokio::main]
async fn main() -> otp_mailbox::Result<()> {
    // Read account, app password and filters from the environment
    let request = RetrievalRequestBuilder::from_env()?.build()?;

    println!(
        "Waiting up to {:?} for a code for {}...",
        request.timeout,
        request.masked_account()
    );
    println!("(Trigger a login that sends a code, or press Ctrl+C to cancel)");

    let retriever = CodeRetriever::new(EngineConfig::default());
    let code = retriever.retrieve(&request).await?;

    println!("Got verification code: {code}");

    Ok(())
}
