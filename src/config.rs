//! Configuration for verification-code retrieval.
//!
//! Two structs are passed explicitly into every call; nothing is read from
//! process-wide state:
//!
//! - [`RetrievalRequest`]: one retrieval (account, secret, filters, timeout).
//! - [`EngineConfig`]: how the engine talks to the mailbox (server, per-operation
//!   timeouts, polling interval, search tuning).
//!
//! ```
//! use otp_mailbox::RetrievalRequest;
//! use std::time::Duration;
//!
//! let request = RetrievalRequest::builder()
//!     .account("user@gmail.com")
//!     .secret("abcd efgh ijkl mnop")
//!     .sender_filter("noreply@booking.com")
//!     .timeout(Duration::from_secs(60))
//!     .build()
//!     .expect("valid request");
//!
//! assert_eq!(request.credentials().secret(), "abcdefghijklmnop");
//! ```

use crate::error::{Error, Result};
use crate::mask::{mask_account, MaskedAccount};
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Default overall timeout for a retrieval.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Environment variable names read by [`RetrievalRequestBuilder::from_env`].
pub mod env_keys {
    /// Account address.
    pub const ACCOUNT: &str = "OTP_EMAIL_ACCOUNT";
    /// App password.
    pub const SECRET: &str = "OTP_EMAIL_APP_PASSWORD";
    /// Sender substring filter.
    pub const SENDER_FILTER: &str = "OTP_EMAIL_FROM_FILTER";
    /// Subject substring filter.
    pub const SUBJECT_FILTER: &str = "OTP_EMAIL_SUBJECT_FILTER";
    /// Overall timeout in seconds.
    pub const TIMEOUT_SECONDS: &str = "OTP_EMAIL_TIMEOUT_SECONDS";
    /// Initial delay in seconds.
    pub const INITIAL_DELAY_SECONDS: &str = "OTP_EMAIL_INITIAL_DELAY_SECONDS";
}

/// Login credentials for the mailbox.
#[derive(Clone)]
pub struct Credentials {
    account: EmailAddress,
    secret: SecretString,
}

impl Credentials {
    /// Validates `account` and sanitizes `secret`.
    ///
    /// All whitespace is stripped from the secret, so app passwords pasted as
    /// `"abcd efgh ijkl mnop"` work unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEmailFormat`] if the account is not a valid
    /// address, or [`Error::InvalidConfig`] if the secret is blank.
    pub fn new(account: &str, secret: &str) -> Result<Self> {
        let account = EmailAddress::parse_with_options(account, email_address::Options::default())
            .map_err(|_| Error::InvalidEmailFormat {
                email: mask_account(account),
            })?;

        let sanitized: String = secret.chars().filter(|c| !c.is_whitespace()).collect();
        if sanitized.is_empty() {
            return Err(Error::InvalidConfig {
                message: "secret is required".into(),
            });
        }

        Ok(Self {
            account,
            secret: SecretString::from(sanitized),
        })
    }

    /// Returns the account address.
    #[must_use]
    pub fn account(&self) -> &str {
        self.account.as_str()
    }

    /// Returns the account in its masked, loggable form.
    #[must_use]
    pub fn masked_account(&self) -> MaskedAccount<'_> {
        MaskedAccount(self.account.as_str())
    }

    /// Returns the sanitized secret.
    ///
    /// Only the connector should call this.
    #[must_use]
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.masked_account())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// One verification-code retrieval. Immutable once built.
#[derive(Clone)]
pub struct RetrievalRequest {
    credentials: Credentials,
    /// Substring the sender must contain.
    pub sender_filter: Option<String>,
    /// Substring the subject must contain.
    pub subject_filter: Option<String>,
    /// Overall time budget, measured after the initial delay.
    pub timeout: Duration,
    /// Wait before the first attempt.
    pub initial_delay: Option<Duration>,
}

impl std::fmt::Debug for RetrievalRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalRequest")
            .field("credentials", &self.credentials)
            .field("sender_filter", &self.sender_filter)
            .field("subject_filter", &self.subject_filter)
            .field("timeout", &self.timeout)
            .field("initial_delay", &self.initial_delay)
            .finish()
    }
}

impl RetrievalRequest {
    /// Creates a new request builder.
    #[must_use]
    pub fn builder() -> RetrievalRequestBuilder {
        RetrievalRequestBuilder::default()
    }

    /// Returns the mailbox credentials.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns the account in its masked, loggable form.
    #[must_use]
    pub fn masked_account(&self) -> MaskedAccount<'_> {
        self.credentials.masked_account()
    }
}

/// Builder for [`RetrievalRequest`].
#[derive(Default)]
pub struct RetrievalRequestBuilder {
    account: Option<String>,
    secret: Option<String>,
    sender_filter: Option<String>,
    subject_filter: Option<String>,
    timeout: Option<Duration>,
    initial_delay: Option<Duration>,
}

impl std::fmt::Debug for RetrievalRequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalRequestBuilder")
            .field("account", &self.account.as_deref().map(MaskedAccount))
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("sender_filter", &self.sender_filter)
            .field("subject_filter", &self.subject_filter)
            .field("timeout", &self.timeout)
            .field("initial_delay", &self.initial_delay)
            .finish()
    }
}

impl RetrievalRequestBuilder {
    /// Sets the account address (required).
    #[must_use]
    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Sets the secret (required). For Gmail, use an app password.
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Only consider messages whose sender contains this substring.
    #[must_use]
    pub fn sender_filter(mut self, sender: impl Into<String>) -> Self {
        self.sender_filter = Some(sender.into());
        self
    }

    /// Only consider messages whose subject contains this substring (primary search).
    #[must_use]
    pub fn subject_filter(mut self, subject: impl Into<String>) -> Self {
        self.subject_filter = Some(subject.into());
        self
    }

    /// Sets the overall time budget. Default is 120 seconds.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Waits this long before the first attempt.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Populates the builder from `OTP_EMAIL_*` environment variables.
    ///
    /// See [`env_keys`] for the variable names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Populates the builder from any key lookup, using the [`env_keys`] names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a numeric value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let seconds = |key: &str| -> Result<Option<Duration>> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .map(Duration::from_secs)
                        .map_err(|_| Error::InvalidConfig {
                            message: format!("{key} must be a whole number of seconds"),
                        })
                })
                .transpose()
        };

        Ok(Self {
            account: lookup(env_keys::ACCOUNT),
            secret: lookup(env_keys::SECRET),
            sender_filter: lookup(env_keys::SENDER_FILTER),
            subject_filter: lookup(env_keys::SUBJECT_FILTER),
            timeout: seconds(env_keys::TIMEOUT_SECONDS)?,
            initial_delay: seconds(env_keys::INITIAL_DELAY_SECONDS)?,
        })
    }

    /// Builds the request.
    ///
    /// Blank filters are treated as absent and a zero initial delay as none.
    ///
    /// # Errors
    ///
    /// Returns an error if the account or secret is missing or invalid, or if
    /// a filter contains control characters such as a line break.
    pub fn build(self) -> Result<RetrievalRequest> {
        let account = self.account.ok_or_else(|| Error::InvalidConfig {
            message: "account is required".into(),
        })?;
        let secret = self.secret.ok_or_else(|| Error::InvalidConfig {
            message: "secret is required".into(),
        })?;

        let sender_filter = filter("sender filter", self.sender_filter)?;
        let subject_filter = filter("subject filter", self.subject_filter)?;

        Ok(RetrievalRequest {
            credentials: Credentials::new(&account, &secret)?,
            sender_filter,
            subject_filter,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            initial_delay: self.initial_delay.filter(|delay| !delay.is_zero()),
        })
    }
}

/// Trims a filter, rejecting control characters that would break an IMAP command line.
fn filter(name: &str, value: Option<String>) -> Result<Option<String>> {
    let value = non_blank(value);
    if value.as_deref().is_some_and(|v| v.chars().any(char::is_control)) {
        return Err(Error::InvalidConfig {
            message: format!("{name} must not contain control characters"),
        });
    }
    Ok(value)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Mailbox server location.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IMAP-over-TLS host.
    pub host: String,
    /// IMAP-over-TLS port.
    pub port: u16,
    /// Folder opened read-only.
    pub folder: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".into(),
            port: 993,
            folder: "INBOX".into(),
        }
    }
}

impl ServerConfig {
    /// Returns the server address as "host:port".
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timeout configuration for individual protocol operations.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for opening the folder read-only.
    pub examine: Duration,
    /// Timeout for a SEARCH command.
    pub search: Duration,
    /// Timeout for fetching message content.
    pub fetch: Duration,
    /// Timeout for logout.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            examine: Duration::from_secs(10),
            search: Duration::from_secs(10),
            fetch: Duration::from_secs(30),
            logout: Duration::from_secs(5),
        }
    }
}

/// Poll loop configuration.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Wait between attempts, after a miss or a failed attempt.
    pub interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
        }
    }
}

/// Search tuning.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Recency bound of the primary search. `None` disables it.
    pub lookback: Option<Duration>,
    /// Number of most recent messages scanned by the fallback phase.
    pub fallback_window: u32,
    /// Whether to run the fallback phase when the primary phase finds no code.
    ///
    /// The fallback roughly doubles mailbox traffic per attempt.
    pub fallback_enabled: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lookback: Some(Duration::from_secs(24 * 60 * 60)),
            fallback_window: 30,
            fallback_enabled: true,
        }
    }
}

/// Engine-wide settings shared by every retrieval.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Server location.
    pub server: ServerConfig,
    /// Per-operation timeouts.
    pub timeouts: TimeoutConfig,
    /// Poll loop settings.
    pub polling: PollingConfig,
    /// Search tuning.
    pub search: SearchConfig,
}

impl EngineConfig {
    /// Creates a new configuration builder starting from the defaults.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Overrides the IMAP host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    /// Overrides the IMAP port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.connect = timeout;
        self
    }

    /// Sets the wait between attempts.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.polling.interval = interval;
        self
    }

    /// Sets the primary search recency bound. `None` disables it.
    #[must_use]
    pub fn lookback(mut self, lookback: Option<Duration>) -> Self {
        self.config.search.lookback = lookback;
        self
    }

    /// Sets how many recent messages the fallback phase scans.
    #[must_use]
    pub fn fallback_window(mut self, window: u32) -> Self {
        self.config.search.fallback_window = window;
        self
    }

    /// Enables or disables the fallback phase.
    #[must_use]
    pub fn fallback_enabled(mut self, enabled: bool) -> Self {
        self.config.search.fallback_enabled = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty host, a zero polling
    /// interval, or an empty fallback window while the fallback is enabled.
    pub fn build(self) -> Result<EngineConfig> {
        let config = self.config;

        if config.server.host.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "host must not be empty".into(),
            });
        }
        if config.polling.interval.is_zero() {
            return Err(Error::InvalidConfig {
                message: "poll interval must be greater than zero".into(),
            });
        }
        if config.search.fallback_enabled && config.search.fallback_window == 0 {
            return Err(Error::InvalidConfig {
                message: "fallback window must be at least one message".into(),
            });
        }

        Ok(config)
    }
}
