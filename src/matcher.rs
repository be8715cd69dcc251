//! Verification-code matching.
//!
//! A code is a 6-character ASCII alphanumeric token, bounded by word boundaries,
//! that contains at least one digit. Case is preserved in the result.
//!
//! # Example
//!
//! ```
//! use otp_mailbox::matcher::{Matcher, VerificationCodeMatcher};
//!
//! let matcher = VerificationCodeMatcher::shared();
//! assert_eq!(matcher.find_match("Your code is AB12C3").as_deref(), Some("AB12C3"));
//! assert_eq!(matcher.find_match("HELLOWORLD and BANANA"), None);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Length of a verification code.
pub const CODE_LENGTH: usize = 6;

static SHARED: Lazy<VerificationCodeMatcher> = Lazy::new(VerificationCodeMatcher::new);

/// Trait for extracting a code from a text field (subject or body).
///
/// The scanner applies a matcher once per field and keeps the first token it
/// returns.
pub trait Matcher: Send + Sync {
    /// Returns the first matching token in `text`, if any.
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>>;

    /// Returns a human-readable description of what this matcher looks for.
    ///
    /// Used in logging.
    fn description(&self) -> &str;
}

/// Matcher for fixed-length alphanumeric verification codes.
///
/// Tokens made only of letters are skipped, so `"BANANA 4X9Q2Z"` yields
/// `"4X9Q2Z"`.
#[derive(Debug, Clone)]
pub struct VerificationCodeMatcher {
    token: Regex,
    description: String,
}

impl VerificationCodeMatcher {
    /// Creates a matcher for 6-character codes.
    ///
    /// # Panics
    ///
    /// Never in practice: the pattern is a compile-time constant.
    #[must_use]
    pub fn new() -> Self {
        // Codes are ASCII only. The regex crate has no lookahead, so the
        // digit requirement is checked per token in `find_match`.
        let pattern = format!(r"\b[A-Za-z0-9]{{{CODE_LENGTH}}}\b");
        Self {
            token: Regex::new(&pattern).expect("valid regex"),
            description: format!("{CODE_LENGTH}-character alphanumeric code"),
        }
    }

    /// Returns the process-wide matcher instance.
    #[must_use]
    pub fn shared() -> &'static Self {
        &SHARED
    }
}

impl Default for VerificationCodeMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher for VerificationCodeMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        self.token
            .find_iter(text)
            .map(|m| m.as_str())
            .find(|token| token.bytes().any(|b| b.is_ascii_digit()))
            .map(Cow::Borrowed)
    }

    fn description(&self) -> &str {
        &self.description
    }
}
