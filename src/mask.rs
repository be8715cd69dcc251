//! Account masking for log output.
//!
//! The engine never hands a raw account identifier to `tracing`; every log
//! field goes through [`MaskedAccount`].
//!
//! ```
//! use otp_mailbox::mask::mask_account;
//!
//! assert_eq!(mask_account("abcdef@x.com"), "a***f@x.com");
//! assert_eq!(mask_account("ab@x.com"), "**@x.com");
//! ```

use std::fmt;

const MIDDLE_MASK: &str = "***";
const SHORT_MASK: &str = "**";

/// Masks the local part of an account identifier, leaving the domain intact.
///
/// Local parts longer than two characters keep their first and last character;
/// shorter ones are fully masked. Input without `@` is masked entirely.
#[must_use]
pub fn mask_account(account: &str) -> String {
    let Some((local, domain)) = account.split_once('@') else {
        return MIDDLE_MASK.to_string();
    };

    let mut chars = local.chars();
    let masked_local = match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if local.chars().count() > 2 => {
            format!("{first}{MIDDLE_MASK}{last}")
        }
        _ => SHORT_MASK.to_string(),
    };

    format!("{masked_local}@{domain}")
}

/// Display wrapper that renders an account identifier masked.
#[derive(Clone, Copy)]
pub struct MaskedAccount<'a>(pub &'a str);

impl fmt::Display for MaskedAccount<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&mask_account(self.0))
    }
}

impl fmt::Debug for MaskedAccount<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", mask_account(self.0))
    }
}
