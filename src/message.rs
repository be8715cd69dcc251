//! Candidate messages read from the mailbox.

use crate::content::ContentPart;
use chrono::{DateTime, TimeZone, Utc};
use mailparse::{parse_mail, MailHeaderMap, MailParseError};

/// A message fetched during one attempt. Never persisted.
///
/// Every metadata field is optional: a header that is missing or cannot be
/// decoded leaves its field empty rather than rejecting the message.
#[derive(Debug)]
pub struct CandidateMessage {
    /// Sequence number in the examined folder (1-based).
    pub seq: u32,
    /// Decoded `Subject` header.
    pub subject: Option<String>,
    /// Decoded `From` header.
    pub sender: Option<String>,
    /// Server receive time, falling back to the `Date` header.
    pub received: Option<DateTime<Utc>>,
    /// The message body as a content tree.
    pub content: ContentPart,
}

impl CandidateMessage {
    /// Parses a fetched RFC 5322 message.
    ///
    /// `internal_date` is the server's INTERNALDATE, preferred over the
    /// sender-controlled `Date` header when present.
    ///
    /// # Errors
    ///
    /// Returns the parse error if the message structure cannot be read at all.
    pub fn from_raw(
        seq: u32,
        internal_date: Option<DateTime<Utc>>,
        raw: &[u8],
    ) -> Result<Self, MailParseError> {
        let parsed = parse_mail(raw)?;
        let headers = &parsed.headers;

        let received = internal_date.or_else(|| {
            headers
                .get_first_value("Date")
                .and_then(|date| mailparse::dateparse(&date).ok())
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        });

        Ok(Self {
            seq,
            subject: headers.get_first_value("Subject"),
            sender: headers.get_first_value("From"),
            received,
            content: ContentPart::from_parsed(&parsed),
        })
    }

    /// Returns `true` if the sender contains `needle`, ignoring case.
    ///
    /// A message with no readable sender never matches.
    #[must_use]
    pub fn sender_contains(&self, needle: &str) -> bool {
        self.sender
            .as_deref()
            .is_some_and(|sender| contains_ignore_case(sender, needle))
    }

    /// Returns `true` if the subject contains `needle`, ignoring case.
    #[must_use]
    pub fn subject_contains(&self, needle: &str) -> bool {
        self.subject
            .as_deref()
            .is_some_and(|subject| contains_ignore_case(subject, needle))
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::extract_text;

    const SIMPLE: &[u8] = b"From: Booking <noreply@booking.com>\r\n\
Subject: =?UTF-8?Q?Your_code_is_AB12C3?=\r\n\
Date: Tue, 1 Jul 2025 10:05:00 +0000\r\n\
\r\n\
Use the code in the subject.";

    #[test]
    fn test_from_raw_reads_headers() {
        let message = CandidateMessage::from_raw(7, None, SIMPLE).unwrap();

        assert_eq!(message.seq, 7);
        assert_eq!(message.subject.as_deref(), Some("Your code is AB12C3"));
        assert_eq!(
            message.sender.as_deref(),
            Some("Booking <noreply@booking.com>")
        );
        assert_eq!(
            message.received,
            Utc.with_ymd_and_hms(2025, 7, 1, 10, 5, 0).single()
        );
        assert_eq!(
            extract_text(&message.content),
            Some("Use the code in the subject.")
        );
    }

    #[test]
    fn test_internal_date_preferred_over_date_header() {
        let internal = Utc.with_ymd_and_hms(2025, 7, 1, 11, 0, 0).single();
        let message = CandidateMessage::from_raw(1, internal, SIMPLE).unwrap();
        assert_eq!(message.received, internal);
    }

    #[test]
    fn test_missing_headers_are_tolerated() {
        let message = CandidateMessage::from_raw(3, None, b"\r\nbody 998877").unwrap();

        assert!(message.subject.is_none());
        assert!(message.sender.is_none());
        assert!(message.received.is_none());
        assert!(!message.sender_contains("booking"));
    }

    #[test]
    fn test_contains_ignores_case() {
        let message = CandidateMessage::from_raw(1, None, SIMPLE).unwrap();
        assert!(message.sender_contains("NOREPLY@booking.com"));
        assert!(message.subject_contains("your code"));
        assert!(!message.sender_contains("airbnb"));
    }
}
