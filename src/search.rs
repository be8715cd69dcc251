//! Two-phase candidate search.
//!
//! 1. **Primary**: a server-side search combining sender, subject and a
//!    recency bound.
//! 2. **Fallback**: the last `fallback_window` messages by folder position,
//!    narrowed by sender only. Runs whenever the primary phase yields no
//!    code, unless disabled in [`SearchConfig`].
//!
//! The phases are scanned in that order and the first one that yields a code
//! wins.

use crate::config::{RetrievalRequest, SearchConfig};
use crate::error::Result;
use crate::mailbox::MailboxSession;
use crate::matcher::Matcher;
use crate::message::CandidateMessage;
use crate::scanner::{scan, MatchResult};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::ops::RangeInclusive;
use tracing::{debug, instrument};

/// Criteria for the primary search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    /// Substring the sender must contain.
    pub sender: Option<String>,
    /// Substring the subject must contain.
    pub subject: Option<String>,
    /// Lower bound on the received time.
    pub received_after: Option<DateTime<Utc>>,
}

impl SearchCriteria {
    /// Derives the criteria for one attempt started at `now`.
    #[must_use]
    pub fn from_request(
        request: &RetrievalRequest,
        config: &SearchConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let received_after = config
            .lookback
            .and_then(|lookback| chrono::Duration::from_std(lookback).ok())
            .and_then(|lookback| now.checked_sub_signed(lookback));

        Self {
            sender: request.sender_filter.clone(),
            subject: request.subject_filter.clone(),
            received_after,
        }
    }

    /// Returns `true` if no criterion is set.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.sender.is_none() && self.subject.is_none() && self.received_after.is_none()
    }

    /// The criteria a server can evaluate.
    ///
    /// IMAP quoted strings carry only 7-bit printable text, so a filter with
    /// non-ASCII or control characters is dropped here and left to
    /// [`client_side`](Self::client_side).
    #[must_use]
    pub fn server_side(&self) -> SearchCriteria {
        SearchCriteria {
            sender: self.sender.clone().filter(|value| is_quotable(value)),
            subject: self.subject.clone().filter(|value| is_quotable(value)),
            received_after: self.received_after,
        }
    }

    /// The criteria left for the client after a server-side search: the
    /// filters [`server_side`](Self::server_side) dropped, plus the exact
    /// recency bound.
    #[must_use]
    pub fn client_side(&self) -> SearchCriteria {
        SearchCriteria {
            sender: self.sender.clone().filter(|value| !is_quotable(value)),
            subject: self.subject.clone().filter(|value| !is_quotable(value)),
            received_after: self.received_after,
        }
    }

    /// Renders the [`server_side`](Self::server_side) criteria as an IMAP
    /// SEARCH key.
    ///
    /// `SINCE` only has day granularity, so the exact bound is re-checked
    /// client-side with [`is_recent_enough`](Self::is_recent_enough).
    ///
    /// ```
    /// use otp_mailbox::search::SearchCriteria;
    ///
    /// let criteria = SearchCriteria {
    ///     sender: Some("noreply@booking.com".into()),
    ///     ..SearchCriteria::default()
    /// };
    /// assert_eq!(criteria.to_imap_query(), r#"FROM "noreply@booking.com""#);
    /// assert_eq!(SearchCriteria::default().to_imap_query(), "ALL");
    ///
    /// let localized = SearchCriteria {
    ///     subject: Some("Doğrulama kodu".into()),
    ///     ..SearchCriteria::default()
    /// };
    /// assert_eq!(localized.to_imap_query(), "ALL");
    /// ```
    #[must_use]
    pub fn to_imap_query(&self) -> String {
        let server = self.server_side();
        let mut keys = Vec::with_capacity(3);

        if let Some(sender) = &server.sender {
            keys.push(format!("FROM {}", quote(sender)));
        }
        if let Some(subject) = &server.subject {
            keys.push(format!("SUBJECT {}", quote(subject)));
        }
        if let Some(after) = server.received_after {
            // IMAP date format: "DD-Mon-YYYY" (e.g., "07-Dec-2025")
            keys.push(format!("SINCE {}", after.date_naive().format("%d-%b-%Y")));
        }

        if keys.is_empty() {
            "ALL".to_string()
        } else {
            keys.join(" ")
        }
    }

    /// Returns `true` if the message satisfies every criterion.
    #[must_use]
    pub fn matches(&self, message: &CandidateMessage) -> bool {
        self.sender
            .as_deref()
            .map_or(true, |sender| message.sender_contains(sender))
            && self
                .subject
                .as_deref()
                .map_or(true, |subject| message.subject_contains(subject))
            && self.is_recent_enough(message)
    }

    /// Applies the exact recency bound. Undated messages pass.
    #[must_use]
    pub fn is_recent_enough(&self, message: &CandidateMessage) -> bool {
        match (self.received_after, message.received) {
            (Some(after), Some(received)) => received >= after,
            _ => true,
        }
    }
}

/// Returns `true` if `value` fits in an IMAP quoted string.
fn is_quotable(value: &str) -> bool {
    value.bytes().all(|b| (0x20..0x7f).contains(&b))
}

/// Quotes an IMAP string, escaping `\` and `"`.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Sequence numbers of the last `size` messages in a folder of `total`.
///
/// Never starts below 1 and never spans more than `size` messages. Returns
/// `None` for an empty folder or a zero window.
#[must_use]
pub fn fallback_window(total: u32, size: u32) -> Option<RangeInclusive<u32>> {
    if total == 0 || size == 0 {
        return None;
    }
    let start = total.saturating_sub(size - 1).max(1);
    Some(start..=total)
}

/// Renders sequence numbers as an IMAP sequence set, compressing runs.
///
/// ```
/// use otp_mailbox::search::sequence_set;
///
/// assert_eq!(sequence_set(&[1, 2, 3, 5, 8, 9]), "1:3,5,8:9");
/// ```
#[must_use]
pub fn sequence_set(sequence: &[u32]) -> String {
    let mut out = String::new();
    let mut iter = sequence.iter().copied().peekable();

    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if !out.is_empty() {
            out.push(',');
        }
        if start == end {
            let _ = write!(out, "{start}");
        } else {
            let _ = write!(out, "{start}:{end}");
        }
    }

    out
}

/// Fetches the primary candidates in arrival order.
///
/// When no criterion can be sent to the server, every message in the folder
/// is a candidate. Criteria the server could not evaluate are applied to the
/// fetched messages.
///
/// # Errors
///
/// Propagates search and fetch failures from the session.
#[instrument(name = "search::primary", skip_all, fields(query = %criteria.to_imap_query()))]
pub async fn primary_candidates<S: MailboxSession>(
    session: &mut S,
    criteria: &SearchCriteria,
) -> Result<Vec<CandidateMessage>> {
    let sequence: Vec<u32> = if criteria.server_side().is_unfiltered() {
        (1..=session.message_count()).collect()
    } else {
        session.search(criteria).await?
    };

    debug!(count = sequence.len(), "Primary search result");

    if sequence.is_empty() {
        return Ok(Vec::new());
    }

    let mut messages = session.fetch(&sequence).await?;
    let client = criteria.client_side();
    messages.retain(|message| client.matches(message));
    Ok(messages)
}

/// Fetches the fallback candidates: the most recent `window` messages,
/// narrowed to the sender filter when one is set.
///
/// # Errors
///
/// Propagates fetch failures from the session.
#[instrument(name = "search::fallback", skip_all, fields(window = window))]
pub async fn fallback_candidates<S: MailboxSession>(
    session: &mut S,
    criteria: &SearchCriteria,
    window: u32,
) -> Result<Vec<CandidateMessage>> {
    let total = session.message_count();
    let Some(range) = fallback_window(total, window) else {
        debug!(total, "Folder empty, no fallback candidates");
        return Ok(Vec::new());
    };

    debug!(
        start = *range.start(),
        end = *range.end(),
        total,
        "Fallback scan of most recent messages"
    );

    let sequence: Vec<u32> = range.collect();
    let mut messages = session.fetch(&sequence).await?;

    if let Some(sender) = criteria.sender.as_deref() {
        messages.retain(|message| message.sender_contains(sender));
        debug!(sender, count = messages.len(), "Filtered fallback by sender");
    }

    Ok(messages)
}

/// Runs both phases against an open session and returns the first code found.
///
/// # Errors
///
/// Propagates session failures; an attempt that merely finds nothing returns
/// `Ok(None)`.
pub async fn run_search<S: MailboxSession>(
    session: &mut S,
    criteria: &SearchCriteria,
    config: &SearchConfig,
    matcher: &dyn Matcher,
) -> Result<Option<MatchResult>> {
    let primary = primary_candidates(session, criteria).await?;
    if let Some(found) = scan(&primary, matcher) {
        return Ok(Some(found));
    }

    if !config.fallback_enabled {
        return Ok(None);
    }

    let fallback = fallback_candidates(session, criteria, config.fallback_window).await?;
    Ok(scan(&fallback, matcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::mailbox::fake::{FakeConnector, StoredMessage};
    use crate::mailbox::Connector;
    use crate::matcher::VerificationCodeMatcher;
    use crate::scanner::MatchSource;
    use chrono::TimeZone;

    fn request(sender: Option<&str>, subject: Option<&str>) -> RetrievalRequest {
        let mut builder = RetrievalRequest::builder()
            .account("qa@gmail.com")
            .secret("secret");
        if let Some(sender) = sender {
            builder = builder.sender_filter(sender);
        }
        if let Some(subject) = subject {
            builder = builder.subject_filter(subject);
        }
        builder.build().unwrap()
    }

    fn minutes_ago(minutes: i64) -> Option<DateTime<Utc>> {
        Some(Utc::now() - chrono::Duration::minutes(minutes))
    }

    fn credentials() -> Credentials {
        Credentials::new("qa@gmail.com", "secret").unwrap()
    }

    #[test]
    fn test_criteria_from_request() {
        let now = Utc.with_ymd_and_hms(2025, 12, 8, 9, 30, 0).unwrap();
        let criteria = SearchCriteria::from_request(
            &request(Some("noreply@booking.com"), Some("verification")),
            &SearchConfig::default(),
            now,
        );

        assert_eq!(criteria.sender.as_deref(), Some("noreply@booking.com"));
        assert_eq!(criteria.subject.as_deref(), Some("verification"));
        assert_eq!(
            criteria.received_after,
            Some(Utc.with_ymd_and_hms(2025, 12, 7, 9, 30, 0).unwrap())
        );
        assert_eq!(
            criteria.to_imap_query(),
            r#"FROM "noreply@booking.com" SUBJECT "verification" SINCE 07-Dec-2025"#
        );
    }

    #[test]
    fn test_recency_bound_applies_without_filters() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let criteria =
            SearchCriteria::from_request(&request(None, None), &SearchConfig::default(), now);

        assert!(!criteria.is_unfiltered());
        assert_eq!(criteria.to_imap_query(), "SINCE 01-Jan-2025");
    }

    #[test]
    fn test_no_lookback_and_no_filters_is_unfiltered() {
        let config = SearchConfig {
            lookback: None,
            ..SearchConfig::default()
        };
        let criteria = SearchCriteria::from_request(&request(None, None), &config, Utc::now());
        assert!(criteria.is_unfiltered());
        assert_eq!(criteria.to_imap_query(), "ALL");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(r#"say "hi" \o/"#), r#""say \"hi\" \\o/""#);
    }

    #[test]
    fn test_non_ascii_subject_stays_client_side() {
        let now = Utc.with_ymd_and_hms(2025, 12, 8, 9, 30, 0).unwrap();
        let criteria = SearchCriteria::from_request(
            &request(Some("noreply@booking.com"), Some("Doğrulama kodu")),
            &SearchConfig::default(),
            now,
        );

        let server = criteria.server_side();
        assert_eq!(server.sender.as_deref(), Some("noreply@booking.com"));
        assert_eq!(server.subject, None);
        let client = criteria.client_side();
        assert_eq!(client.sender, None);
        assert_eq!(client.subject.as_deref(), Some("Doğrulama kodu"));
        assert_eq!(
            criteria.to_imap_query(),
            r#"FROM "noreply@booking.com" SINCE 07-Dec-2025"#
        );
        assert!(criteria.to_imap_query().is_ascii());
    }

    #[test]
    fn test_line_breaks_never_reach_the_query() {
        let criteria = SearchCriteria {
            sender: Some("a@b.c\r\nA2 DELETE INBOX".into()),
            subject: Some("code\tnow".into()),
            received_after: None,
        };

        assert!(criteria.server_side().is_unfiltered());
        assert_eq!(criteria.to_imap_query(), "ALL");
    }

    #[test]
    fn test_fallback_window_bounds() {
        assert_eq!(fallback_window(0, 30), None);
        assert_eq!(fallback_window(1, 30), Some(1..=1));
        assert_eq!(fallback_window(29, 30), Some(1..=29));
        assert_eq!(fallback_window(30, 30), Some(1..=30));
        assert_eq!(fallback_window(31, 30), Some(2..=31));
        assert_eq!(fallback_window(500, 30), Some(471..=500));
        assert_eq!(fallback_window(5, 0), None);

        for total in 0..200 {
            if let Some(range) = fallback_window(total, 30) {
                assert!(*range.start() >= 1);
                assert_eq!(*range.end(), total);
                assert!(range.count() <= 30);
            }
        }
    }

    #[test]
    fn test_sequence_set() {
        assert_eq!(sequence_set(&[]), "");
        assert_eq!(sequence_set(&[4]), "4");
        assert_eq!(sequence_set(&[1, 2, 3]), "1:3");
        assert_eq!(sequence_set(&[1, 3, 4, 10]), "1,3:4,10");
    }

    #[tokio::test]
    async fn test_primary_hit_skips_fallback() {
        let connector = FakeConnector::with_messages(vec![
            StoredMessage::new("noreply@booking.com", "Your code is AB12C3", "", minutes_ago(2)),
        ]);
        let mut session = connector.open(&credentials()).await.unwrap();
        let criteria = SearchCriteria::from_request(
            &request(Some("booking"), None),
            &SearchConfig::default(),
            Utc::now(),
        );

        let found = run_search(
            &mut session,
            &criteria,
            &SearchConfig::default(),
            VerificationCodeMatcher::shared(),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(found.code, "AB12C3");
        assert_eq!(found.source, MatchSource::Subject);
        assert_eq!(connector.journal(|j| j.fetches.len()), 1);
    }

    #[tokio::test]
    async fn test_fallback_finds_code_outside_primary_filter() {
        // Subject filter does not match, so only the fallback window sees it.
        let connector = FakeConnector::with_messages(vec![
            StoredMessage::new("noreply@booking.com", "Sign-in", "Use 4X9Q2Z", minutes_ago(1)),
            StoredMessage::new("news@other.com", "Deals 777777", "", minutes_ago(1)),
        ]);
        let mut session = connector.open(&credentials()).await.unwrap();
        let criteria = SearchCriteria::from_request(
            &request(Some("booking"), Some("verification code")),
            &SearchConfig::default(),
            Utc::now(),
        );

        let found = run_search(
            &mut session,
            &criteria,
            &SearchConfig::default(),
            VerificationCodeMatcher::shared(),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(found.code, "4X9Q2Z");
        assert_eq!(found.seq, 1);
        assert_eq!(connector.journal(|j| j.fetches.clone()), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_fallback_runs_when_primary_candidates_have_no_code() {
        let connector = FakeConnector::with_messages(vec![StoredMessage::new(
            "noreply@booking.com",
            "Welcome",
            "no code here",
            minutes_ago(1),
        )]);
        let mut session = connector.open(&credentials()).await.unwrap();
        let criteria = SearchCriteria::from_request(
            &request(Some("booking"), None),
            &SearchConfig::default(),
            Utc::now(),
        );

        let found = run_search(
            &mut session,
            &criteria,
            &SearchConfig::default(),
            VerificationCodeMatcher::shared(),
        )
        .await
        .unwrap();

        assert!(found.is_none());
        assert_eq!(connector.journal(|j| j.fetches.len()), 2);
    }

    #[tokio::test]
    async fn test_fallback_can_be_disabled() {
        let connector = FakeConnector::with_messages(vec![StoredMessage::new(
            "noreply@booking.com",
            "Sign-in",
            "Use 4X9Q2Z",
            minutes_ago(1),
        )]);
        let mut session = connector.open(&credentials()).await.unwrap();
        let config = SearchConfig {
            fallback_enabled: false,
            ..SearchConfig::default()
        };
        let criteria = SearchCriteria::from_request(
            &request(None, Some("verification")),
            &config,
            Utc::now(),
        );

        let found = run_search(&mut session, &criteria, &config, VerificationCodeMatcher::shared())
            .await
            .unwrap();

        assert!(found.is_none());
        assert!(connector.journal(|j| j.fetches.is_empty()));
    }

    #[test]
    fn test_exact_recency_bound() {
        let criteria = SearchCriteria {
            received_after: minutes_ago(24 * 60),
            ..SearchCriteria::default()
        };
        let at = |received| CandidateMessage {
            seq: 1,
            subject: None,
            sender: None,
            received,
            content: crate::content::ContentPart::text("text/plain", ""),
        };

        assert!(criteria.is_recent_enough(&at(minutes_ago(60))));
        assert!(!criteria.is_recent_enough(&at(minutes_ago(25 * 60))));
        assert!(criteria.is_recent_enough(&at(None)));
    }

    #[tokio::test]
    async fn test_unfiltered_primary_lists_all_messages() {
        let connector = FakeConnector::with_messages(vec![
            StoredMessage::new("a@x.com", "one", "", None),
            StoredMessage::new("b@x.com", "two", "", None),
        ]);
        let mut session = connector.open(&credentials()).await.unwrap();

        let primary = primary_candidates(&mut session, &SearchCriteria::default())
            .await
            .unwrap();

        assert_eq!(primary.len(), 2);
        assert!(connector.journal(|j| j.searches.is_empty()));
    }

    #[tokio::test]
    async fn test_fallback_on_empty_folder() {
        let connector = FakeConnector::default();
        let mut session = connector.open(&credentials()).await.unwrap();

        let fallback = fallback_candidates(&mut session, &SearchCriteria::default(), 30)
            .await
            .unwrap();

        assert!(fallback.is_empty());
        assert!(connector.journal(|j| j.fetches.is_empty()));
    }

    #[tokio::test]
    async fn test_non_ascii_subject_filters_after_fetch() {
        let connector = FakeConnector::with_messages(vec![
            StoredMessage::new("noreply@booking.com", "Doğrulama kodu: 7Q2W9E", "", minutes_ago(2)),
            StoredMessage::new("digest@news.com", "Weekly digest 123ABC", "", minutes_ago(1)),
        ]);
        let mut session = connector.open(&credentials()).await.unwrap();
        let config = SearchConfig {
            fallback_enabled: false,
            ..SearchConfig::default()
        };
        let criteria = SearchCriteria::from_request(
            &request(None, Some("Doğrulama kodu")),
            &config,
            Utc::now(),
        );

        let found = run_search(
            &mut session,
            &criteria,
            &config,
            VerificationCodeMatcher::shared(),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(found.code, "7Q2W9E");
        let query = connector.journal(|j| j.searches[0].to_imap_query());
        assert!(query.starts_with("SINCE "), "unexpected query: {query}");
        assert!(!query.contains("SUBJECT"));
    }
}
