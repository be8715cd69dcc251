//! Selecting the newest verification code from a set of candidate messages.

use crate::content::extract_text;
use crate::matcher::Matcher;
use crate::message::CandidateMessage;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Where in a message a code was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    /// The `Subject` header.
    Subject,
    /// The extracted plain-text body.
    Body,
}

/// A code extracted from a candidate message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// The extracted code.
    pub code: String,
    /// Timestamp of the source message, if it could be read.
    pub received: Option<DateTime<Utc>>,
    /// Which field the code came from.
    pub source: MatchSource,
    /// Sequence number of the source message.
    pub seq: u32,
}

/// Scans `messages` (in arrival order) and returns the newest code found.
///
/// Messages are visited newest-first, but the winner is decided by timestamp:
/// a match replaces the current best only when its timestamp is strictly
/// later. An unknown timestamp ranks below every known one, so a match from
/// an undated message is kept only until a dated match turns up. Within one
/// message the subject is tried before the body.
#[must_use]
pub fn scan(messages: &[CandidateMessage], matcher: &dyn Matcher) -> Option<MatchResult> {
    let mut best: Option<MatchResult> = None;

    for message in messages.iter().rev() {
        debug!(
            seq = message.seq,
            subject = ?message.subject,
            sender = ?message.sender,
            received = ?message.received,
            content = message.content.mime_type(),
            "Scanning message"
        );

        let subject_hit = message
            .subject
            .as_deref()
            .and_then(|subject| matcher.find_match(subject))
            .map(|code| (code.into_owned(), MatchSource::Subject));

        let body_hit = extract_text(&message.content)
            .and_then(|body| matcher.find_match(body))
            .map(|code| (code.into_owned(), MatchSource::Body));

        for (code, source) in subject_hit.into_iter().chain(body_hit) {
            let candidate = MatchResult {
                code,
                received: message.received,
                source,
                seq: message.seq,
            };
            if is_newer(&candidate, best.as_ref()) {
                debug!(
                    seq = candidate.seq,
                    source = ?candidate.source,
                    received = ?candidate.received,
                    "New best candidate code"
                );
                best = Some(candidate);
            }
        }
    }

    if let Some(best) = &best {
        debug!(seq = best.seq, received = ?best.received, "Newest code selected");
    }

    best
}

/// `None < Some(_)` in `Option`'s ordering encodes "unknown is oldest".
fn is_newer(candidate: &MatchResult, best: Option<&MatchResult>) -> bool {
    best.map_or(true, |best| candidate.received > best.received)
}
