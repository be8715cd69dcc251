//! Message content tree and plain-text extraction.
//!
//! [`ContentPart`] is an owned mirror of a message's MIME structure. Text
//! parts keep their decoding outcome so that a part which fails to decode is
//! only discarded when the extractor reaches it, and traversal moves on to
//! its siblings.

use mailparse::{MailParseError, ParsedMail};

/// A node in a message's content tree.
#[derive(Debug)]
pub enum ContentPart {
    /// A `text/*` leaf with its decoded body.
    Text {
        /// The full media type, lower-cased (e.g. `text/plain`).
        mime_type: String,
        /// The transfer- and charset-decoded body.
        decoded: Result<String, MailParseError>,
    },
    /// A `multipart/*` container.
    Multipart {
        /// The full media type, lower-cased (e.g. `multipart/alternative`).
        mime_type: String,
        /// Child parts in document order.
        parts: Vec<ContentPart>,
    },
    /// Any other leaf (images, attachments). Never contributes text.
    Other {
        /// The full media type, lower-cased.
        mime_type: String,
    },
}

impl ContentPart {
    /// Builds a text leaf.
    #[must_use]
    pub fn text(mime_type: impl Into<String>, body: impl Into<String>) -> Self {
        ContentPart::Text {
            mime_type: mime_type.into(),
            decoded: Ok(body.into()),
        }
    }

    /// Builds a multipart container.
    #[must_use]
    pub fn multipart(mime_type: impl Into<String>, parts: Vec<ContentPart>) -> Self {
        ContentPart::Multipart {
            mime_type: mime_type.into(),
            parts,
        }
    }

    /// Returns the media type of this part.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        match self {
            ContentPart::Text { mime_type, .. }
            | ContentPart::Multipart { mime_type, .. }
            | ContentPart::Other { mime_type } => mime_type,
        }
    }

    /// Mirrors a parsed message into an owned tree.
    ///
    /// Only `text/*` leaves are decoded; other leaves keep just their type.
    #[must_use]
    pub fn from_parsed(parsed: &ParsedMail<'_>) -> Self {
        let mime_type = parsed.ctype.mimetype.to_ascii_lowercase();

        if mime_type.starts_with("multipart/") || !parsed.subparts.is_empty() {
            ContentPart::Multipart {
                parts: parsed.subparts.iter().map(Self::from_parsed).collect(),
                mime_type,
            }
        } else if mime_type.starts_with("text/") {
            ContentPart::Text {
                decoded: parsed.get_body(),
                mime_type,
            }
        } else {
            ContentPart::Other { mime_type }
        }
    }
}

/// Extracts the text of a content tree, depth-first.
///
/// A text part yields its decoded body. A multipart yields the first child
/// whose extracted text is not blank. Decoding failures yield `None` for that
/// part only.
#[must_use]
pub fn extract_text(part: &ContentPart) -> Option<&str> {
    match part {
        ContentPart::Text { decoded, .. } => decoded.as_deref().ok(),
        ContentPart::Multipart { parts, .. } => parts
            .iter()
            .filter_map(extract_text)
            .find(|text| !text.trim().is_empty()),
        ContentPart::Other { .. } => None,
    }
}
