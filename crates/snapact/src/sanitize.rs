//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Traces are safe to share for debugging — these functions ensure no
//! user identifiers or extracted document text leak into spans.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Returns a short deterministic hash of an owner id for correlation
/// without exposing the actual identifier.
pub fn redact_owner(owner_id: &str) -> String {
    let mut hasher = DefaultHasher::new();
    owner_id.hash(&mut hasher);
    let hash = hasher.finish();
    format!("{:016x}", hash)
}

/// Describes extracted text by length only. OCR output is user content
/// and never appears in spans verbatim.
pub fn describe_text(text: &str) -> String {
    format!("<{} chars>", text.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_owner_deterministic() {
        let h1 = redact_owner("user-123");
        let h2 = redact_owner("user-123");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
    }

    #[test]
    fn test_redact_owner_different_owners_differ() {
        assert_ne!(redact_owner("alice"), redact_owner("bob"));
    }

    #[test]
    fn test_redact_owner_hides_identifier() {
        assert!(!redact_owner("alice@example.com").contains("alice"));
    }

    #[test]
    fn test_describe_text() {
        assert_eq!(describe_text("hello"), "<5 chars>");
        assert_eq!(describe_text(""), "<0 chars>");
    }
}
