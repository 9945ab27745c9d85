//! Classification of device transport errors into finer-grained kinds.
//!
//! The mapping is a deliberate substring heuristic over the raw transport
//! message. Keeping it as an explicit table makes the fragility visible and
//! keeps it in one tested place.

use crate::core::types::ErrorKind;

/// Ordered substring patterns checked against the lowercased message.
/// First match wins; no match falls back to [`ErrorKind::Transport`].
const PATTERNS: &[(&str, ErrorKind)] = &[
    ("not found", ErrorKind::ElementNotFound),
    ("timed out", ErrorKind::Timeout),
    ("timeout", ErrorKind::Timeout),
];

/// Map a raw device transport error message to an [`ErrorKind`].
pub fn classify_transport_message(message: &str) -> ErrorKind {
    let lowered = message.to_lowercase();
    for (needle, kind) in PATTERNS {
        if lowered.contains(needle) {
            return *kind;
        }
    }
    ErrorKind::Transport
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_element_not_found() {
        assert_eq!(
            classify_transport_message("element with text 'Save' not found"),
            ErrorKind::ElementNotFound
        );
    }

    #[test]
    fn timeout_variants_map_to_timeout() {
        assert_eq!(
            classify_transport_message("adb command timed out after 30s"),
            ErrorKind::Timeout
        );
        assert_eq!(
            classify_transport_message("Timeout waiting for device"),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(
            classify_transport_message("Element NOT FOUND on screen"),
            ErrorKind::ElementNotFound
        );
    }

    #[test]
    fn unmatched_messages_fall_back_to_transport() {
        assert_eq!(
            classify_transport_message("device offline"),
            ErrorKind::Transport
        );
        assert_eq!(classify_transport_message(""), ErrorKind::Transport);
    }
}
