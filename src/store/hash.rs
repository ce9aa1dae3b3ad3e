//! Content hashing for change detection.
//!
//! Documents are compared by the SHA256 of their serialized bytes. The store
//! uses it to detect concurrent modification during read-modify-write, and
//! migration uses it to derive stable ids from legacy content.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// SHA256 of raw bytes as lowercase hex.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA256 of a value's JSON serialization.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn value_hash<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    Ok(content_hash(&json))
}

/// Check whether content changed since a previously observed hash.
///
/// `None` on either side means "no document"; two absent documents are equal.
#[must_use]
pub fn has_changed(current: Option<&str>, observed: Option<&str>) -> bool {
    current != observed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct TestRecord {
        id: String,
        value: i32,
    }

    #[test]
    fn test_content_hash_deterministic() {
        let hash1 = content_hash(b"{\"a\":1}");
        let hash2 = content_hash(b"{\"a\":1}");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_value_hash_changes_with_content() {
        let a = value_hash(&TestRecord { id: "t".into(), value: 42 }).unwrap();
        let b = value_hash(&TestRecord { id: "t".into(), value: 43 }).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_has_changed() {
        assert!(!has_changed(None, None));
        assert!(has_changed(Some("abc"), None));
        assert!(has_changed(Some("abc"), Some("xyz")));
        assert!(!has_changed(Some("abc"), Some("abc")));
    }
}
