//! Content hashing for change logs.
//!
//! This module provides SHA256-based content fingerprints. `Content` is a
//! `BTreeMap`, so its JSON serialization is canonical (sorted property
//! names) and equal contents always hash equally.

use sha2::{Digest, Sha256};

use crate::model::Content;

/// Compute a SHA256 hash of a content mapping, as 64 lowercase hex chars.
#[must_use]
pub fn content_hash(content: &Content) -> String {
    let mut hasher = Sha256::new();
    // Serializing a map of JSON values into a Vec cannot fail.
    let json = serde_json::to_vec(content).unwrap_or_default();
    hasher.update(&json);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Element, Record};

    #[test]
    fn test_content_hash_deterministic() {
        let content = Record::bare(1).with("name", "x").with("n", 42).content().clone();

        let hash1 = content_hash(&content);
        let hash2 = content_hash(&content.clone());

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA256 produces 64 hex chars
    }

    #[test]
    fn test_content_hash_ignores_insertion_order() {
        let a = Record::bare(1).with("a", 1).with("b", 2);
        let b = Record::bare(1).with("b", 2).with("a", 1);
        assert_eq!(content_hash(a.content()), content_hash(b.content()));
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        let a = Record::bare(1).with("v", 42);
        let b = Record::bare(1).with("v", 43);
        assert_ne!(content_hash(a.content()), content_hash(b.content()));
    }
}
