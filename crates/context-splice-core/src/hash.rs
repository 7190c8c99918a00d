//! Content hashing for embedding staleness detection.
//!
//! The hash is a change detector, not a security primitive: content is
//! stripped of all whitespace before hashing so that re-indenting or
//! re-wrapping a file does not force a new embedding.

use sha2::{Digest, Sha256};

/// Remove every whitespace character from `text`.
pub fn normalize_content(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// SHA-256 of the whitespace-normalized content, as lowercase hex.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_content(text).as_bytes());
    format!("{:x}", hasher.finalize())
}
