use sha2::{Digest, Sha256};

/// Default number of hex characters kept from a content digest.
pub const DEFAULT_HASH_LEN: usize = 8;

/// Hex SHA-256 of `content`, truncated to `len` characters.
///
/// The truncated digest names both the compiled artifact and its loader, so
/// two scripts with identical text share one cache entry.
pub fn content_hash(content: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(len.min(digest.len()));
    digest
}

/// Short identifier used to scope a page's styles.
pub fn scope_id(page_path: &str) -> String {
    content_hash(page_path, 6)
}
