//! Content hashing for change detection.
//!
//! A generation record stores the SHA-256 of the source bytes that produced
//! its artifacts. Content-based rather than mtime-based, so re-uploading an
//! identical photo does not trigger regeneration while any pixel edit does.

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

/// Lowercase hex SHA-256 of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Lowercase hex SHA-256 of a file's contents.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}
