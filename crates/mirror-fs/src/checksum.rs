//! SHA-256 checksum utilities
//!
//! Provides a single canonical checksum format (`sha256:<hex>`). Files are
//! hashed by streaming fixed-size chunks so large files are never loaded
//! whole into memory.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// Size of the read buffer used while hashing.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Compute the SHA-256 checksum of in-memory content.
///
/// Returns a string in the canonical format `"sha256:<hex>"`.
pub fn compute_content_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Compute the SHA-256 checksum of everything a reader yields.
pub fn compute_reader_checksum(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(format!("{}{:x}", PREFIX, hasher.finalize()))
}

/// Compute the SHA-256 checksum of a file's contents.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read. A file removed
/// while hashing surfaces as [`io::ErrorKind::NotFound`] on open.
pub fn compute_file_checksum(path: &Path) -> io::Result<String> {
    compute_reader_checksum(File::open(path)?)
}
