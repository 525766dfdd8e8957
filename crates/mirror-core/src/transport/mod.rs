//! Uniform file operations over a mirrored tree
//!
//! Every path handed to a [`Transport`] is relative to the tree root the
//! transport was opened on. Both implementations give the same guarantees:
//! `ensure_directory` and `delete` are idempotent, and `copy_in` stamps the
//! destination with the requested modification time.

mod local;
mod remote;
#[cfg(feature = "sftp")]
mod sftp;

pub use local::LocalTransport;
pub use remote::{Connector, RemoteEntry, RemoteSession, RemoteTransport};
#[cfg(feature = "sftp")]
pub use sftp::{SftpConnector, SftpSession};

use std::path::Path;

use mirror_fs::RelativePath;

use crate::Result;
use crate::event::Timestamp;

/// Stat information about a file on a transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileMeta {
    pub len: u64,
    pub modified: Timestamp,
    pub is_dir: bool,
}

/// Capability interface over one directory tree.
///
/// Methods take `&mut self` because remote transports open their session
/// lazily and replace it after a connection failure.
pub trait Transport: Send {
    /// Human-readable location, used in logs.
    fn describe(&self) -> String;

    /// Check that the tree root is reachable and is a directory.
    fn verify_root(&mut self) -> Result<()>;

    /// `None` when nothing exists at `path`.
    fn metadata(&mut self, path: &RelativePath) -> Result<Option<FileMeta>>;

    /// Content checksum in `sha256:<hex>` form, `None` when absent.
    fn checksum(&mut self, path: &RelativePath) -> Result<Option<String>>;

    /// Create every missing directory from the root down to `path`.
    fn ensure_directory(&mut self, path: &RelativePath) -> Result<()>;

    /// Copy a local file to `dest` and set its modification time.
    ///
    /// Fails with [`crate::Error::SourceVanished`] when `source` no longer
    /// exists.
    fn copy_in(&mut self, source: &Path, dest: &RelativePath, mtime: Timestamp) -> Result<u64>;

    /// Remove the file at `path`. Returns `false` when it was already absent.
    fn delete(&mut self, path: &RelativePath) -> Result<bool>;

    fn exists(&mut self, path: &RelativePath) -> Result<bool> {
        Ok(self.metadata(path)?.is_some())
    }
}
