//! Filesystem layer for dirmirror
//!
//! Provides root-relative path values, streaming content checksums and the
//! idempotent local I/O primitives the reconciliation engine is built on.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod path;

pub use config::{ConfigFormat, ConfigStore};
pub use error::{Error, Result};
pub use path::{NormalizedPath, RelativePath, canonical_root};
