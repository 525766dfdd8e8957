//! Shared test utilities for the dirmirror workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`tree`]: [`TestTree`] scratch directory with mtime-aware helpers
//! - [`remote`]: [`MemoryRemote`], an in-memory SFTP stand-in with failure injection
//! - [`watch`]: [`ChannelWatch`], a watch service driven by the test
//! - [`wait`]: polling helpers for asynchronous assertions

pub mod remote;
pub mod tree;
pub mod wait;
pub mod watch;

pub use remote::{MemoryConnector, MemoryFile, MemoryRemote, MemoryTransportFactory};
pub use tree::TestTree;
pub use wait::eventually;
pub use watch::ChannelWatch;
