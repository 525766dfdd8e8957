//! Change-reconciliation engine for dirmirror
//!
//! Keeps directory trees convergent by reacting to file notifications:
//!
//! - **Mirrors**: two local trees kept identical in both directions
//! - **Fan-out**: one local tree replicated one-way to several destinations,
//!   local or remote over SFTP
//!
//! # Architecture
//!
//! ```text
//!   WatchService ──► ChangeEvent ──► LoopGuard ──► SyncQueue ──► ReconciliationWorker
//!   (per root)                       (per route)   (per destination)      │
//!                                                                      Transport
//!                                                                   Local | Remote
//! ```
//!
//! The [`LoopGuard`] is what lets a mirror pair watch itself without
//! ping-ponging: a notification caused by a propagated write finds the two
//! files already identical and is dropped.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mirror_core::{NotifyWatchService, SyncConfig};
//!
//! async fn run(path: &std::path::Path) -> mirror_core::Result<()> {
//!     let config = SyncConfig::load(path)?;
//!     let running = config.to_coordinator()?.start(Arc::new(NotifyWatchService)).await?;
//!     tokio::signal::ctrl_c().await?;
//!     running.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod guard;
pub mod queue;
pub mod transport;
pub mod watch;
pub mod worker;

pub use config::{FanOut, MirrorPair, SyncConfig};
pub use coordinator::{Route, RunningSync, SyncCoordinator, SyncOptions, SyncSummary};
pub use endpoint::{
    DefaultTransportFactory, Endpoint, EndpointId, RemoteAuth, RemoteConfig, TransportConfig,
    TransportFactory, TransportKind,
};
pub use error::{Error, Result};
pub use event::{ChangeEvent, ChangeKind, Timestamp};
pub use guard::{ComparisonMode, DecisionReason, LoopGuard, PropagationDecision};
pub use queue::SyncQueue;
pub use transport::{FileMeta, LocalTransport, RemoteTransport, Transport};
pub use watch::{NotifyWatchService, RawChange, WatchService, WatchStream};
pub use worker::{ActionOutcome, ReconciliationWorker, WorkerReport, apply_action};
