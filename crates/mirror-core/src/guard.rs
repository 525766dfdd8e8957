//! Loop Guard: decides whether a notification is a genuine divergence
//!
//! When two endpoints watch each other, every propagated write produces an
//! echo notification on the other side. The guard compares the source file
//! with its counterpart on the peer and suppresses the event when both
//! already agree. Any doubt (a failed read, a file vanishing mid-compare)
//! resolves to propagating: an extra copy is cheap, a missed update is not.

use std::fmt;
use std::fs;
use std::io;

use mirror_fs::checksum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;
use crate::event::{ChangeEvent, ChangeKind, Timestamp};
use crate::transport::Transport;

/// How two existing files are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    /// SHA-256 of the streamed content.
    #[default]
    Hash,
    /// Modification times at one-second resolution. Files with equal mtime
    /// but different content are treated as identical.
    Mtime,
}

/// Why the guard reached its decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionReason {
    Deletion,
    PeerAbsent,
    /// One of the two files disappeared while being compared.
    Vanished,
    ContentDiffers,
    ContentIdentical,
    MtimeDiffers,
    MtimeEqual,
    /// The source is a directory; directories are created on demand.
    Directory,
    ComparisonFailed(String),
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deletion => write!(f, "deletion"),
            Self::PeerAbsent => write!(f, "peer absent"),
            Self::Vanished => write!(f, "vanished during comparison"),
            Self::ContentDiffers => write!(f, "content differs"),
            Self::ContentIdentical => write!(f, "content identical"),
            Self::MtimeDiffers => write!(f, "mtime differs"),
            Self::MtimeEqual => write!(f, "mtime equal"),
            Self::Directory => write!(f, "directory"),
            Self::ComparisonFailed(message) => write!(f, "comparison failed: {}", message),
        }
    }
}

/// Outcome of [`LoopGuard::decide`]. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationDecision {
    pub propagate: bool,
    pub reason: DecisionReason,
}

impl PropagationDecision {
    pub fn propagate(reason: DecisionReason) -> Self {
        Self {
            propagate: true,
            reason,
        }
    }

    pub fn suppress(reason: DecisionReason) -> Self {
        Self {
            propagate: false,
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoopGuard {
    mode: ComparisonMode,
}

impl LoopGuard {
    pub fn new(mode: ComparisonMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ComparisonMode {
        self.mode
    }

    /// Decide whether `event` must be propagated to the tree behind `peer`.
    ///
    /// Only reads files; neither endpoint is modified.
    pub fn decide(&self, event: &ChangeEvent, peer: &mut dyn Transport) -> PropagationDecision {
        let decision = match event.kind() {
            ChangeKind::Deleted => PropagationDecision::propagate(DecisionReason::Deletion),
            ChangeKind::Created | ChangeKind::Modified => match self.compare(event, peer) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(event = %event, peer = %peer.describe(), error = %e, "Comparison failed, propagating");
                    PropagationDecision::propagate(DecisionReason::ComparisonFailed(e.to_string()))
                }
            },
        };
        debug!(
            event = %event,
            propagate = decision.propagate,
            reason = %decision.reason,
            "Loop guard decision"
        );
        decision
    }

    fn compare(&self, event: &ChangeEvent, peer: &mut dyn Transport) -> Result<PropagationDecision> {
        let source = event.source_path();
        let source_meta = match fs::metadata(source) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(PropagationDecision::propagate(DecisionReason::Vanished));
            }
            Err(e) => return Err(mirror_fs::Error::io(source, e).into()),
        };
        if source_meta.is_dir() {
            return Ok(PropagationDecision::suppress(DecisionReason::Directory));
        }

        let relative = event.relative_path();
        let Some(peer_meta) = peer.metadata(relative)? else {
            return Ok(PropagationDecision::propagate(DecisionReason::PeerAbsent));
        };
        if peer_meta.is_dir {
            return Ok(PropagationDecision::propagate(DecisionReason::ContentDiffers));
        }

        match self.mode {
            ComparisonMode::Mtime => {
                let modified = source_meta
                    .modified()
                    .map_err(|e| mirror_fs::Error::io(source, e))?;
                if Timestamp::from_system_time(modified).same_second(peer_meta.modified) {
                    Ok(PropagationDecision::suppress(DecisionReason::MtimeEqual))
                } else {
                    Ok(PropagationDecision::propagate(DecisionReason::MtimeDiffers))
                }
            }
            ComparisonMode::Hash => {
                if source_meta.len() != peer_meta.len {
                    return Ok(PropagationDecision::propagate(DecisionReason::ContentDiffers));
                }
                let source_sum = match checksum::compute_file_checksum(source) {
                    Ok(sum) => sum,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        return Ok(PropagationDecision::propagate(DecisionReason::Vanished));
                    }
                    Err(e) => return Err(mirror_fs::Error::io(source, e).into()),
                };
                let Some(peer_sum) = peer.checksum(relative)? else {
                    return Ok(PropagationDecision::propagate(DecisionReason::Vanished));
                };
                if source_sum == peer_sum {
                    Ok(PropagationDecision::suppress(DecisionReason::ContentIdentical))
                } else {
                    Ok(PropagationDecision::propagate(DecisionReason::ContentDiffers))
                }
            }
        }
    }
}
