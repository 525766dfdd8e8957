//! Change notifications flowing through the engine

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mirror_fs::RelativePath;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::endpoint::EndpointId;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

/// Seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self(after.as_secs_f64()),
            Err(before) => Self(-before.duration().as_secs_f64()),
        }
    }

    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// Values the platform clock cannot represent map to the epoch.
    pub fn to_system_time(self) -> SystemTime {
        let shifted = Duration::try_from_secs_f64(self.0.abs())
            .ok()
            .and_then(|magnitude| {
                if self.0 >= 0.0 {
                    UNIX_EPOCH.checked_add(magnitude)
                } else {
                    UNIX_EPOCH.checked_sub(magnitude)
                }
            });
        shifted.unwrap_or(UNIX_EPOCH)
    }

    pub fn whole_seconds(self) -> i64 {
        self.0.floor() as i64
    }

    /// Equality at one-second resolution, the coarsest resolution any
    /// supported transport stores.
    pub fn same_second(self, other: Timestamp) -> bool {
        self.whole_seconds() == other.whole_seconds()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// A normalized change notification for one file under a watched root.
///
/// Immutable once created. The file's location is carried both as the
/// absolute source path (for reading) and as a path relative to the origin
/// root (for translation onto other endpoints).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    kind: ChangeKind,
    source_path: PathBuf,
    relative: RelativePath,
    timestamp: Timestamp,
    origin: EndpointId,
}

impl ChangeEvent {
    /// Build an event for `path`, which must live under `root`.
    pub fn new(
        kind: ChangeKind,
        origin: EndpointId,
        root: &Path,
        path: impl Into<PathBuf>,
        timestamp: Timestamp,
    ) -> Result<Self> {
        let source_path = path.into();
        let relative = RelativePath::from_root(root, &source_path)?;
        Ok(Self {
            kind,
            source_path,
            relative,
            timestamp,
            origin,
        })
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn relative_path(&self) -> &RelativePath {
        &self.relative
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn origin(&self) -> &EndpointId {
        &self.origin
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} @{}",
            self.kind, self.origin, self.relative, self.timestamp
        )
    }
}
