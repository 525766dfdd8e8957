//! Watch collaborator interface
//!
//! The engine consumes a stream of normalized [`RawChange`]s per watched
//! root. [`NotifyWatchService`] produces that stream from the OS
//! notification facilities through the `notify` crate; tests substitute
//! their own [`WatchService`].

use std::fs;
use std::path::{Path, PathBuf};

use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::Result;
use crate::event::{ChangeKind, Timestamp};

/// A file change as reported by the watch collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChange {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub timestamp: Timestamp,
}

/// Stream of changes for one watched root.
///
/// Dropping the stream stops the underlying watch.
pub struct WatchStream {
    events: mpsc::UnboundedReceiver<RawChange>,
    _guard: Box<dyn Send>,
}

impl WatchStream {
    /// `guard` is kept alive for as long as the stream is.
    pub fn new(events: mpsc::UnboundedReceiver<RawChange>, guard: impl Send + 'static) -> Self {
        Self {
            events,
            _guard: Box::new(guard),
        }
    }

    /// Next change, or `None` once the watch has ended.
    pub async fn next(&mut self) -> Option<RawChange> {
        self.events.recv().await
    }
}

/// Starts watches on local directory trees.
pub trait WatchService: Send + Sync {
    fn watch(&self, root: &Path, recursive: bool) -> Result<WatchStream>;
}

/// [`WatchService`] backed by the platform's recommended `notify` watcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyWatchService;

impl WatchService for NotifyWatchService {
    fn watch(&self, root: &Path, recursive: bool) -> Result<WatchStream> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in translate_event(event) {
                    if tx.send(change).is_err() {
                        break;
                    }
                }
            }
            Err(e) => warn!(error = %e, "File watcher error"),
        })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(root, mode)?;
        debug!(root = %root.display(), recursive, "Watching");

        Ok(WatchStream::new(rx, watcher))
    }
}

/// Normalize one `notify` event into zero or more file changes.
///
/// Directory events and in-flight copy artifacts are dropped. Renames become
/// a deletion of the old name and a creation of the new one.
pub fn translate_event(event: Event) -> Vec<RawChange> {
    let paths = event.paths;
    match event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Create(_) => paths
            .into_iter()
            .filter_map(|p| observed(ChangeKind::Created, p))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().filter_map(deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => paths
            .into_iter()
            .filter_map(|p| observed(ChangeKind::Created, p))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            let mut paths = paths.into_iter();
            let from = paths.next().and_then(deleted);
            let to = paths.next().and_then(|p| observed(ChangeKind::Created, p));
            from.into_iter().chain(to).collect()
        }
        // Rename without a known direction: judge by what is on disk now.
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .filter_map(|p| {
                if p.exists() {
                    observed(ChangeKind::Created, p)
                } else {
                    deleted(p)
                }
            })
            .collect(),
        EventKind::Modify(_) => paths
            .into_iter()
            .filter_map(|p| observed(ChangeKind::Modified, p))
            .collect(),
        EventKind::Remove(_) => paths.into_iter().filter_map(deleted).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn is_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(mirror_fs::io::is_temp_artifact)
}

/// A created or modified file, stamped with its current mtime.
fn observed(kind: ChangeKind, path: PathBuf) -> Option<RawChange> {
    if is_artifact(&path) {
        return None;
    }
    let meta = match fs::metadata(&path) {
        Ok(meta) => meta,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "File vanished before it could be stamped");
            return None;
        }
    };
    if meta.is_dir() {
        return None;
    }
    let timestamp = meta
        .modified()
        .map(Timestamp::from_system_time)
        .unwrap_or_else(|_| Timestamp::now());
    Some(RawChange {
        kind,
        path,
        timestamp,
    })
}

fn deleted(path: PathBuf) -> Option<RawChange> {
    if is_artifact(&path) {
        return None;
    }
    Some(RawChange {
        kind: ChangeKind::Deleted,
        path,
        timestamp: Timestamp::now(),
    })
}
