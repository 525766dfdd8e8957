//! [`ChannelWatch`]: a [`WatchService`] the test drives by hand.
//!
//! Real OS notifications arrive with platform-dependent delay and
//! coalescing. Scenario tests instead emit exactly the changes they want the
//! engine to see, including the echo notifications a real watcher would
//! report after a propagated write.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use mirror_core::{ChangeKind, RawChange, Result, Timestamp, WatchService, WatchStream};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default)]
pub struct ChannelWatch {
    senders: Arc<Mutex<HashMap<PathBuf, mpsc::UnboundedSender<RawChange>>>>,
}

fn canonical(root: &Path) -> PathBuf {
    mirror_fs::canonical_root(root).unwrap_or_else(|_| root.to_path_buf())
}

impl ChannelWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roots currently being watched.
    pub fn roots(&self) -> Vec<PathBuf> {
        let senders = self.senders.lock().unwrap();
        let mut roots: Vec<_> = senders
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(root, _)| root.clone())
            .collect();
        roots.sort();
        roots
    }

    pub fn is_watching(&self, root: &Path) -> bool {
        self.roots().contains(&canonical(root))
    }

    /// Deliver `change` to the watch on `root`. Returns `false` when nothing
    /// is watching it.
    pub fn emit(&self, root: &Path, change: RawChange) -> bool {
        let senders = self.senders.lock().unwrap();
        match senders.get(&canonical(root)) {
            Some(tx) => tx.send(change).is_ok(),
            None => false,
        }
    }

    /// Emit a change for `relative` under `root`, stamped the way the real
    /// watcher stamps it: the file's mtime for creations and modifications,
    /// the current time for deletions.
    pub fn emit_file(&self, root: &Path, relative: &str, kind: ChangeKind) -> bool {
        let path = canonical(root).join(relative);
        let timestamp = match kind {
            ChangeKind::Deleted => Timestamp::now(),
            ChangeKind::Created | ChangeKind::Modified => fs::metadata(&path)
                .and_then(|m| m.modified())
                .map(Timestamp::from_system_time)
                .unwrap_or_else(|_| Timestamp::now()),
        };
        self.emit(
            root,
            RawChange {
                kind,
                path,
                timestamp,
            },
        )
    }
}

impl WatchService for ChannelWatch {
    fn watch(&self, root: &Path, _recursive: bool) -> Result<WatchStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().insert(canonical(root), tx);
        Ok(WatchStream::new(rx, ()))
    }
}
