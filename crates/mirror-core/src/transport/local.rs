use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mirror_fs::{RelativePath, checksum};
use tracing::debug;

use super::{FileMeta, Transport};
use crate::event::Timestamp;
use crate::{Error, Result};

/// Transport operating directly on a directory of the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn failure(&self, operation: &'static str, path: &RelativePath, source: io::Error) -> Error {
        Error::Transport {
            endpoint: self.describe(),
            operation,
            path: path.to_string(),
            source,
        }
    }
}

impl Transport for LocalTransport {
    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }

    fn verify_root(&mut self) -> Result<()> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(self.failure(
                "verify root",
                &RelativePath::root(),
                io::Error::new(io::ErrorKind::InvalidInput, "root is not a directory"),
            )),
            Err(e) => Err(self.failure("verify root", &RelativePath::root(), e)),
        }
    }

    fn metadata(&mut self, path: &RelativePath) -> Result<Option<FileMeta>> {
        match fs::metadata(path.resolve(&self.root)) {
            Ok(meta) => Ok(Some(FileMeta {
                len: meta.len(),
                modified: Timestamp::from_system_time(
                    meta.modified().map_err(|e| self.failure("stat", path, e))?,
                ),
                is_dir: meta.is_dir(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.failure("stat", path, e)),
        }
    }

    fn checksum(&mut self, path: &RelativePath) -> Result<Option<String>> {
        match checksum::compute_file_checksum(&path.resolve(&self.root)) {
            Ok(sum) => Ok(Some(sum)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.failure("checksum", path, e)),
        }
    }

    fn ensure_directory(&mut self, path: &RelativePath) -> Result<()> {
        for dir in path.ancestors() {
            if mirror_fs::io::ensure_dir(&dir.resolve(&self.root))? {
                debug!(dir = %dir, root = %self.root.display(), "Created directory");
            }
        }
        Ok(())
    }

    fn copy_in(&mut self, source: &Path, dest: &RelativePath, mtime: Timestamp) -> Result<u64> {
        let target = dest.resolve(&self.root);
        match mirror_fs::io::copy_with_mtime(source, &target, mtime.to_system_time()) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.is_not_found() && !source.exists() => Err(Error::SourceVanished {
                path: source.to_path_buf(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&mut self, path: &RelativePath) -> Result<bool> {
        Ok(mirror_fs::io::remove_if_present(&path.resolve(&self.root))?)
    }
}
