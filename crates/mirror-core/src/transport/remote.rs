use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use mirror_fs::{NormalizedPath, RelativePath, checksum};
use tracing::{debug, info, warn};

use super::{FileMeta, Transport};
use crate::event::Timestamp;
use crate::{Error, Result};

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
    pub len: u64,
    pub modified: Timestamp,
}

/// An authenticated file-transfer session.
///
/// Paths are absolute remote paths with forward slashes. A missing file or
/// directory is reported as [`io::ErrorKind::NotFound`].
pub trait RemoteSession: Send {
    fn list(&mut self, dir: &str) -> io::Result<Vec<RemoteEntry>>;
    fn get(&mut self, path: &str) -> io::Result<Box<dyn Read + '_>>;
    fn put(&mut self, path: &str, content: &mut dyn Read, mtime: Timestamp) -> io::Result<u64>;
    fn remove(&mut self, path: &str) -> io::Result<()>;
    fn mkdir(&mut self, path: &str) -> io::Result<()>;
}

/// Opens sessions to one remote host.
pub trait Connector: Send + Sync {
    /// Address used in logs and errors.
    fn address(&self) -> String;
    fn connect(&self) -> Result<Box<dyn RemoteSession>>;
}

/// Transport over a remote file-transfer session.
///
/// The session is opened on first use and kept for later actions. Any
/// failure other than a missing file drops it, so the next action
/// reconnects instead of reusing a broken session.
pub struct RemoteTransport {
    root: NormalizedPath,
    connector: Box<dyn Connector>,
    session: Option<Box<dyn RemoteSession>>,
}

impl RemoteTransport {
    pub fn new(root: impl AsRef<Path>, connector: impl Connector + 'static) -> Self {
        Self {
            root: NormalizedPath::new(root),
            connector: Box::new(connector),
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn remote_path(&self, path: &RelativePath) -> NormalizedPath {
        self.root.join_relative(path)
    }

    fn with_session<T>(
        &mut self,
        operation: &'static str,
        path: &NormalizedPath,
        f: impl FnOnce(&mut dyn RemoteSession) -> io::Result<T>,
    ) -> Result<T> {
        let mut session = match self.session.take() {
            Some(session) => session,
            None => {
                info!(remote = %self.connector.address(), "Opening remote session");
                self.connector.connect()?
            }
        };

        match f(session.as_mut()) {
            Ok(value) => {
                self.session = Some(session);
                Ok(value)
            }
            Err(e) => {
                if keeps_session(&e) {
                    self.session = Some(session);
                } else {
                    warn!(
                        remote = %self.connector.address(),
                        operation,
                        error = %e,
                        "Dropping remote session; it will be reopened on next use"
                    );
                }
                Err(Error::Transport {
                    endpoint: self.describe(),
                    operation,
                    path: path.to_string(),
                    source: e,
                })
            }
        }
    }

    /// Stat `path` by listing its parent directory.
    fn lookup(&mut self, path: &NormalizedPath) -> Result<Option<RemoteEntry>> {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            // The filesystem root always exists.
            return Ok(Some(RemoteEntry {
                name: path.to_string(),
                is_dir: true,
                len: 0,
                modified: Timestamp::from_secs(0.0),
            }));
        };
        let name = name.to_string();
        self.with_session("list", &parent, |session| {
            match session.list(parent.as_str()) {
                Ok(entries) => Ok(entries.into_iter().find(|entry| entry.name == name)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        })
    }
}

fn keeps_session(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::AlreadyExists
    )
}

impl Transport for RemoteTransport {
    fn describe(&self) -> String {
        format!("remote:{}{}", self.connector.address(), self.root)
    }

    fn verify_root(&mut self) -> Result<()> {
        let root = self.root.clone();
        match self.lookup(&root)? {
            Some(entry) if entry.is_dir => Ok(()),
            Some(_) => Err(Error::Transport {
                endpoint: self.describe(),
                operation: "verify root",
                path: root.to_string(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "root is not a directory"),
            }),
            None => Err(Error::Transport {
                endpoint: self.describe(),
                operation: "verify root",
                path: root.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "root does not exist"),
            }),
        }
    }

    fn metadata(&mut self, path: &RelativePath) -> Result<Option<FileMeta>> {
        let remote = self.remote_path(path);
        Ok(self.lookup(&remote)?.map(|entry| FileMeta {
            len: entry.len,
            modified: entry.modified,
            is_dir: entry.is_dir,
        }))
    }

    fn checksum(&mut self, path: &RelativePath) -> Result<Option<String>> {
        let remote = self.remote_path(path);
        self.with_session("read", &remote, |session| match session.get(remote.as_str()) {
            Ok(reader) => checksum::compute_reader_checksum(reader).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        })
    }

    fn ensure_directory(&mut self, path: &RelativePath) -> Result<()> {
        for dir in path.ancestors() {
            let remote = self.remote_path(&dir);
            match self.lookup(&remote)? {
                Some(entry) if entry.is_dir => continue,
                Some(_) => {
                    return Err(Error::Transport {
                        endpoint: self.describe(),
                        operation: "mkdir",
                        path: remote.to_string(),
                        source: io::Error::new(
                            io::ErrorKind::AlreadyExists,
                            "a file is in the way of the directory",
                        ),
                    });
                }
                None => {
                    self.with_session("mkdir", &remote, |session| session.mkdir(remote.as_str()))?;
                    debug!(dir = %remote, "Created remote directory");
                }
            }
        }
        Ok(())
    }

    fn copy_in(&mut self, source: &Path, dest: &RelativePath, mtime: Timestamp) -> Result<u64> {
        let mut file = match File::open(source) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::SourceVanished {
                    path: source.to_path_buf(),
                });
            }
            Err(e) => return Err(mirror_fs::Error::io(source, e).into()),
        };
        let remote = self.remote_path(dest);
        self.with_session("put", &remote, |session| {
            session.put(remote.as_str(), &mut file, mtime)
        })
    }

    fn delete(&mut self, path: &RelativePath) -> Result<bool> {
        let remote = self.remote_path(path);
        if self.lookup(&remote)?.is_none() {
            return Ok(false);
        }
        self.with_session("remove", &remote, |session| {
            match session.remove(remote.as_str()) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e),
            }
        })
    }
}
