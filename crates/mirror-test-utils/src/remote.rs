//! In-memory remote host for exercising [`RemoteTransport`] without a
//! network.
//!
//! Like a real SFTP server it stores modification times in whole seconds
//! and reports missing paths as `NotFound`. Taking the host offline makes
//! connects fail and breaks every live session.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Cursor, Read};
use std::sync::{Arc, Mutex, MutexGuard};

use mirror_core::transport::{Connector, RemoteEntry, RemoteSession};
use mirror_core::{
    Endpoint, EndpointId, Error, LocalTransport, RemoteTransport, Result, Timestamp,
    Transport, TransportConfig, TransportFactory,
};

/// A stored remote file.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryFile {
    pub content: Vec<u8>,
    pub mtime: Timestamp,
}

#[derive(Debug)]
struct State {
    files: BTreeMap<String, MemoryFile>,
    dirs: BTreeSet<String>,
    offline: bool,
    connects: usize,
    rejected: usize,
}

/// Shared handle to an in-memory remote filesystem. Clones see the same
/// files.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    state: Arc<Mutex<State>>,
    address: String,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new("memory.test")
    }
}

fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("/", path),
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path))
}

impl MemoryRemote {
    /// An empty host with only `/`.
    pub fn new(host: &str) -> Self {
        let mut dirs = BTreeSet::new();
        dirs.insert("/".to_string());
        Self {
            state: Arc::new(Mutex::new(State {
                files: BTreeMap::new(),
                dirs,
                offline: false,
                connects: 0,
                rejected: 0,
            })),
            address: format!("{}:22", host),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Create `path` and all of its parents.
    pub fn mkdir_all(&self, path: &str) {
        let mut state = self.lock();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            state.dirs.insert(current.clone());
        }
    }

    pub fn put_file(&self, path: &str, content: &str, mtime_secs: u64) {
        let (parent, _) = split(path);
        self.mkdir_all(parent);
        self.lock().files.insert(
            path.to_string(),
            MemoryFile {
                content: content.as_bytes().to_vec(),
                mtime: Timestamp::from_secs(mtime_secs as f64),
            },
        );
    }

    pub fn file(&self, path: &str) -> Option<MemoryFile> {
        self.lock().files.get(path).cloned()
    }

    pub fn read(&self, path: &str) -> Option<String> {
        self.file(path)
            .map(|f| String::from_utf8_lossy(&f.content).into_owned())
    }

    pub fn exists(&self, path: &str) -> bool {
        let state = self.lock();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.lock().dirs.contains(path)
    }

    /// While offline, connects fail and open sessions error on every call.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Number of sessions opened so far.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// Session calls refused because the host was offline.
    pub fn rejected(&self) -> usize {
        self.lock().rejected
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            remote: self.clone(),
        }
    }

    /// A [`RemoteTransport`] rooted at `root` on this host.
    pub fn transport(&self, root: &str) -> RemoteTransport {
        RemoteTransport::new(root, self.connector())
    }
}

/// [`Connector`] for a [`MemoryRemote`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    remote: MemoryRemote,
}

impl Connector for MemoryConnector {
    fn address(&self) -> String {
        self.remote.address.clone()
    }

    fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        let mut state = self.remote.lock();
        if state.offline {
            return Err(Error::Connect {
                host: self.remote.address.clone(),
                message: "host unreachable".to_string(),
            });
        }
        state.connects += 1;
        Ok(Box::new(MemorySession {
            remote: self.remote.clone(),
        }))
    }
}

struct MemorySession {
    remote: MemoryRemote,
}

impl MemorySession {
    fn online(&self) -> io::Result<MutexGuard<'_, State>> {
        let mut state = self.remote.lock();
        if state.offline {
            state.rejected += 1;
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection lost",
            ));
        }
        Ok(state)
    }
}

impl RemoteSession for MemorySession {
    fn list(&mut self, dir: &str) -> io::Result<Vec<RemoteEntry>> {
        let state = self.online()?;
        if !state.dirs.contains(dir) {
            return Err(not_found(dir));
        }
        let dirs = state
            .dirs
            .iter()
            .filter(|d| d.as_str() != "/" && split(d).0 == dir)
            .map(|d| RemoteEntry {
                name: split(d).1.to_string(),
                is_dir: true,
                len: 0,
                modified: Timestamp::from_secs(0.0),
            });
        let files = state
            .files
            .iter()
            .filter(|(path, _)| split(path).0 == dir)
            .map(|(path, file)| RemoteEntry {
                name: split(path).1.to_string(),
                is_dir: false,
                len: file.content.len() as u64,
                modified: file.mtime,
            });
        Ok(dirs.chain(files).collect())
    }

    fn get(&mut self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let state = self.online()?;
        let file = state.files.get(path).ok_or_else(|| not_found(path))?;
        Ok(Box::new(Cursor::new(file.content.clone())))
    }

    fn put(&mut self, path: &str, content: &mut dyn Read, mtime: Timestamp) -> io::Result<u64> {
        let mut buffer = Vec::new();
        content.read_to_end(&mut buffer)?;

        let mut state = self.online()?;
        if !state.dirs.contains(split(path).0) {
            return Err(not_found(path));
        }
        let len = buffer.len() as u64;
        state.files.insert(
            path.to_string(),
            MemoryFile {
                content: buffer,
                mtime: Timestamp::from_secs(mtime.whole_seconds() as f64),
            },
        );
        Ok(len)
    }

    fn remove(&mut self, path: &str) -> io::Result<()> {
        let mut state = self.online()?;
        state.files.remove(path).map(|_| ()).ok_or_else(|| not_found(path))
    }

    fn mkdir(&mut self, path: &str) -> io::Result<()> {
        let mut state = self.online()?;
        if !state.dirs.contains(split(path).0) {
            return Err(not_found(path));
        }
        if state.dirs.contains(path) || state.files.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, path.to_string()));
        }
        state.dirs.insert(path.to_string());
        Ok(())
    }
}

/// [`TransportFactory`] that serves remote endpoints from [`MemoryRemote`]s
/// and local endpoints from disk.
#[derive(Debug, Default, Clone)]
pub struct MemoryTransportFactory {
    remotes: HashMap<EndpointId, MemoryRemote>,
}

impl MemoryTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote(mut self, id: impl Into<EndpointId>, remote: MemoryRemote) -> Self {
        self.remotes.insert(id.into(), remote);
        self
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>> {
        match &endpoint.transport {
            TransportConfig::Local => Ok(Box::new(LocalTransport::new(&endpoint.root))),
            TransportConfig::Remote(_) => {
                let remote = self.remotes.get(&endpoint.id).ok_or_else(|| {
                    Error::config(format!("no in-memory remote for '{}'", endpoint.id))
                })?;
                Ok(Box::new(RemoteTransport::new(&endpoint.root, remote.connector())))
            }
        }
    }
}
