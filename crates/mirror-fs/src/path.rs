//! Path values used by the mirror engine
//!
//! [`RelativePath`] is the structured, root-independent location of a file
//! inside a mirrored tree. Paths on one endpoint are translated to another by
//! computing the relative path against the known source root and resolving it
//! under the destination root, never by string substitution.
//!
//! [`NormalizedPath`] is a forward-slash path string, used for remote roots
//! where the native path type of the local machine does not apply.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::{Error, Result};

/// A path normalized to use forward slashes internally.
///
/// Empty and `.` segments are dropped, so `a//./b` becomes `a/b`. A leading
/// `/` is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPath {
    /// Internal representation always uses forward slashes
    inner: String,
}

impl NormalizedPath {
    /// Create a new NormalizedPath from any path-like input.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path_str = path.as_ref().to_string_lossy().replace('\\', "/");
        Self {
            inner: clean(&path_str),
        }
    }

    /// Get the internal normalized string representation.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Convert to a platform-native PathBuf for I/O operations.
    pub fn to_native(&self) -> PathBuf {
        PathBuf::from(&self.inner)
    }

    /// Join this path with a segment.
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.replace('\\', "/");
        if segment.is_empty() {
            return self.clone();
        }
        let joined = if self.inner.is_empty() {
            segment
        } else {
            format!("{}/{}", self.inner, segment)
        };
        Self {
            inner: clean(&joined),
        }
    }

    /// Resolve a root-relative path under this path.
    pub fn join_relative(&self, relative: &RelativePath) -> Self {
        self.join(&relative.as_posix())
    }

    /// Get the parent directory.
    pub fn parent(&self) -> Option<Self> {
        match self.inner.rfind('/') {
            Some(0) if self.inner.len() > 1 => Some(Self {
                inner: "/".to_string(),
            }),
            Some(0) => None,
            Some(idx) => Some(Self {
                inner: self.inner[..idx].to_string(),
            }),
            None if self.inner.is_empty() => None,
            None => Some(Self {
                inner: String::new(),
            }),
        }
    }

    /// Get the file name component.
    pub fn file_name(&self) -> Option<&str> {
        self.inner.rsplit('/').next().filter(|name| !name.is_empty())
    }

    /// Get the extension if present.
    pub fn extension(&self) -> Option<&str> {
        self.file_name().and_then(|name| {
            let idx = name.rfind('.')?;
            if idx == 0 {
                None
            } else {
                Some(&name[idx + 1..])
            }
        })
    }
}

fn clean(path: &str) -> String {
    let absolute = path.starts_with('/');
    let body = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");
    if absolute {
        format!("/{body}")
    } else {
        body
    }
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.inner)
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<&str> for NormalizedPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NormalizedPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<PathBuf> for NormalizedPath {
    fn from(p: PathBuf) -> Self {
        Self::new(p)
    }
}

impl From<&Path> for NormalizedPath {
    fn from(p: &Path) -> Self {
        Self::new(p)
    }
}

/// Location of a file relative to the root of a mirrored tree.
///
/// Holds plain name segments only: no root, no `.` and no `..`. The empty
/// path denotes the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePath {
    segments: Vec<String>,
}

impl RelativePath {
    /// The root of a tree.
    pub fn root() -> Self {
        Self::default()
    }

    /// Compute the location of `path` relative to `root`.
    ///
    /// Matching is done per path component, so `/data/a2/x` is not inside
    /// `/data/a`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutsideRoot`] when `path` does not live under `root`,
    /// and [`Error::InvalidRelativePath`] when the remainder contains `..` or
    /// non UTF-8 segments.
    pub fn from_root(root: &Path, path: &Path) -> Result<Self> {
        let rest = path.strip_prefix(root).map_err(|_| Error::OutsideRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })?;

        let mut segments = Vec::new();
        for component in rest.components() {
            match component {
                Component::Normal(name) => {
                    let name = name.to_str().ok_or_else(|| Error::InvalidRelativePath {
                        path: rest.to_string_lossy().into_owned(),
                    })?;
                    segments.push(name.to_string());
                }
                Component::CurDir => {}
                _ => {
                    return Err(Error::InvalidRelativePath {
                        path: rest.to_string_lossy().into_owned(),
                    });
                }
            }
        }
        Ok(Self { segments })
    }

    /// Parse a forward-slash relative path such as `docs/a.txt`.
    pub fn parse(s: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for segment in s.replace('\\', "/").split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    return Err(Error::InvalidRelativePath { path: s.to_string() });
                }
                name => segments.push(name.to_string()),
            }
        }
        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The containing directory, `None` for the root itself.
    pub fn parent(&self) -> Option<Self> {
        let (_, leading) = self.segments.split_last()?;
        Some(Self {
            segments: leading.to_vec(),
        })
    }

    /// Every non-root leading sub-path, shortest first, ending with `self`.
    pub fn ancestors(&self) -> impl Iterator<Item = RelativePath> + '_ {
        (1..=self.segments.len()).map(|len| Self {
            segments: self.segments[..len].to_vec(),
        })
    }

    /// Resolve under a native root directory.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.segments);
        path
    }

    pub fn as_posix(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.as_posix())
        }
    }
}

/// Canonicalize a tree root, resolving symlinks.
///
/// Uses the non-UNC form on Windows so that paths reported by the watcher
/// share a prefix with the root.
pub fn canonical_root(path: &Path) -> Result<PathBuf> {
    dunce::canonicalize(path).map_err(|e| Error::io(path, e))
}
