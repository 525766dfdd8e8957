//! Idempotent local I/O primitives
//!
//! Copies are atomic: content lands in a temp file next to the destination,
//! receives its final modification time, and is then renamed into place. A
//! reader of the destination therefore never sees partial content or a
//! freshly written file that still carries the wrong mtime.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use filetime::FileTime;
use fs2::FileExt;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Name prefix of in-flight copy artifacts.
pub const TEMP_PREFIX: &str = ".~mirror-";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Whether a file name belongs to an in-flight copy.
///
/// Watchers use this to avoid reporting the temp files of our own writes.
pub fn is_temp_artifact(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}

fn temp_path_for(dest: &Path) -> PathBuf {
    let temp_name = format!(
        "{}{}.{}.{}.tmp",
        TEMP_PREFIX,
        dest.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    dest.with_file_name(temp_name)
}

/// Copy `source` to `dest` and stamp `dest` with `mtime`.
///
/// The destination's parent directory must already exist. Returns the number
/// of bytes copied.
///
/// # Errors
///
/// A missing `source` is reported as an [`Error::Io`] whose kind is
/// [`io::ErrorKind::NotFound`] and whose path is the source path.
pub fn copy_with_mtime(source: &Path, dest: &Path, mtime: SystemTime) -> Result<u64> {
    let mut reader = File::open(source).map_err(|e| Error::io(source, e))?;
    let bytes = replace_atomically(dest, &mut reader, Some(mtime))?;
    debug!(from = %source.display(), to = %dest.display(), bytes, "Copied file");
    Ok(bytes)
}

/// Replace `dest` with `content`, creating missing parent directories.
pub fn write_atomic(dest: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    replace_atomically(dest, &mut &content[..], None).map(|_| ())
}

fn replace_atomically(dest: &Path, reader: &mut dyn Read, mtime: Option<SystemTime>) -> Result<u64> {
    let temp_path = temp_path_for(dest);

    let result = write_temp(reader, &temp_path, mtime).and_then(|bytes| {
        fs::rename(&temp_path, dest)
            .map(|()| bytes)
            .map_err(|e| Error::io(dest, e))
    });

    if result.is_err()
        && let Err(e) = fs::remove_file(&temp_path)
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %temp_path.display(), error = %e, "Could not remove temp file");
    }
    result
}

fn write_temp(reader: &mut dyn Read, temp_path: &Path, mtime: Option<SystemTime>) -> Result<u64> {
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)
        .map_err(|e| Error::io(temp_path, e))?;

    temp_file.lock_exclusive().map_err(|_| Error::LockFailed {
        path: temp_path.to_path_buf(),
    })?;

    let bytes = io::copy(reader, &mut temp_file).map_err(|e| Error::io(temp_path, e))?;
    temp_file.flush().map_err(|e| Error::io(temp_path, e))?;
    temp_file.sync_all().map_err(|e| Error::io(temp_path, e))?;

    temp_file.unlock().map_err(|_| Error::LockFailed {
        path: temp_path.to_path_buf(),
    })?;
    drop(temp_file);

    if let Some(mtime) = mtime {
        set_mtime(temp_path, mtime)?;
    }
    Ok(bytes)
}

/// Set a file's modification time.
pub fn set_mtime(path: &Path, mtime: SystemTime) -> Result<()> {
    filetime::set_file_mtime(path, FileTime::from_system_time(mtime))
        .map_err(|e| Error::io(path, e))
}

/// Read a file's modification time.
pub fn modified_time(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|e| Error::io(path, e))
}

/// Remove a file. Returns `false` when it was already absent.
pub fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Create a single directory unless it is already present.
///
/// Returns `true` when the directory was created by this call.
pub fn ensure_dir(path: &Path) -> Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    match fs::create_dir(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}
