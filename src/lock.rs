//! File locking and atomic document writes
//!
//! - Advisory locking (fs2/flock) on a sidecar `<document>.lock` file
//! - Atomic write pattern (write temp + rename)
//! - Lock timeout with configurable wait
//!
//! Editors and other sync processes may touch the document at any time, so
//! a write either lands completely or not at all.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Default retry interval when waiting for a lock
const LOCK_RETRY_INTERVAL_MS: u64 = 50;

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // On Windows, fs2/libc can surface lock/sharing violations as "Other".
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// Sidecar lock path for a document.
pub fn lock_path_for(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.lock", path.display()))
}

/// A file lock guard that releases the lock when dropped
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Acquire an exclusive lock on a file with timeout
    ///
    /// The lock file is created if missing.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let retry_interval = Duration::from_millis(LOCK_RETRY_INTERVAL_MS);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(FileLock { file }),
                Err(e) if is_lock_contended(&e) => {
                    if start.elapsed() >= timeout {
                        return Err(Error::LockFailed(path.to_path_buf()));
                    }
                    std::thread::sleep(retry_interval);
                }
                Err(e) => {
                    return Err(Error::Io(e));
                }
            }
        }
    }

}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Atomically write data to a file
///
/// Writes a temporary file in the same directory and renames it over the
/// target. Does not take the sidecar lock; see [`write_atomic_locked`].
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    // same directory, so the rename stays on one filesystem
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
    temp_file.write_all(data)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|err| Error::Io(err.error))?;

    Ok(())
}

/// Write data atomically while holding `<path>.lock`
pub fn write_atomic_locked(path: impl AsRef<Path>, data: &[u8], timeout_ms: u64) -> Result<()> {
    let path = path.as_ref();
    let _lock = FileLock::acquire(lock_path_for(path), timeout_ms)?;
    write_atomic(path, data)
}

/// Read a document as UTF-8 while holding `<path>.lock`
///
/// Returns `Ok(None)` when the document does not exist.
pub fn read_locked_str(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Option<String>> {
    let path = path.as_ref();
    let _lock = FileLock::acquire(lock_path_for(path), timeout_ms)?;

    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::Io(err)),
    };
    String::from_utf8(data)
        .map(Some)
        .map_err(|e| Error::Document(format!("{} is not valid UTF-8: {e}", path.display())))
}
