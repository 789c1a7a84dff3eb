//! Document storage capability.
//!
//! The watcher reads, writes and watches the checklist document through a
//! [`DocumentStore`]. [`FsDocument`] is the on-disk document guarded by a
//! sidecar lock; [`MemoryDocument`] keeps the text in memory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};

/// Keeps a change subscription alive. Dropping it stops notifications.
pub struct WatchHandle {
    _watcher: Option<RecommendedWatcher>,
}

impl WatchHandle {
    fn detached() -> Self {
        Self { _watcher: None }
    }
}

/// Read/write/watch access to the checklist document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current text, `None` when the document does not exist.
    async fn read(&self) -> Result<Option<String>>;

    /// Replace the whole document.
    async fn write(&self, content: &str) -> Result<()>;

    /// Send `()` on `changes` whenever the document changes externally.
    fn watch(&self, changes: UnboundedSender<()>) -> Result<WatchHandle>;

    /// Human readable location for logs.
    fn describe(&self) -> String;
}

/// Checklist document on disk.
#[derive(Debug, Clone)]
pub struct FsDocument {
    path: PathBuf,
    lock_timeout_ms: u64,
}

impl FsDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    fn watch_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

fn join_error(err: tokio::task::JoinError) -> Error {
    Error::Document(format!("document task failed: {err}"))
}

#[async_trait]
impl DocumentStore for FsDocument {
    async fn read(&self) -> Result<Option<String>> {
        let path = self.path.clone();
        let timeout = self.lock_timeout_ms;
        tokio::task::spawn_blocking(move || lock::read_locked_str(&path, timeout))
            .await
            .map_err(join_error)?
    }

    async fn write(&self, content: &str) -> Result<()> {
        let path = self.path.clone();
        let timeout = self.lock_timeout_ms;
        let data = content.as_bytes().to_vec();
        tokio::task::spawn_blocking(move || lock::write_atomic_locked(&path, &data, timeout))
            .await
            .map_err(join_error)??;
        debug!(path = %self.path.display(), bytes = content.len(), "document written");
        Ok(())
    }

    fn watch(&self, changes: UnboundedSender<()>) -> Result<WatchHandle> {
        let file_name = self.path.file_name().map(|name| name.to_os_string());
        // editors replace files by rename, so watch the directory
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if event.kind.is_access() {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if ours {
                        let _ = changes.send(());
                    }
                }
                Err(err) => warn!(error = %err, "document watch error"),
            }
        })?;
        watcher.watch(&self.watch_dir(), RecursiveMode::NonRecursive)?;
        debug!(path = %self.path.display(), "watching document");
        Ok(WatchHandle {
            _watcher: Some(watcher),
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Default)]
struct MemoryState {
    content: Option<String>,
    watchers: Vec<UnboundedSender<()>>,
    fail_next_write: bool,
}

/// In-memory document.
///
/// Writes made through [`DocumentStore::write`] do not notify watchers;
/// [`MemoryDocument::edit`] does, like an external editor would.
#[derive(Default)]
pub struct MemoryDocument {
    state: Mutex<MemoryState>,
    writes: AtomicUsize,
}

impl MemoryDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                content: Some(content.into()),
                ..MemoryState::default()
            }),
            writes: AtomicUsize::new(0),
        }
    }

    /// A document that does not exist yet.
    pub fn missing() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn content(&self) -> Option<String> {
        self.state().content.clone()
    }

    /// Number of successful writes through the store.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next write fail.
    pub fn fail_next_write(&self) {
        self.state().fail_next_write = true;
    }

    /// Replace the text and notify watchers.
    pub fn edit(&self, content: impl Into<String>) {
        let mut state = self.state();
        state.content = Some(content.into());
        state.watchers.retain(|tx| tx.send(()).is_ok());
    }
}

#[async_trait]
impl DocumentStore for MemoryDocument {
    async fn read(&self) -> Result<Option<String>> {
        Ok(self.state().content.clone())
    }

    async fn write(&self, content: &str) -> Result<()> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_write) {
            return Err(Error::Document("write rejected".to_string()));
        }
        state.content = Some(content.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn watch(&self, changes: UnboundedSender<()>) -> Result<WatchHandle> {
        self.state().watchers.push(changes);
        Ok(WatchHandle::detached())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
