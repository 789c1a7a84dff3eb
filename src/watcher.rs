//! Sync orchestration.
//!
//! [`SyncWatcher`] turns document changes, graph changes, focus changes and
//! manual requests into sync cycles. A cycle reads both sides once, then
//! either applies a reconciled batch to the graph (file to project) or
//! queues a rewrite of the document (project to file).
//!
//! Two writes are deferred. Document rewrites wait `write_delay` and land
//! only if the document is still the text the rewrite was computed from.
//! Ids of newly created tasks wait `id_write_delay` and are written onto
//! their line only if that line still holds the same task.
//!
//! Every entry point that schedules a timer must run inside a tokio runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, SyncConfig, SyncDirection, TimingConfig};
use crate::document::{DocumentStore, WatchHandle};
use crate::error::{Error, Result};
use crate::graph::TaskGraph;
use crate::model::{collect_project_tasks, Project, Snack, SnackType, Task};
use crate::parser::{parse_markdown, write_id_marker, ParseOptions, ParsedTask};
use crate::reconcile::{plural, reconcile, OperationCounts, Reconciliation};
use crate::scheduler::Debouncer;
use crate::serializer::render_project_document;
use crate::verify::{log_sync_verification, verify_sync_state, SyncVerification};

/// Called with every error that aborts a cycle or a deferred write.
pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Called with every lifecycle event.
pub type EventCallback = Arc<dyn Fn(&WatcherEvent) + Send + Sync>;

/// What asked for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    File,
    Graph,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherStatus {
    Idle,
    Syncing,
    Watching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TimerKey {
    FileChange,
    GraphChange,
    PendingWrite,
    IdWrite,
    FocusSettle,
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub source: SyncSource,
    /// `FileToProject` or `ProjectToFile`
    pub direction: SyncDirection,
    pub counts: OperationCounts,
    pub warnings: Vec<String>,
    /// Created task ids waiting to be written into the document
    pub ids_queued: usize,
    /// A document rewrite is waiting for `write_delay`
    pub rewrite_queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<SyncVerification>,
}

impl SyncReport {
    fn new(source: SyncSource, direction: SyncDirection) -> Self {
        Self {
            source,
            direction,
            counts: OperationCounts::default(),
            warnings: Vec::new(),
            ids_queued: 0,
            rewrite_queued: false,
            verification: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Another cycle was in flight
    Skipped,
    Completed(SyncReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncInfo {
    pub is_watching: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub task_count: usize,
}

/// Lifecycle notifications for observers such as the event log.
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherEvent {
    SyncCompleted(SyncReport),
    SyncSkipped { source: SyncSource },
    SyncFailed { source: SyncSource, message: String },
    DocumentWritten { tasks: usize },
    RewriteDiscarded,
    IdsWritten { count: usize },
}

struct PendingWrite {
    content: String,
    /// Document text the rewrite was computed from
    snapshot: Option<String>,
    tasks: usize,
}

#[derive(Debug, Clone)]
struct PendingId {
    task_id: String,
    line: usize,
    title: String,
    /// Marker currently on the line, for duplicates and stale ids
    replaces: Option<String>,
}

#[derive(Default)]
struct WatcherState {
    started: bool,
    watch: Option<WatchHandle>,
    listener: Option<JoinHandle<()>>,
    pending_write: Option<PendingWrite>,
    pending_ids: Vec<PendingId>,
    id_retry_used: bool,
    last_sync: Option<DateTime<Utc>>,
    task_count: usize,
}

#[derive(Default)]
struct Callbacks {
    on_error: Option<ErrorCallback>,
    on_event: Option<EventCallback>,
}

/// Resets the single-flight flag when a cycle ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn cycle_direction(configured: SyncDirection, source: SyncSource) -> SyncDirection {
    match configured {
        SyncDirection::Bidirectional => match source {
            SyncSource::Graph => SyncDirection::ProjectToFile,
            SyncSource::File | SyncSource::Manual => SyncDirection::FileToProject,
        },
        fixed => fixed,
    }
}

struct Inner {
    config: SyncConfig,
    timing: TimingConfig,
    graph: Arc<dyn TaskGraph>,
    document: Arc<dyn DocumentStore>,
    timers: Debouncer<TimerKey>,
    syncing: AtomicBool,
    state: Mutex<WatcherState>,
    callbacks: Mutex<Callbacks>,
}

/// Keeps one document and one project in sync.
#[derive(Clone)]
pub struct SyncWatcher {
    inner: Arc<Inner>,
}

impl SyncWatcher {
    pub fn new(
        config: &Config,
        graph: Arc<dyn TaskGraph>,
        document: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: config.sync.clone(),
                timing: config.timing.clone(),
                graph,
                document,
                timers: Debouncer::new(),
                syncing: AtomicBool::new(false),
                state: Mutex::new(WatcherState::default()),
                callbacks: Mutex::new(Callbacks::default()),
            }),
        }
    }

    pub fn on_error(&self, callback: impl Fn(&Error) + Send + Sync + 'static) {
        self.inner.callbacks().on_error = Some(Arc::new(callback));
    }

    pub fn on_event(&self, callback: impl Fn(&WatcherEvent) + Send + Sync + 'static) {
        self.inner.callbacks().on_event = Some(Arc::new(callback));
    }

    /// Start reacting to triggers.
    ///
    /// Runs an initial cycle unless `skip_initial_sync` is set; a failed
    /// initial cycle is reported but does not prevent the watcher from
    /// starting.
    pub async fn start(&self, skip_initial_sync: bool) -> Result<()> {
        if !self.inner.config.enabled {
            info!("sync disabled, watcher not started");
            return Ok(());
        }
        {
            let mut state = self.inner.state();
            if state.started {
                return Ok(());
            }
            state.started = true;
        }

        let weak = Arc::downgrade(&self.inner);
        let runtime = tokio::runtime::Handle::current();
        self.inner
            .graph
            .on_window_focus_change(Box::new(move |focused| {
                if let Some(inner) = weak.upgrade() {
                    runtime.spawn(async move {
                        inner.handle_focus_change(focused).await;
                    });
                }
            }));

        info!(
            document = %self.inner.document.describe(),
            project = %self.inner.config.project_id,
            direction = %self.inner.config.sync_direction,
            "sync watcher started"
        );

        if skip_initial_sync {
            if self.inner.config.sync_direction.reads_document() {
                self.inner.start_watching()?;
            }
        } else if let Err(err) = self.inner.perform_sync(SyncSource::File).await {
            warn!(error = %err, "initial sync failed");
        }
        Ok(())
    }

    /// Stop watching and drop every pending timer, rewrite and id.
    pub fn stop(&self) {
        self.inner.timers.cancel_all();
        let mut state = self.inner.state();
        state.started = false;
        state.watch = None;
        if let Some(listener) = state.listener.take() {
            listener.abort();
        }
        if state.pending_write.take().is_some() {
            debug!("dropping pending document rewrite");
        }
        if !state.pending_ids.is_empty() {
            debug!(count = state.pending_ids.len(), "dropping pending task ids");
            state.pending_ids.clear();
        }
        info!("sync watcher stopped");
    }

    /// Run one cycle now. Returns [`SyncOutcome::Skipped`] when another
    /// cycle is in flight.
    pub async fn perform_sync(&self, source: SyncSource) -> Result<SyncOutcome> {
        self.inner.perform_sync(source).await
    }

    /// Manual sync.
    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        self.inner.perform_sync(SyncSource::Manual).await
    }

    /// The document changed outside of this watcher.
    pub fn notify_document_changed(&self) {
        self.inner.document_changed();
    }

    /// Tasks in the graph changed.
    pub fn notify_graph_changed(&self) {
        self.inner.graph_changed();
    }

    pub async fn handle_focus_change(&self, focused: bool) {
        self.inner.handle_focus_change(focused).await;
    }

    /// Write queued task ids now instead of waiting for the timer.
    pub async fn force_id_writing(&self) -> Result<usize> {
        self.inner.timers.cancel(&TimerKey::IdWrite);
        self.inner.write_pending_ids().await
    }

    /// Land the pending rewrite and queued ids now.
    pub async fn flush(&self) -> Result<()> {
        if self.inner.timers.cancel(&TimerKey::PendingWrite) {
            self.inner.execute_pending_write().await?;
        }
        self.force_id_writing().await?;
        Ok(())
    }

    pub fn status(&self) -> WatcherStatus {
        if self.inner.syncing.load(Ordering::Acquire) {
            WatcherStatus::Syncing
        } else if self.inner.state().watch.is_some() {
            WatcherStatus::Watching
        } else {
            WatcherStatus::Idle
        }
    }

    pub fn sync_info(&self) -> SyncInfo {
        let state = self.inner.state();
        SyncInfo {
            is_watching: state.watch.is_some(),
            last_sync_time: state.last_sync,
            task_count: state.task_count,
        }
    }

    pub fn has_pending_write(&self) -> bool {
        self.inner.state().pending_write.is_some()
    }

    pub fn pending_id_count(&self) -> usize {
        self.inner.state().pending_ids.len()
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, WatcherState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn callbacks(&self) -> MutexGuard<'_, Callbacks> {
        self.callbacks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_started(&self) -> bool {
        self.state().started
    }

    fn emit(&self, event: &WatcherEvent) {
        let callback = self.callbacks().on_event.clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    fn notify_error(&self, err: &Error) {
        let callback = self.callbacks().on_error.clone();
        if let Some(callback) = callback {
            callback(err);
        }
    }

    async fn snack(&self, kind: SnackType, msg: impl Into<String>) {
        self.graph.show_snack(Snack::new(kind, msg)).await;
    }

    fn start_watching(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state();
        if state.watch.is_some() {
            return Ok(());
        }
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = self.document.watch(tx)?;
        let weak = Arc::downgrade(self);
        let listener = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                match weak.upgrade() {
                    Some(inner) => inner.document_changed(),
                    None => break,
                }
            }
        });
        state.watch = Some(handle);
        state.listener = Some(listener);
        info!(document = %self.document.describe(), "watching document for changes");
        Ok(())
    }

    fn document_changed(self: &Arc<Self>) {
        if !self.is_started() {
            return;
        }
        debug!(delay_ms = self.timing.file_debounce_ms, "document changed, debouncing");
        let weak = Arc::downgrade(self);
        self.timers
            .schedule(TimerKey::FileChange, self.timing.file_debounce(), async move {
                if let Some(inner) = weak.upgrade() {
                    let _ = inner.perform_sync(SyncSource::File).await;
                }
            });
    }

    fn graph_changed(self: &Arc<Self>) {
        if !self.is_started() {
            return;
        }
        debug!(delay_ms = self.timing.graph_debounce_ms, "graph changed, debouncing");
        let weak = Arc::downgrade(self);
        self.timers
            .schedule(TimerKey::GraphChange, self.timing.graph_debounce(), async move {
                if let Some(inner) = weak.upgrade() {
                    let _ = inner.perform_sync(SyncSource::Graph).await;
                }
            });
    }

    async fn handle_focus_change(self: &Arc<Self>, focused: bool) {
        if !self.is_started() {
            return;
        }
        if focused {
            debug!("window focused");
            let weak = Arc::downgrade(self);
            self.timers
                .schedule(TimerKey::FocusSettle, self.timing.focus_settle(), async move {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    if inner.timers.cancel(&TimerKey::FileChange) {
                        info!("pending document change picked up on focus");
                        let _ = inner.perform_sync(SyncSource::File).await;
                    }
                });
        } else {
            self.timers.cancel(&TimerKey::FocusSettle);
            if self.timers.cancel(&TimerKey::PendingWrite) {
                info!("window lost focus, writing pending rewrite now");
                let _ = self.execute_pending_write().await;
            }
        }
    }

    async fn perform_sync(self: &Arc<Self>, source: SyncSource) -> Result<SyncOutcome> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(?source, "sync already in progress, skipping");
            self.emit(&WatcherEvent::SyncSkipped { source });
            return Ok(SyncOutcome::Skipped);
        }
        let _flight = FlightGuard(&self.syncing);
        self.state().last_sync = Some(Utc::now());
        debug!(?source, "sync started");

        match self.run_cycle(source).await {
            Ok(report) => {
                if self.config.sync_direction.reads_document() && self.is_started() {
                    if let Err(err) = self.start_watching() {
                        warn!(error = %err, "could not watch document");
                    }
                }
                info!(
                    ?source,
                    direction = %report.direction,
                    created = report.counts.created,
                    updated = report.counts.updated,
                    deleted = report.counts.deleted,
                    rewrite_queued = report.rewrite_queued,
                    "sync completed"
                );
                self.emit(&WatcherEvent::SyncCompleted(report.clone()));
                Ok(SyncOutcome::Completed(report))
            }
            Err(err) => {
                error!(?source, error = %err, "sync failed");
                let msg = match &err {
                    Error::BatchFailed(errors) => format!(
                        "Batch sync failed: {}",
                        errors.first().map(String::as_str).unwrap_or("Unknown error")
                    ),
                    other => format!("Sync failed: {other}"),
                };
                self.snack(SnackType::Error, msg).await;
                self.notify_error(&err);
                self.emit(&WatcherEvent::SyncFailed {
                    source,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn run_cycle(self: &Arc<Self>, source: SyncSource) -> Result<SyncReport> {
        let direction = cycle_direction(self.config.sync_direction, source);

        // ids must land before the document is read again, or their lines
        // would import as new tasks
        let ids_pending = !self.state().pending_ids.is_empty();
        if direction == SyncDirection::FileToProject && ids_pending {
            self.timers.cancel(&TimerKey::IdWrite);
            if let Err(err) = self.write_pending_ids().await {
                warn!(error = %err, "could not write pending task ids before sync");
            }
        }

        let content = self.document.read().await?;
        let projects = self.graph.get_all_projects().await?;
        let project = projects
            .into_iter()
            .find(|project| project.id == self.config.project_id)
            .ok_or_else(|| Error::ProjectNotFound(self.config.project_id.clone()))?;
        let all_tasks = self.graph.get_tasks().await?;
        let sp_tasks = collect_project_tasks(&project, &all_tasks);
        self.state().task_count = sp_tasks.len();

        match (direction, content) {
            (SyncDirection::FileToProject, Some(content)) => {
                self.file_to_project(source, &content, &sp_tasks, &project)
                    .await
            }
            (SyncDirection::FileToProject, None)
                if !self.config.sync_direction.writes_document() =>
            {
                Err(Error::Document(format!(
                    "{} does not exist",
                    self.document.describe()
                )))
            }
            (_, content) => {
                if content.is_none() {
                    info!(
                        document = %self.document.describe(),
                        "document missing, creating it from project"
                    );
                }
                Ok(self.project_to_file(source, content, &sp_tasks, &project))
            }
        }
    }

    async fn file_to_project(
        self: &Arc<Self>,
        source: SyncSource,
        content: &str,
        sp_tasks: &[Task],
        project: &Project,
    ) -> Result<SyncReport> {
        let parsed = parse_markdown(content, ParseOptions::sync());
        for warning in &parsed.warnings {
            warn!(%warning, "document parse warning");
        }

        let reconciliation = reconcile(&parsed.tasks, sp_tasks, &project.task_ids);
        for warning in &reconciliation.warnings {
            self.snack(SnackType::Warning, warning.clone()).await;
        }

        let mut report = SyncReport::new(source, SyncDirection::FileToProject);
        report.warnings = reconciliation.warnings.clone();

        if reconciliation.is_empty() {
            debug!("document and project already agree");
            if source == SyncSource::Manual && reconciliation.legacy_ids == 0 {
                self.snack(SnackType::Info, "Markdown sync: Already up to date")
                    .await;
            }
            let verification = verify_sync_state(&parsed.tasks, sp_tasks, &project.task_ids);
            log_sync_verification(&verification, "file to project");
            report.verification = Some(verification);
            return Ok(report);
        }

        let counts = reconciliation.counts();
        info!(
            project = %project.id,
            operations = reconciliation.operations.len(),
            "applying batch"
        );
        let result = self
            .graph
            .batch_update_for_project(&project.id, reconciliation.operations.clone())
            .await?;
        if !result.success {
            return Err(Error::BatchFailed(result.errors));
        }
        report.counts = counts;
        if let Some(summary) = counts.describe() {
            self.snack(SnackType::Success, format!("Markdown sync: {summary}"))
                .await;
        }

        report.ids_queued =
            self.queue_created_ids(&parsed.tasks, &reconciliation, &result.created_task_ids);
        Ok(report)
    }

    fn project_to_file(
        self: &Arc<Self>,
        source: SyncSource,
        content: Option<String>,
        sp_tasks: &[Task],
        project: &Project,
    ) -> SyncReport {
        let header = if self.config.preserve_header {
            content
                .as_deref()
                .and_then(|text| parse_markdown(text, ParseOptions::sync()).header)
        } else {
            None
        };
        let mut rendered = render_project_document(sp_tasks, &project.task_ids, header.as_deref());
        let had_newline = content.as_deref().is_some_and(|text| text.ends_with('\n'));
        if had_newline && !rendered.ends_with('\n') {
            rendered.push('\n');
        }

        let mut report = SyncReport::new(source, SyncDirection::ProjectToFile);
        if content.as_deref() == Some(rendered.as_str()) {
            debug!("document already matches project");
            return report;
        }

        self.queue_rewrite(PendingWrite {
            content: rendered,
            snapshot: content,
            tasks: sp_tasks.len(),
        });
        report.rewrite_queued = true;
        report
    }

    fn queue_rewrite(self: &Arc<Self>, write: PendingWrite) {
        let replaced = self.state().pending_write.replace(write).is_some();
        debug!(replaced, delay_ms = self.timing.write_delay_ms, "document rewrite queued");
        let weak = Arc::downgrade(self);
        self.timers
            .schedule(TimerKey::PendingWrite, self.timing.write_delay(), async move {
                if let Some(inner) = weak.upgrade() {
                    let _ = inner.execute_pending_write().await;
                }
            });
    }

    /// Write the queued rewrite unless the document moved on since it was
    /// computed. Returns whether the document was written.
    async fn execute_pending_write(&self) -> Result<bool> {
        let pending = self.state().pending_write.take();
        let Some(pending) = pending else {
            return Ok(false);
        };

        let outcome: Result<bool> = async {
            let current = self.document.read().await?;
            if current != pending.snapshot {
                return Ok(false);
            }
            self.document.write(&pending.content).await?;
            Ok(true)
        }
        .await;

        match outcome {
            Ok(true) => {
                info!(
                    tasks = pending.tasks,
                    document = %self.document.describe(),
                    "document rewritten from project"
                );
                self.snack(
                    SnackType::Success,
                    format!("Markdown sync: Updated {}", plural(pending.tasks, "task")),
                )
                .await;
                self.emit(&WatcherEvent::DocumentWritten {
                    tasks: pending.tasks,
                });
                Ok(true)
            }
            Ok(false) => {
                warn!("document changed while a rewrite was pending, discarding the rewrite");
                self.emit(&WatcherEvent::RewriteDiscarded);
                Ok(false)
            }
            Err(err) => {
                error!(error = %err, "document rewrite failed");
                self.snack(SnackType::Error, "Failed to write tasks to markdown file")
                    .await;
                self.notify_error(&err);
                Err(err)
            }
        }
    }

    fn queue_created_ids(
        self: &Arc<Self>,
        md_tasks: &[ParsedTask],
        reconciliation: &Reconciliation,
        created: &HashMap<String, String>,
    ) -> usize {
        let by_line: HashMap<usize, &ParsedTask> = md_tasks.iter().map(|t| (t.line, t)).collect();
        let mut queued: Vec<PendingId> = Vec::new();
        for (temp_id, line) in &reconciliation.created_lines {
            let Some(task_id) = created.get(temp_id) else {
                warn!(temp_id = %temp_id, "batch result has no id for created task");
                continue;
            };
            let Some(task) = by_line.get(line) else {
                continue;
            };
            queued.push(PendingId {
                task_id: task_id.clone(),
                line: *line,
                title: task.title.clone(),
                replaces: task.original_id.clone(),
            });
        }
        queued.sort_by_key(|pending| pending.line);

        let count = queued.len();
        if count == 0 {
            return 0;
        }
        {
            let mut state = self.state();
            state.pending_ids.extend(queued);
            state.id_retry_used = false;
        }
        debug!(count, delay_ms = self.timing.id_write_delay_ms, "task ids queued for write-back");
        self.schedule_id_write();
        count
    }

    fn schedule_id_write(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.timers
            .schedule(TimerKey::IdWrite, self.timing.id_write_delay(), async move {
                if let Some(inner) = weak.upgrade() {
                    let _ = inner.write_pending_ids().await;
                }
            });
    }

    /// Write queued ids into the document. A failure requeues them and
    /// retries once.
    async fn write_pending_ids(self: &Arc<Self>) -> Result<usize> {
        let updates = std::mem::take(&mut self.state().pending_ids);
        if updates.is_empty() {
            return Ok(0);
        }

        match self.apply_ids(&updates).await {
            Ok(written) => {
                self.state().id_retry_used = false;
                if written < updates.len() {
                    debug!(
                        skipped = updates.len() - written,
                        "lines changed since creation, some ids not written"
                    );
                }
                Ok(written)
            }
            Err(err) => {
                let count = updates.len();
                let retry = {
                    let mut state = self.state();
                    let retry = !state.id_retry_used;
                    if retry {
                        state.id_retry_used = true;
                        let newer = std::mem::take(&mut state.pending_ids);
                        state.pending_ids = updates;
                        state.pending_ids.extend(newer);
                    }
                    retry
                };
                if retry {
                    warn!(error = %err, count, "writing task ids failed, retrying");
                    self.schedule_id_write();
                } else {
                    error!(error = %err, count, "writing task ids failed again, giving up");
                    self.notify_error(&err);
                }
                Err(err)
            }
        }
    }

    async fn apply_ids(&self, updates: &[PendingId]) -> Result<usize> {
        let content = self.document.read().await?;
        let Some(content) = content else {
            return Err(Error::Document(format!(
                "{} does not exist",
                self.document.describe()
            )));
        };
        let (bom, body) = match content.strip_prefix('\u{feff}') {
            Some(body) => ("\u{feff}", body),
            None => ("", content.as_str()),
        };

        let mut lines: Vec<String> = body.split('\n').map(str::to_string).collect();
        let mut written = 0;
        for update in updates {
            let rewritten = lines.get(update.line).and_then(|line| {
                write_id_marker(line, &update.task_id, &update.title, update.replaces.as_deref())
            });
            match rewritten {
                Some(line) => {
                    lines[update.line] = line;
                    written += 1;
                }
                None => debug!(
                    task = %update.task_id,
                    line = update.line + 1,
                    "line no longer holds the created task, id not written"
                ),
            }
        }

        if written > 0 {
            self.document
                .write(&format!("{bom}{}", lines.join("\n")))
                .await?;
            info!(count = written, "task ids written to document");
            self.emit(&WatcherEvent::IdsWritten { count: written });
        }
        Ok(written)
    }
}
