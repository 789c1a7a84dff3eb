//! mdsync watch command implementation
//!
//! Runs the sync watcher against the configured document and an in-memory
//! task graph. With `--graph` the graph is seeded from a snapshot file and
//! external edits of that file are picked up as graph changes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::document::{DocumentStore, FsDocument, WatchHandle};
use crate::error::Result;
use crate::events::{Event, EventDestination, EventKind, EventSink};
use crate::graph::MemoryTaskGraph;
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};
use crate::model::{GraphSnapshot, Project};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::watcher::{SyncInfo, SyncOutcome, SyncReport, SyncWatcher, WatcherEvent};

/// Options for the watch command
pub struct WatchOptions {
    pub graph: Option<PathBuf>,
    pub file: Option<PathBuf>,
    pub once: bool,
    pub persist: bool,
    pub events: Option<String>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct WatchReport {
    document: PathBuf,
    project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<SyncReport>,
    info: SyncInfo,
}

type SharedSink = Arc<Mutex<EventSink>>;

fn emit_event(sink: Option<&SharedSink>, event: Event) {
    let Some(sink) = sink else {
        return;
    };
    let mut sink = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Err(err) = sink.emit(&event) {
        warn!(error = %err, "failed to write event");
    }
}

fn save_snapshot(graph: &MemoryTaskGraph, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(&graph.snapshot())?;
    lock::write_atomic_locked(path, content.as_bytes(), DEFAULT_LOCK_TIMEOUT_MS)
}

fn seed_graph(path: Option<&Path>, project_id: &str) -> Result<GraphSnapshot> {
    let mut snapshot = match path {
        Some(path) if path.exists() => GraphSnapshot::load(path)?,
        _ => GraphSnapshot::default(),
    };
    if snapshot.project(project_id).is_none() {
        info!(project = project_id, "project missing from graph, starting empty");
        snapshot.projects.push(Project {
            id: project_id.to_string(),
            title: project_id.to_string(),
            task_ids: Vec::new(),
        });
    }
    Ok(snapshot)
}

pub fn run(options: WatchOptions) -> Result<()> {
    let (mut config, base) = super::load_config(options.config.as_deref())?;
    if let Some(file) = &options.file {
        config.sync.file_path = file.clone();
    }
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(watch(config, base, options))
}

async fn watch(config: Config, base: PathBuf, options: WatchOptions) -> Result<()> {
    let document_path = config.document_path(&base);
    let project_id = config.sync.project_id.clone();
    let snapshot = seed_graph(options.graph.as_deref(), &project_id)?;
    let graph = Arc::new(MemoryTaskGraph::new(snapshot));
    let document = Arc::new(FsDocument::new(&document_path));

    let sink: Option<SharedSink> = match EventDestination::parse(options.events.as_deref()) {
        Some(destination) => Some(Arc::new(Mutex::new(destination.open()?))),
        None => None,
    };

    let watcher = SyncWatcher::new(&config, graph.clone(), document);
    {
        let sink = sink.clone();
        let graph = Arc::clone(&graph);
        let persist_to = options.graph.clone().filter(|_| options.persist);
        let project = project_id.clone();
        watcher.on_event(move |event| {
            if let (Some(path), WatcherEvent::SyncCompleted(report)) = (&persist_to, event) {
                if report.counts.describe().is_some() {
                    if let Err(err) = save_snapshot(&graph, path) {
                        warn!(error = %err, "failed to persist graph snapshot");
                    }
                }
            }
            match Event::from_watcher(event, &project) {
                Ok(event) => emit_event(sink.as_ref(), event),
                Err(err) => warn!(error = %err, "failed to encode event"),
            }
        });
    }

    let mut report = None;
    if options.once {
        if let SyncOutcome::Completed(completed) = watcher.sync_now().await? {
            report = Some(completed);
        }
        watcher.flush().await?;
    } else {
        emit_event(
            sink.as_ref(),
            Event::new(EventKind::WatcherStarted, Some(project_id.clone())),
        );
        let _graph_watch = match &options.graph {
            Some(path) => Some(follow_snapshot(path, Arc::clone(&graph), watcher.clone())?),
            None => None,
        };
        watcher.start(false).await?;
        if !options.quiet && !options.json {
            eprintln!(
                "mdsync watch: syncing {} with project {} (Ctrl-C to stop)",
                document_path.display(),
                project_id
            );
        }

        tokio::signal::ctrl_c().await?;
        if let Err(err) = watcher.flush().await {
            warn!(error = %err, "failed to flush pending writes on shutdown");
        }
        watcher.stop();
        emit_event(
            sink.as_ref(),
            Event::new(EventKind::WatcherStopped, Some(project_id.clone())),
        );
    }

    if let (true, Some(path)) = (options.persist, &options.graph) {
        save_snapshot(&graph, path)?;
    }

    let info = watcher.sync_info();
    let header = match &report {
        Some(report) => match report.counts.describe() {
            Some(summary) => format!("mdsync watch: {summary}"),
            None if report.rewrite_queued => "mdsync watch: document rewritten".to_string(),
            None => "mdsync watch: already up to date".to_string(),
        },
        None => "mdsync watch: stopped".to_string(),
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("document", document_path.display().to_string());
    human.push_summary("project", project_id.clone());
    human.push_summary("tasks", info.task_count.to_string());
    if let Some(report) = &report {
        for warning in &report.warnings {
            human.push_warning(warning.clone());
        }
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "watch",
        &WatchReport {
            document: document_path,
            project: project_id,
            report,
            info,
        },
        Some(&human),
    )
}

/// Reload the graph when the snapshot file changes on disk.
fn follow_snapshot(
    path: &Path,
    graph: Arc<MemoryTaskGraph>,
    watcher: SyncWatcher,
) -> Result<WatchHandle> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = FsDocument::new(path).watch(tx)?;
    let path = path.to_path_buf();
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let loaded = match GraphSnapshot::load(&path) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    debug!(error = %err, "snapshot not readable yet");
                    continue;
                }
            };
            if loaded == graph.snapshot() {
                continue;
            }
            info!(path = %path.display(), "graph snapshot changed on disk");
            graph.edit(|snapshot| *snapshot = loaded);
            watcher.notify_graph_changed();
        }
    });
    Ok(handle)
}
