mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mdsync::config::{Config, SyncDirection};
use mdsync::document::MemoryDocument;
use mdsync::graph::{FocusCallback, MemoryTaskGraph, TaskGraph};
use mdsync::model::{
    BatchResult, GraphSnapshot, Operation, Project, Snack, SnackType, Task, TaskUpdates,
};
use mdsync::watcher::{SyncOutcome, SyncSource, SyncWatcher, WatcherEvent, WatcherStatus};
use mdsync::Result;
use tokio::time::sleep;

use support::{snapshot, task};

struct Harness {
    graph: Arc<MemoryTaskGraph>,
    document: Arc<MemoryDocument>,
    watcher: SyncWatcher,
    events: Arc<Mutex<Vec<WatcherEvent>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new(config: Config, graph: GraphSnapshot, document: MemoryDocument) -> Self {
        let graph = Arc::new(MemoryTaskGraph::new(graph));
        let document = Arc::new(document);
        let watcher = SyncWatcher::new(&config, graph.clone(), document.clone());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        watcher.on_event(move |event| sink.lock().unwrap().push(event.clone()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        watcher.on_error(move |err| sink.lock().unwrap().push(err.to_string()));

        Self {
            graph,
            document,
            watcher,
            events,
            errors,
        }
    }

    fn doc(&self) -> String {
        self.document.content().unwrap_or_default()
    }

    fn snack_messages(&self, kind: SnackType) -> Vec<String> {
        self.graph
            .snacks()
            .into_iter()
            .filter(|snack| snack.kind == kind)
            .map(|snack| snack.msg)
            .collect()
    }

    fn task_titled(&self, title: &str) -> Task {
        self.graph
            .snapshot()
            .tasks
            .into_iter()
            .find(|t| t.title == title)
            .unwrap_or_else(|| panic!("no task titled {title}"))
    }

    fn events(&self) -> Vec<WatcherEvent> {
        self.events.lock().unwrap().clone()
    }
}

fn config(direction: SyncDirection) -> Config {
    let mut config = Config::default();
    config.sync.project_id = "inbox".to_string();
    config.sync.sync_direction = direction;
    config
}

fn empty_inbox() -> GraphSnapshot {
    snapshot(Vec::new(), &[])
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[tokio::test(start_paused = true)]
async fn document_edit_is_imported_after_debounce() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        empty_inbox(),
        MemoryDocument::new("- [ ] Buy milk\n"),
    );
    h.watcher.start(true).await.unwrap();
    assert_eq!(h.watcher.status(), WatcherStatus::Watching);

    h.document.edit("- [ ] Buy milk\n- [ ] Call mom\n");
    sleep(secs(9)).await;
    assert!(h.graph.batches().is_empty());

    sleep(secs(2)).await;
    assert_eq!(h.graph.snapshot().tasks.len(), 2);
    assert_eq!(
        h.snack_messages(SnackType::Success),
        vec!["Markdown sync: 2 tasks imported".to_string()]
    );
    assert_eq!(h.watcher.pending_id_count(), 2);
    assert_eq!(h.doc(), "- [ ] Buy milk\n- [ ] Call mom\n");

    sleep(secs(10)).await;
    assert_eq!(h.watcher.pending_id_count(), 0);
    let milk = h.task_titled("Buy milk");
    let mom = h.task_titled("Call mom");
    assert_eq!(
        h.doc(),
        format!("- [ ] <!-- sp:{} --> Buy milk\n- [ ] <!-- sp:{} --> Call mom\n", milk.id, mom.id)
    );
    assert!(h.events().contains(&WatcherEvent::IdsWritten { count: 2 }));
}

#[tokio::test(start_paused = true)]
async fn repeated_edits_restart_the_debounce() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        empty_inbox(),
        MemoryDocument::new(""),
    );
    h.watcher.start(true).await.unwrap();

    h.document.edit("- [ ] One\n");
    sleep(secs(6)).await;
    h.document.edit("- [ ] One\n- [ ] Two\n");
    sleep(secs(6)).await;
    assert!(h.graph.batches().is_empty());

    sleep(secs(5)).await;
    assert_eq!(h.graph.batches().len(), 1);
    assert_eq!(h.graph.snapshot().tasks.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn manual_sync_reports_up_to_date() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        snapshot(vec![task("a", "A", false, None, &[])], &["a"]),
        MemoryDocument::new("- [ ] <!-- sp:a --> A\n"),
    );

    let outcome = h.watcher.sync_now().await.unwrap();
    let SyncOutcome::Completed(report) = outcome else {
        panic!("sync was skipped");
    };
    assert_eq!(report.source, SyncSource::Manual);
    assert_eq!(report.direction, SyncDirection::FileToProject);
    assert!(report.counts.describe().is_none());
    assert!(report.verification.expect("verification").is_in_sync);
    assert_eq!(
        h.snack_messages(SnackType::Info),
        vec!["Markdown sync: Already up to date".to_string()]
    );
    assert!(h.graph.batches().is_empty());
    assert_eq!(h.watcher.sync_info().task_count, 1);
    assert!(h.watcher.sync_info().last_sync_time.is_some());
}

#[tokio::test(start_paused = true)]
async fn graph_change_rewrites_document_after_write_delay() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        snapshot(vec![task("a", "A", false, None, &[])], &["a"]),
        MemoryDocument::new("# Inbox\n\n- [ ] <!-- sp:a --> A\n"),
    );
    h.watcher.start(true).await.unwrap();

    h.graph.edit(|graph| graph.tasks[0].is_done = true);
    h.watcher.notify_graph_changed();

    sleep(secs(11)).await;
    assert!(h.watcher.has_pending_write());
    assert_eq!(h.doc(), "# Inbox\n\n- [ ] <!-- sp:a --> A\n");

    sleep(secs(2)).await;
    assert!(!h.watcher.has_pending_write());
    assert_eq!(h.doc(), "# Inbox\n\n- [x] <!-- sp:a --> A\n");
    assert_eq!(
        h.snack_messages(SnackType::Success),
        vec!["Markdown sync: Updated 1 task".to_string()]
    );
    assert!(h.events().contains(&WatcherEvent::DocumentWritten { tasks: 1 }));

    // nothing changed since, so a second cycle leaves the document alone
    let outcome = h.watcher.perform_sync(SyncSource::Graph).await.unwrap();
    let SyncOutcome::Completed(report) = outcome else {
        panic!("sync was skipped");
    };
    assert!(!report.rewrite_queued);
    sleep(secs(5)).await;
    assert_eq!(h.document.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn new_root_keeps_its_document_position() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        snapshot(vec![task("a", "A", false, None, &[])], &["a"]),
        MemoryDocument::new("- [ ] Fresh\n- [ ] <!-- sp:a --> A\n"),
    );
    h.watcher.perform_sync(SyncSource::File).await.unwrap();

    let fresh = h.task_titled("Fresh");
    assert_eq!(
        h.graph.project("inbox").unwrap().task_ids,
        vec![fresh.id.clone(), "a".to_string()]
    );

    h.watcher.force_id_writing().await.unwrap();
    h.watcher.perform_sync(SyncSource::Graph).await.unwrap();
    h.watcher.flush().await.unwrap();
    assert_eq!(
        h.doc(),
        format!("- [ ] <!-- sp:{} --> Fresh\n- [ ] <!-- sp:a --> A\n", fresh.id)
    );
}

#[tokio::test(start_paused = true)]
async fn note_checklists_are_stable_across_rewrites() {
    let mut prepared = task("a", "Prepare", false, None, &[]);
    prepared.notes = Some("- [ ] step one\n  - [x] step two".to_string());
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        snapshot(vec![prepared], &["a"]),
        MemoryDocument::new(""),
    );

    h.watcher.perform_sync(SyncSource::Graph).await.unwrap();
    h.watcher.flush().await.unwrap();
    let first = h.doc();
    assert_eq!(
        first,
        "- [ ] <!-- sp:a --> Prepare\n    - [ ] step one\n    - [x] step two"
    );

    // reading it back does not touch the notes, and rendering again is a no-op
    h.watcher.sync_now().await.unwrap();
    assert!(h.graph.batches().is_empty());
    h.watcher.perform_sync(SyncSource::Graph).await.unwrap();
    assert!(!h.watcher.has_pending_write());
    assert_eq!(h.doc(), first);
    assert_eq!(h.document.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_rewrite_is_discarded() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        snapshot(vec![task("a", "A", true, None, &[])], &["a"]),
        MemoryDocument::new("- [ ] <!-- sp:a --> A\n"),
    );

    h.watcher.perform_sync(SyncSource::Graph).await.unwrap();
    assert!(h.watcher.has_pending_write());

    h.document.edit("- [ ] <!-- sp:a --> A, edited by hand\n");
    sleep(secs(3)).await;

    assert_eq!(h.doc(), "- [ ] <!-- sp:a --> A, edited by hand\n");
    assert_eq!(h.document.write_count(), 0);
    assert!(h.events().contains(&WatcherEvent::RewriteDiscarded));
}

#[tokio::test(start_paused = true)]
async fn focus_loss_flushes_pending_rewrite() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        snapshot(vec![task("a", "A", true, None, &[])], &["a"]),
        MemoryDocument::new("- [ ] <!-- sp:a --> A\n"),
    );
    h.watcher.start(true).await.unwrap();
    h.watcher.perform_sync(SyncSource::Graph).await.unwrap();
    assert!(h.watcher.has_pending_write());

    h.watcher.handle_focus_change(false).await;
    assert_eq!(h.doc(), "- [x] <!-- sp:a --> A\n");
    assert!(!h.watcher.has_pending_write());
}

#[tokio::test(start_paused = true)]
async fn focus_gain_runs_pending_document_sync_early() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        empty_inbox(),
        MemoryDocument::new(""),
    );
    h.watcher.start(true).await.unwrap();

    h.document.edit("- [ ] Water plants\n");
    sleep(secs(1)).await;
    h.graph.set_focus(true);

    sleep(secs(3)).await;
    assert_eq!(h.graph.batches().len(), 1);
    assert_eq!(h.task_titled("Water plants").title, "Water plants");

    // the debounced sync was consumed by the focus settle
    sleep(secs(10)).await;
    assert_eq!(h.graph.batches().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn focus_gain_without_pending_change_does_nothing() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        snapshot(vec![task("a", "A", false, None, &[])], &["a"]),
        MemoryDocument::new("- [ ] <!-- sp:a --> A\n"),
    );
    h.watcher.start(true).await.unwrap();

    h.watcher.handle_focus_change(true).await;
    sleep(secs(5)).await;
    assert!(h.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn batch_failure_reports_error_and_leaves_document() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        empty_inbox(),
        MemoryDocument::new("- [ ] New task\n"),
    );
    h.graph.fail_next_batch(vec!["parent p not found".to_string()]);

    let err = h.watcher.sync_now().await.expect_err("batch fails");
    assert!(matches!(err, mdsync::Error::BatchFailed(_)));
    assert_eq!(
        h.snack_messages(SnackType::Error),
        vec!["Batch sync failed: parent p not found".to_string()]
    );
    assert_eq!(h.errors.lock().unwrap().len(), 1);
    assert_eq!(h.doc(), "- [ ] New task\n");
    assert!(h.graph.snapshot().tasks.is_empty());
    assert_eq!(h.watcher.pending_id_count(), 0);
    assert!(matches!(h.events().last(), Some(WatcherEvent::SyncFailed { .. })));

    // the flag was released, so the next cycle runs
    let outcome = h.watcher.sync_now().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Completed(_)));
    assert_eq!(h.graph.snapshot().tasks.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_project_fails_the_cycle() {
    let mut cfg = config(SyncDirection::Bidirectional);
    cfg.sync.project_id = "nope".to_string();
    let h = Harness::new(cfg, empty_inbox(), MemoryDocument::new("- [ ] A\n"));

    let err = h.watcher.sync_now().await.expect_err("no project");
    assert!(matches!(err, mdsync::Error::ProjectNotFound(_)));
    assert_eq!(
        h.snack_messages(SnackType::Error),
        vec!["Sync failed: Project not found: nope".to_string()]
    );
}

/// Graph whose project lookup takes a while.
struct SlowGraph {
    inner: MemoryTaskGraph,
}

#[async_trait]
impl TaskGraph for SlowGraph {
    async fn get_tasks(&self) -> Result<Vec<Task>> {
        self.inner.get_tasks().await
    }

    async fn get_all_projects(&self) -> Result<Vec<Project>> {
        sleep(secs(5)).await;
        self.inner.get_all_projects().await
    }

    async fn batch_update_for_project(
        &self,
        project_id: &str,
        operations: Vec<Operation>,
    ) -> Result<BatchResult> {
        self.inner.batch_update_for_project(project_id, operations).await
    }

    async fn update_task(&self, task_id: &str, updates: TaskUpdates) -> Result<()> {
        self.inner.update_task(task_id, updates).await
    }

    async fn show_snack(&self, snack: Snack) {
        self.inner.show_snack(snack).await
    }

    fn on_window_focus_change(&self, callback: FocusCallback) {
        self.inner.on_window_focus_change(callback)
    }
}

#[tokio::test(start_paused = true)]
async fn overlapping_sync_is_skipped() {
    let graph = Arc::new(SlowGraph {
        inner: MemoryTaskGraph::new(snapshot(vec![task("a", "A", false, None, &[])], &["a"])),
    });
    let document = Arc::new(MemoryDocument::new("- [ ] <!-- sp:a --> A\n"));
    let watcher = SyncWatcher::new(&config(SyncDirection::Bidirectional), graph, document);

    let first = {
        let watcher = watcher.clone();
        tokio::spawn(async move { watcher.sync_now().await })
    };
    tokio::task::yield_now().await;
    assert_eq!(watcher.status(), WatcherStatus::Syncing);

    let second = watcher.perform_sync(SyncSource::File).await.unwrap();
    assert_eq!(second, SyncOutcome::Skipped);

    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, SyncOutcome::Completed(_)));
    assert_eq!(watcher.status(), WatcherStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn id_write_skips_lines_that_changed() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        empty_inbox(),
        MemoryDocument::new("- [ ] One\n- [ ] Two"),
    );
    h.watcher.sync_now().await.unwrap();
    assert_eq!(h.watcher.pending_id_count(), 2);

    h.document.edit("- [ ] One\n- [ ] Two, renamed");
    let written = h.watcher.force_id_writing().await.unwrap();
    assert_eq!(written, 1);

    let one = h.task_titled("One");
    assert_eq!(
        h.doc(),
        format!("- [ ] <!-- sp:{} --> One\n- [ ] Two, renamed", one.id)
    );
    assert_eq!(h.watcher.pending_id_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_id_write_is_retried_once() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        empty_inbox(),
        MemoryDocument::new("- [ ] One\n"),
    );
    h.watcher.sync_now().await.unwrap();

    h.document.fail_next_write();
    assert!(h.watcher.force_id_writing().await.is_err());
    assert_eq!(h.watcher.pending_id_count(), 1);
    assert!(h.errors.lock().unwrap().is_empty());

    sleep(secs(11)).await;
    let one = h.task_titled("One");
    assert_eq!(h.doc(), format!("- [ ] <!-- sp:{} --> One\n", one.id));
    assert_eq!(h.watcher.pending_id_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn pending_ids_land_before_the_next_import() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        empty_inbox(),
        MemoryDocument::new("- [ ] One\n"),
    );
    h.watcher.sync_now().await.unwrap();
    assert_eq!(h.watcher.pending_id_count(), 1);

    // a second cycle before the id timer fires must not import the line again
    let outcome = h.watcher.sync_now().await.unwrap();
    let SyncOutcome::Completed(report) = outcome else {
        panic!("sync was skipped");
    };
    assert!(report.counts.describe().is_none());
    assert_eq!(h.graph.snapshot().tasks.len(), 1);
    assert!(h.doc().contains("<!-- sp:"));
}

#[tokio::test(start_paused = true)]
async fn duplicate_line_gets_its_own_id() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        snapshot(vec![task("a", "A", false, None, &[])], &["a"]),
        MemoryDocument::new("- [ ] <!-- sp:a --> A\n- [ ] <!-- sp:a --> Copy of A\n"),
    );

    h.watcher.sync_now().await.unwrap();
    let warnings = h.snack_messages(SnackType::Warning);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("Found duplicate task IDs: a."));

    h.watcher.force_id_writing().await.unwrap();
    let copy = h.task_titled("Copy of A");
    assert_eq!(
        h.doc(),
        format!("- [ ] <!-- sp:a --> A\n- [ ] <!-- sp:{} --> Copy of A\n", copy.id)
    );

    // converged: the next manual sync has nothing to do
    h.watcher.sync_now().await.unwrap();
    assert_eq!(h.graph.batches().len(), 1);
    assert_eq!(
        h.snack_messages(SnackType::Info),
        vec!["Markdown sync: Already up to date".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_document_is_created_from_project() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        snapshot(vec![task("a", "A", false, None, &[])], &["a"]),
        MemoryDocument::missing(),
    );

    let outcome = h.watcher.sync_now().await.unwrap();
    let SyncOutcome::Completed(report) = outcome else {
        panic!("sync was skipped");
    };
    assert_eq!(report.direction, SyncDirection::ProjectToFile);
    assert!(report.rewrite_queued);

    h.watcher.flush().await.unwrap();
    assert_eq!(h.document.content().as_deref(), Some("- [ ] <!-- sp:a --> A"));
}

#[tokio::test(start_paused = true)]
async fn missing_document_is_an_error_when_only_reading() {
    let h = Harness::new(
        config(SyncDirection::FileToProject),
        empty_inbox(),
        MemoryDocument::missing(),
    );

    let err = h.watcher.sync_now().await.expect_err("missing document");
    assert!(matches!(err, mdsync::Error::Document(_)));
    assert!(h.document.content().is_none());
}

#[tokio::test(start_paused = true)]
async fn document_wins_in_file_to_project_mode() {
    let h = Harness::new(
        config(SyncDirection::FileToProject),
        snapshot(vec![task("a", "A", false, None, &[])], &["a"]),
        MemoryDocument::new("- [ ] <!-- sp:a --> A\n"),
    );
    h.watcher.start(true).await.unwrap();

    h.graph.edit(|graph| graph.tasks[0].is_done = true);
    h.watcher.notify_graph_changed();
    sleep(secs(11)).await;

    assert!(!h.graph.task("a").expect("task a").is_done);
    assert_eq!(h.doc(), "- [ ] <!-- sp:a --> A\n");
    assert_eq!(h.document.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn project_to_file_mode_does_not_watch_the_document() {
    let h = Harness::new(
        config(SyncDirection::ProjectToFile),
        snapshot(vec![task("a", "A", false, None, &[])], &["a"]),
        MemoryDocument::new("- [ ] <!-- sp:a --> A\n- [ ] Scratch\n"),
    );
    h.watcher.start(true).await.unwrap();
    assert_eq!(h.watcher.status(), WatcherStatus::Idle);

    h.document.edit("- [ ] <!-- sp:a --> A\n- [ ] Scratch\n- [ ] More\n");
    sleep(secs(15)).await;
    assert!(h.graph.batches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disabled_watcher_ignores_triggers() {
    let mut cfg = config(SyncDirection::Bidirectional);
    cfg.sync.enabled = false;
    let h = Harness::new(cfg, empty_inbox(), MemoryDocument::new("- [ ] One\n"));
    h.watcher.start(false).await.unwrap();

    h.watcher.notify_document_changed();
    h.watcher.notify_graph_changed();
    sleep(secs(30)).await;
    assert!(h.graph.batches().is_empty());
    assert!(h.events().is_empty());
    assert!(!h.watcher.sync_info().is_watching);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_pending_work() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        empty_inbox(),
        MemoryDocument::new(""),
    );
    h.watcher.start(true).await.unwrap();

    h.document.edit("- [ ] One\n");
    sleep(secs(1)).await;
    h.watcher.stop();
    assert_eq!(h.watcher.status(), WatcherStatus::Idle);

    sleep(secs(30)).await;
    assert!(h.graph.batches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn initial_sync_imports_the_document() {
    let h = Harness::new(
        config(SyncDirection::Bidirectional),
        empty_inbox(),
        MemoryDocument::new("- [ ] One\n  - [ ] Two\n"),
    );
    h.watcher.start(false).await.unwrap();

    assert_eq!(h.watcher.status(), WatcherStatus::Watching);
    let one = h.task_titled("One");
    let two = h.task_titled("Two");
    assert_eq!(two.parent_id.as_deref(), Some(one.id.as_str()));
    assert_eq!(one.sub_task_ids, vec![two.id.clone()]);
    match h.events().first() {
        Some(WatcherEvent::SyncCompleted(report)) => assert_eq!(report.source, SyncSource::File),
        other => panic!("unexpected first event {other:?}"),
    }
}
