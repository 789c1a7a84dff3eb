//! Task graph capability.
//!
//! The watcher never touches application state directly; it goes through a
//! [`TaskGraph`]. [`MemoryTaskGraph`] is a complete in-process graph used by
//! the CLI and the test suite.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{BatchResult, GraphSnapshot, Operation, Project, Snack, Task, TaskUpdates};

/// Callback invoked with `true` when the window gains focus.
pub type FocusCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Operations the sync core needs from the task graph.
#[async_trait]
pub trait TaskGraph: Send + Sync {
    /// All tasks across projects
    async fn get_tasks(&self) -> Result<Vec<Task>>;

    async fn get_all_projects(&self) -> Result<Vec<Project>>;

    /// Apply a batch atomically. Temp ids from creates resolve in later
    /// operations of the same batch.
    async fn batch_update_for_project(
        &self,
        project_id: &str,
        operations: Vec<Operation>,
    ) -> Result<BatchResult>;

    async fn update_task(&self, task_id: &str, updates: TaskUpdates) -> Result<()>;

    async fn show_snack(&self, snack: Snack);

    fn on_window_focus_change(&self, callback: FocusCallback);
}

#[derive(Default)]
struct GraphState {
    snapshot: GraphSnapshot,
    snacks: Vec<Snack>,
    batches: Vec<Vec<Operation>>,
    fail_next_batch: Option<Vec<String>>,
}

/// In-memory task graph.
#[derive(Default)]
pub struct MemoryTaskGraph {
    state: Mutex<GraphState>,
    focus_callbacks: Mutex<Vec<FocusCallback>>,
}

impl MemoryTaskGraph {
    pub fn new(snapshot: GraphSnapshot) -> Self {
        Self {
            state: Mutex::new(GraphState {
                snapshot,
                ..GraphState::default()
            }),
            focus_callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Graph with a single empty project.
    pub fn with_project(project_id: &str) -> Self {
        Self::new(GraphSnapshot {
            tasks: Vec::new(),
            projects: vec![Project {
                id: project_id.to_string(),
                title: project_id.to_string(),
                task_ids: Vec::new(),
            }],
        })
    }

    fn state(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.state().snapshot.clone()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.state()
            .snapshot
            .tasks
            .iter()
            .find(|task| task.id == task_id)
            .cloned()
    }

    pub fn project(&self, project_id: &str) -> Option<Project> {
        self.state().snapshot.project(project_id).cloned()
    }

    /// Snacks shown so far.
    pub fn snacks(&self) -> Vec<Snack> {
        self.state().snacks.clone()
    }

    /// Batches applied so far, successful or not.
    pub fn batches(&self) -> Vec<Vec<Operation>> {
        self.state().batches.clone()
    }

    /// Make the next batch fail with the given errors.
    pub fn fail_next_batch(&self, errors: Vec<String>) {
        self.state().fail_next_batch = Some(errors);
    }

    /// Mutate the graph directly, as another client would.
    pub fn edit<R>(&self, f: impl FnOnce(&mut GraphSnapshot) -> R) -> R {
        f(&mut self.state().snapshot)
    }

    /// Report a window focus change to registered callbacks.
    pub fn set_focus(&self, focused: bool) {
        let callbacks = self
            .focus_callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for callback in callbacks.iter() {
            callback(focused);
        }
    }
}

#[async_trait]
impl TaskGraph for MemoryTaskGraph {
    async fn get_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.state().snapshot.tasks.clone())
    }

    async fn get_all_projects(&self) -> Result<Vec<Project>> {
        Ok(self.state().snapshot.projects.clone())
    }

    async fn batch_update_for_project(
        &self,
        project_id: &str,
        operations: Vec<Operation>,
    ) -> Result<BatchResult> {
        let mut state = self.state();
        state.batches.push(operations.clone());

        if let Some(errors) = state.fail_next_batch.take() {
            return Ok(BatchResult {
                success: false,
                created_task_ids: HashMap::new(),
                errors,
            });
        }
        if state.snapshot.project(project_id).is_none() {
            return Err(Error::ProjectNotFound(project_id.to_string()));
        }

        // applied to a copy so a failing batch leaves the graph untouched
        let mut working = state.snapshot.clone();
        let mut applier = BatchApplier {
            graph: &mut working,
            project_id,
            created: HashMap::new(),
            created_roots: Vec::new(),
        };
        for op in &operations {
            if let Err(message) = applier.apply(op) {
                debug!(%message, "batch rejected");
                return Ok(BatchResult {
                    success: false,
                    created_task_ids: HashMap::new(),
                    errors: vec![message],
                });
            }
        }
        let created = applier.created;
        state.snapshot = working;
        info!(project = project_id, operations = operations.len(), "batch applied");

        Ok(BatchResult {
            success: true,
            created_task_ids: created,
            errors: Vec::new(),
        })
    }

    async fn update_task(&self, task_id: &str, updates: TaskUpdates) -> Result<()> {
        let mut state = self.state();
        let project_id = state
            .snapshot
            .tasks
            .iter()
            .find(|task| task.id == task_id)
            .and_then(|task| task.project_id.clone())
            .unwrap_or_default();
        let mut applier = BatchApplier {
            graph: &mut state.snapshot,
            project_id: &project_id,
            created: HashMap::new(),
            created_roots: Vec::new(),
        };
        applier
            .update(task_id, &updates)
            .map_err(Error::Graph)
    }

    async fn show_snack(&self, snack: Snack) {
        info!(kind = ?snack.kind, "{}", snack.msg);
        self.state().snacks.push(snack);
    }

    fn on_window_focus_change(&self, callback: FocusCallback) {
        self.focus_callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(callback);
    }
}

struct BatchApplier<'a> {
    graph: &'a mut GraphSnapshot,
    project_id: &'a str,
    /// temp id -> real id
    created: HashMap<String, String>,
    /// roots created in this batch with the sibling they follow
    created_roots: Vec<(String, Option<String>)>,
}

type ApplyResult = std::result::Result<(), String>;

/// Insert `id` right after `after`, first when there is no anchor, last
/// when the anchor is not in `list`.
fn insert_after(list: &mut Vec<String>, after: Option<&str>, id: String) {
    let at = match after {
        None => 0,
        Some(after) => list
            .iter()
            .position(|existing| existing == after)
            .map_or(list.len(), |idx| idx + 1),
    };
    list.insert(at, id);
}

impl BatchApplier<'_> {
    fn resolve(&self, id: &str) -> String {
        self.created.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    fn position(&self, task_id: &str) -> Option<usize> {
        self.graph.tasks.iter().position(|task| task.id == task_id)
    }

    fn project_mut(&mut self) -> Option<&mut Project> {
        let project_id = self.project_id;
        self.graph.projects.iter_mut().find(|p| p.id == project_id)
    }

    fn apply(&mut self, op: &Operation) -> ApplyResult {
        match op {
            Operation::Create { temp_id, data } => {
                let id = ulid::Ulid::new().to_string();
                let parent_id = data.parent_id.as_deref().map(|p| self.resolve(p));
                let after = data.after_id.as_deref().map(|a| self.resolve(a));
                if let Some(parent) = parent_id.as_deref() {
                    let idx = self
                        .position(parent)
                        .ok_or_else(|| format!("parent {parent} not found"))?;
                    let siblings = &mut self.graph.tasks[idx].sub_task_ids;
                    insert_after(siblings, after.as_deref(), id.clone());
                } else {
                    if let Some(project) = self.project_mut() {
                        insert_after(&mut project.task_ids, after.as_deref(), id.clone());
                    }
                    self.created_roots.push((id.clone(), after));
                }
                self.graph.tasks.push(Task {
                    id: id.clone(),
                    title: data.title.clone(),
                    is_done: data.is_done,
                    notes: data.notes.clone().filter(|n| !n.is_empty()),
                    parent_id,
                    project_id: Some(self.project_id.to_string()),
                    ..Task::default()
                });
                self.created.insert(temp_id.clone(), id);
                Ok(())
            }
            Operation::Update { task_id, updates } => {
                let task_id = self.resolve(task_id);
                self.update(&task_id, updates)
            }
            Operation::Delete { task_id } => {
                let task_id = self.resolve(task_id);
                self.delete(&task_id);
                Ok(())
            }
            Operation::Reorder { task_ids } => {
                let ordered: Vec<String> = task_ids.iter().map(|id| self.resolve(id)).collect();
                let created_roots = self.created_roots.clone();
                let Some(project) = self.project_mut() else {
                    return Err("project not found".to_string());
                };
                let created: HashSet<&String> = created_roots.iter().map(|(id, _)| id).collect();
                let listed: HashSet<&String> = ordered.iter().collect();
                let rest: Vec<String> = project
                    .task_ids
                    .iter()
                    .filter(|id| !listed.contains(id) && !created.contains(id))
                    .cloned()
                    .collect();
                let mut order: Vec<String> = ordered.iter().cloned().chain(rest).collect();
                // roots created earlier in the batch keep their anchors
                for (id, after) in &created_roots {
                    if project.task_ids.contains(id) {
                        insert_after(&mut order, after.as_deref(), id.clone());
                    }
                }
                project.task_ids = order;
                Ok(())
            }
        }
    }

    fn update(&mut self, task_id: &str, updates: &TaskUpdates) -> ApplyResult {
        let idx = self
            .position(task_id)
            .ok_or_else(|| format!("task {task_id} not found"))?;

        if let Some(new_parent) = &updates.parent_id {
            let new_parent = new_parent.as_deref().map(|p| self.resolve(p));
            if new_parent.is_some() {
                if let Some(kind) = self.graph.tasks[idx].root_restriction() {
                    return Err(format!("{kind} must remain as parent tasks"));
                }
            }
            if new_parent.as_deref() == Some(task_id) {
                return Err(format!("task {task_id} cannot be its own parent"));
            }
            self.detach(task_id);
            match new_parent.as_deref() {
                Some(parent) => {
                    let parent_idx = self
                        .position(parent)
                        .ok_or_else(|| format!("parent {parent} not found"))?;
                    self.graph.tasks[parent_idx].sub_task_ids.push(task_id.to_string());
                }
                None => {
                    if let Some(project) = self.project_mut() {
                        project.task_ids.push(task_id.to_string());
                    }
                }
            }
            self.graph.tasks[idx].parent_id = new_parent;
        }

        let children: Option<Vec<String>> = updates
            .sub_task_ids
            .as_ref()
            .map(|ids| ids.iter().map(|id| self.resolve(id)).collect());

        let task = &mut self.graph.tasks[idx];
        if let Some(title) = &updates.title {
            task.title = title.clone();
        }
        if let Some(is_done) = updates.is_done {
            task.is_done = is_done;
        }
        if let Some(notes) = &updates.notes {
            task.notes = Some(notes.clone()).filter(|n| !n.is_empty());
        }
        if let Some(children) = children {
            task.sub_task_ids = children;
        }
        Ok(())
    }

    /// Remove a task from its parent's children and from project roots.
    fn detach(&mut self, task_id: &str) {
        for task in &mut self.graph.tasks {
            task.sub_task_ids.retain(|id| id != task_id);
        }
        for project in &mut self.graph.projects {
            project.task_ids.retain(|id| id != task_id);
        }
    }

    /// Delete a task and its subtasks. Unknown ids are ignored since a
    /// parent delete already removes its children.
    fn delete(&mut self, task_id: &str) {
        let Some(idx) = self.position(task_id) else {
            return;
        };
        let children = self.graph.tasks[idx].sub_task_ids.clone();
        for child in children {
            self.delete(&child);
        }
        self.detach(task_id);
        self.graph.tasks.retain(|task| task.id != task_id);
    }
}
