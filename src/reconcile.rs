//! Document to graph reconciliation.
//!
//! Diffs parsed document tasks against the project's graph tasks and
//! produces one ordered batch: creates and updates in document order, then
//! deletes, then at most one root reorder. New tasks get batch-local temp
//! ids (`temp_0`, `temp_1`, ...) that later operations in the same batch may
//! reference as parents.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{NewTaskData, Operation, Task, TaskUpdates};
use crate::parser::ParsedTask;
use crate::serializer::normalize_notes;

/// Id prefix written by older releases that never existed in the graph.
pub const LEGACY_ID_PREFIX: &str = "md-";

/// A batch ready to apply plus everything the caller needs afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub operations: Vec<Operation>,
    pub warnings: Vec<String>,
    /// Source line of each created task, by temp id
    pub created_lines: HashMap<String, usize>,
    /// Orphans carrying an id from older releases
    pub legacy_ids: usize,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn counts(&self) -> OperationCounts {
        OperationCounts::from_operations(&self.operations)
    }
}

/// Per-kind tally of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub reordered: bool,
}

impl OperationCounts {
    pub fn from_operations(operations: &[Operation]) -> Self {
        let mut counts = Self::default();
        for op in operations {
            match op {
                Operation::Create { .. } => counts.created += 1,
                Operation::Update { .. } => counts.updated += 1,
                Operation::Delete { .. } => counts.deleted += 1,
                Operation::Reorder { .. } => counts.reordered = true,
            }
        }
        counts
    }

    /// Human summary such as `2 tasks imported, task order updated`.
    pub fn describe(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.created > 0 {
            parts.push(format!("{} imported", plural(self.created, "task")));
        }
        if self.updated > 0 {
            parts.push(format!("{} updated", plural(self.updated, "task")));
        }
        if self.deleted > 0 {
            parts.push(format!("{} removed", plural(self.deleted, "task")));
        }
        if self.reordered {
            parts.push("task order updated".to_string());
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

pub(crate) fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Assigns batch references and maps document parents onto them.
struct ParentResolver<'a> {
    tasks: &'a [ParsedTask],
    graph: &'a HashMap<&'a str, &'a Task>,
    /// line -> graph id or temp id
    refs_by_line: HashMap<usize, String>,
    /// orphaned document id -> temp id
    temp_by_id: HashMap<String, String>,
    next_temp: usize,
}

impl<'a> ParentResolver<'a> {
    fn new(tasks: &'a [ParsedTask], graph: &'a HashMap<&'a str, &'a Task>) -> Self {
        Self {
            tasks,
            graph,
            refs_by_line: HashMap::new(),
            temp_by_id: HashMap::new(),
            next_temp: 0,
        }
    }

    fn next_temp_id(&mut self) -> String {
        let id = format!("temp_{}", self.next_temp);
        self.next_temp += 1;
        id
    }

    fn assign(&mut self, line: usize, reference: String) {
        self.refs_by_line.insert(line, reference);
    }

    /// Parent reference for the task at `idx`: graph id, then orphan temp
    /// id, then the nearest earlier lower-indent task with a reference.
    fn resolve(&self, idx: usize) -> Option<String> {
        let task = &self.tasks[idx];
        if !task.is_subtask {
            return None;
        }

        if let Some(parent_id) = task.parent_id.as_deref() {
            if let Some(parent) = self.graph.get(parent_id) {
                return Some(parent.id.clone());
            }
            if let Some(temp) = self.temp_by_id.get(parent_id) {
                return Some(temp.clone());
            }
        }

        self.tasks[..idx]
            .iter()
            .rev()
            .filter(|candidate| candidate.indent < task.indent)
            .find_map(|candidate| self.refs_by_line.get(&candidate.line).cloned())
    }
}

/// Ids that appear more than once, in order of first appearance.
fn duplicate_ids(md_tasks: &[ParsedTask]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for task in md_tasks {
        if let Some(id) = task.original_id.as_deref().or(task.id.as_deref()) {
            let count = counts.entry(id).or_insert(0);
            if *count == 0 {
                order.push(id);
            }
            *count += 1;
        }
    }
    order
        .into_iter()
        .filter(|id| counts.get(id).copied().unwrap_or(0) > 1)
        .map(str::to_string)
        .collect()
}

/// Identity of each document task after duplicate handling: only the first
/// occurrence of an id keeps it.
fn effective_ids(md_tasks: &[ParsedTask]) -> Vec<Option<String>> {
    let mut seen: HashSet<&str> = HashSet::new();
    md_tasks
        .iter()
        .map(|task| {
            let id = task.original_id.as_deref().or(task.id.as_deref())?;
            if seen.insert(id) {
                Some(id.to_string())
            } else {
                None
            }
        })
        .collect()
}

fn joined_notes(task: &ParsedTask) -> String {
    task.note_lines.join("\n")
}

/// Diff the document against the project's graph tasks.
///
/// `root_order` is the project's current root task order.
pub fn reconcile(
    md_tasks: &[ParsedTask],
    sp_tasks: &[Task],
    root_order: &[String],
) -> Reconciliation {
    let mut result = Reconciliation::default();

    let duplicates = duplicate_ids(md_tasks);
    if !duplicates.is_empty() {
        warn!(ids = ?duplicates, "duplicate task ids in document");
        result.warnings.push(format!(
            "Found duplicate task IDs: {}. These tasks will be treated as new tasks.",
            duplicates.join(", ")
        ));
    }

    let ids = effective_ids(md_tasks);
    let graph: HashMap<&str, &Task> = sp_tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let matched = |idx: usize| ids[idx].as_deref().and_then(|id| graph.get(id).copied());

    // document children of each matched parent line
    let mut doc_children: HashMap<usize, Vec<String>> = HashMap::new();
    for (idx, task) in md_tasks.iter().enumerate() {
        if let (Some(parent_line), Some(existing)) = (task.parent_line, matched(idx)) {
            doc_children
                .entry(parent_line)
                .or_default()
                .push(existing.id.clone());
        }
    }

    let mut resolver = ParentResolver::new(md_tasks, &graph);
    // parent reference -> reference of its latest child in document order
    let mut last_child: HashMap<Option<String>, String> = HashMap::new();

    for (idx, md_task) in md_tasks.iter().enumerate() {
        if let Some(existing) = matched(idx) {
            resolver.assign(md_task.line, existing.id.clone());
            let mut updates = TaskUpdates::default();

            if existing.title != md_task.title {
                updates.title = Some(md_task.title.clone());
            }
            if existing.is_done != md_task.completed {
                updates.is_done = Some(md_task.completed);
            }
            let md_notes = joined_notes(md_task);
            if normalize_notes(&md_notes) != normalize_notes(existing.notes_text()) {
                updates.notes = Some(md_notes);
            }

            let desired_parent = resolver.resolve(idx);
            let mut parent_after = desired_parent.clone();
            if desired_parent != existing.parent_id {
                match (existing.root_restriction(), desired_parent) {
                    (Some(kind), Some(_)) => {
                        warn!(task = %existing.id, "refusing to nest restricted task");
                        result.warnings.push(format!(
                            "Cannot convert \"{}\" to subtask - {kind} must remain as parent tasks",
                            existing.title
                        ));
                        parent_after = existing.parent_id.clone();
                    }
                    (_, parent) => updates.parent_id = Some(parent),
                }
            }
            last_child.insert(parent_after, existing.id.clone());

            if let Some(children) = doc_children.get(&md_task.line) {
                let current: HashSet<&String> = existing.sub_task_ids.iter().collect();
                let proposed: HashSet<&String> = children.iter().collect();
                if current == proposed && existing.sub_task_ids != *children {
                    updates.sub_task_ids = Some(children.clone());
                }
            }

            if !updates.is_empty() {
                debug!(task = %existing.id, "task changed in document");
                result.operations.push(Operation::Update {
                    task_id: existing.id.clone(),
                    updates,
                });
            }
            continue;
        }

        let temp_id = resolver.next_temp_id();
        if let Some(orphan) = ids[idx].as_deref() {
            warn!(id = orphan, title = %md_task.title, "orphaned task id, creating new task");
            if orphan.starts_with(LEGACY_ID_PREFIX) {
                result.legacy_ids += 1;
            }
            resolver.temp_by_id.insert(orphan.to_string(), temp_id.clone());
        }
        let parent_id = resolver.resolve(idx);
        resolver.assign(md_task.line, temp_id.clone());
        let after_id = last_child.insert(parent_id.clone(), temp_id.clone());

        let notes = Some(joined_notes(md_task)).filter(|notes| !notes.is_empty());
        result.created_lines.insert(temp_id.clone(), md_task.line);
        result.operations.push(Operation::Create {
            temp_id,
            data: NewTaskData {
                title: md_task.title.clone(),
                is_done: md_task.completed,
                notes,
                parent_id,
                after_id,
            },
        });
    }

    let present: HashSet<&str> = ids.iter().flatten().map(String::as_str).collect();
    for task in sp_tasks {
        if !present.contains(task.id.as_str()) {
            result.operations.push(Operation::Delete {
                task_id: task.id.clone(),
            });
        }
    }

    let doc_roots: Vec<String> = md_tasks
        .iter()
        .enumerate()
        .filter(|(_, task)| !task.is_subtask)
        .filter_map(|(idx, _)| matched(idx).map(|t| t.id.clone()))
        .collect();
    // roots this batch deletes take no part in the comparison
    let current_roots: Vec<&String> = root_order
        .iter()
        .filter(|id| graph.contains_key(id.as_str()) && present.contains(id.as_str()))
        .collect();
    let doc_set: HashSet<&String> = doc_roots.iter().collect();
    let current_set: HashSet<&String> = current_roots.iter().copied().collect();
    let same_sequence = doc_roots.iter().eq(current_roots.iter().copied());
    if !doc_roots.is_empty() && doc_set == current_set && !same_sequence {
        debug!(order = ?doc_roots, "root order changed");
        result.operations.push(Operation::Reorder { task_ids: doc_roots });
    }

    if result.legacy_ids > 0 {
        result.warnings.push(format!(
            "Found {} with old markdown IDs. Remove the <!-- sp:md-xxx --> comments from markdown to sync these tasks.",
            plural(result.legacy_ids, "task")
        ));
    }

    result
}
