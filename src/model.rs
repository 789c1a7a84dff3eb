//! Shared data model: graph tasks, projects, tree nodes and batch operations.
//!
//! Graph-facing types serialize in camelCase so snapshots and operation
//! batches match the task graph's own JSON shape.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;

/// A task as stored in the task graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub is_done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub sub_task_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_cfg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl Task {
    /// Why this task may never become a subtask, if it is restricted.
    pub fn root_restriction(&self) -> Option<&'static str> {
        if self.repeat_cfg_id.is_some() {
            Some("repeating tasks")
        } else if self.issue_id.is_some() {
            Some("issue-linked tasks")
        } else {
            None
        }
    }

    /// Notes with an empty string treated as absent.
    pub fn notes_text(&self) -> &str {
        self.notes.as_deref().unwrap_or("")
    }
}

/// A project and its ordered root tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub task_ids: Vec<String>,
}

/// A node of the nested task tree shared by both sides of a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub is_done: bool,
    pub children: Vec<TreeNode>,
    pub level: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Payload of a task to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTaskData {
    pub title: String,
    pub is_done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Sibling (graph id or temp id) the task goes right after. `None`
    /// places it first among its siblings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_id: Option<String>,
}

/// Field changes for an existing task. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// `Some(None)` moves the task to the root.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub parent_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_task_ids: Option<Vec<String>>,
}

impl TaskUpdates {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.is_done.is_none()
            && self.notes.is_none()
            && self.parent_id.is_none()
            && self.sub_task_ids.is_none()
    }
}

/// Distinguishes an explicit `null` from a missing field.
fn deserialize_present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// One step of a batch applied to the task graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    Create { temp_id: String, data: NewTaskData },
    Update { task_id: String, updates: TaskUpdates },
    Delete { task_id: String },
    Reorder { task_ids: Vec<String> },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
            Operation::Reorder { .. } => "reorder",
        }
    }
}

/// Outcome of a batch update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub success: bool,
    #[serde(default)]
    pub created_task_ids: HashMap<String, String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnackType {
    Success,
    Info,
    Warning,
    Error,
}

/// A short user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snack {
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: SnackType,
}

impl Snack {
    pub fn new(kind: SnackType, msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            kind,
        }
    }
}

/// Full dump of a task graph, used to seed the in-memory graph and the
/// offline CLI commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl GraphSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn project(&self, project_id: &str) -> Option<&Project> {
        self.projects.iter().find(|project| project.id == project_id)
    }
}

/// Collect the tasks that belong to a project.
///
/// Roots come from the project's `task_ids` in order, followed by their
/// descendants through `sub_task_ids`. Children that only point at a
/// collected parent through `parent_id` are picked up as well.
pub fn collect_project_tasks(project: &Project, all_tasks: &[Task]) -> Vec<Task> {
    let by_id: HashMap<&str, &Task> = all_tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut collected: Vec<Task> = Vec::new();
    let mut queue: Vec<&str> = Vec::new();

    for root_id in &project.task_ids {
        if let Some(task) = by_id.get(root_id.as_str()) {
            if seen.insert(task.id.as_str()) {
                collected.push((*task).clone());
                queue.push(task.id.as_str());
            }
        }
    }

    while let Some(parent_id) = queue.pop() {
        let Some(parent) = by_id.get(parent_id) else {
            continue;
        };
        let listed = parent.sub_task_ids.iter().map(String::as_str);
        let pointing = all_tasks
            .iter()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .map(|t| t.id.as_str());
        for child_id in listed.chain(pointing) {
            if let Some(child) = by_id.get(child_id) {
                if seen.insert(child.id.as_str()) {
                    collected.push((*child).clone());
                    queue.push(child.id.as_str());
                }
            }
        }
    }

    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, parent: Option<&str>, subs: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_uppercase(),
            parent_id: parent.map(str::to_string),
            sub_task_ids: subs.iter().map(|s| s.to_string()).collect(),
            ..Task::default()
        }
    }

    #[test]
    fn operation_serializes_with_type_tag() {
        let op = Operation::Update {
            task_id: "t1".to_string(),
            updates: TaskUpdates {
                parent_id: Some(None),
                ..TaskUpdates::default()
            },
        };
        let value = serde_json::to_value(&op).expect("serialize");
        assert_eq!(value["type"], "update");
        assert_eq!(value["taskId"], "t1");
        assert!(value["updates"]["parentId"].is_null());
        assert!(value["updates"].get("title").is_none());
    }

    #[test]
    fn explicit_null_parent_survives_deserialize() {
        let updates: TaskUpdates =
            serde_json::from_str(r#"{"parentId": null}"#).expect("deserialize");
        assert_eq!(updates.parent_id, Some(None));

        let updates: TaskUpdates = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(updates.parent_id, None);
        assert!(updates.is_empty());
    }

    #[test]
    fn restriction_prefers_repeat_config() {
        let mut t = task("a", None, &[]);
        assert_eq!(t.root_restriction(), None);
        t.issue_id = Some("gh-1".to_string());
        assert_eq!(t.root_restriction(), Some("issue-linked tasks"));
        t.repeat_cfg_id = Some("r".to_string());
        assert_eq!(t.root_restriction(), Some("repeating tasks"));
    }

    #[test]
    fn collect_project_tasks_follows_children() {
        let all = vec![
            task("a", None, &["a1"]),
            task("a1", Some("a"), &[]),
            task("a2", Some("a"), &[]),
            task("b", None, &[]),
            task("other", None, &[]),
        ];
        let project = Project {
            id: "p".to_string(),
            title: "P".to_string(),
            task_ids: vec!["a".to_string(), "b".to_string(), "missing".to_string()],
        };

        let ids: Vec<String> = collect_project_tasks(&project, &all)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids.len(), 4);
        assert!(ids.contains(&"a1".to_string()));
        assert!(ids.contains(&"a2".to_string()));
        assert!(!ids.contains(&"other".to_string()));
    }
}
