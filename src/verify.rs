//! Read-only consistency check between a document and the task graph.
//!
//! Used after a sync cycle to confirm both sides agree, and by the
//! `verify` command. Nothing here mutates either side.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::model::Task;
use crate::parser::ParsedTask;
use crate::serializer::normalize_notes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DifferenceKind {
    MissingInMd,
    MissingInSp,
    PropertyMismatch,
    OrderMismatch,
}

impl DifferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DifferenceKind::MissingInMd => "missing-in-md",
            DifferenceKind::MissingInSp => "missing-in-sp",
            DifferenceKind::PropertyMismatch => "property-mismatch",
            DifferenceKind::OrderMismatch => "order-mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Difference {
    #[serde(rename = "type")]
    pub kind: DifferenceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncVerification {
    pub is_in_sync: bool,
    pub differences: Vec<Difference>,
}

fn diff(kind: DifferenceKind, task_id: Option<&str>, message: String) -> Difference {
    Difference {
        kind,
        task_id: task_id.map(str::to_string),
        message,
        details: None,
    }
}

/// Compare parsed document tasks with the project's graph tasks.
pub fn verify_sync_state(
    md_tasks: &[ParsedTask],
    sp_tasks: &[Task],
    root_order: &[String],
) -> SyncVerification {
    let mut differences = Vec::new();

    if md_tasks.is_empty() {
        if !sp_tasks.is_empty() {
            differences.push(diff(
                DifferenceKind::MissingInMd,
                None,
                format!("Markdown file is empty but SP has {} tasks", sp_tasks.len()),
            ));
        }
        return SyncVerification {
            is_in_sync: differences.is_empty(),
            differences,
        };
    }

    let mut md_by_id: HashMap<&str, &ParsedTask> = HashMap::new();
    for task in md_tasks {
        if let Some(id) = task.id.as_deref() {
            md_by_id.entry(id).or_insert(task);
        }
    }
    let sp_by_id: HashMap<&str, &Task> = sp_tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    for sp_task in sp_tasks {
        if !md_by_id.contains_key(sp_task.id.as_str()) {
            differences.push(diff(
                DifferenceKind::MissingInMd,
                Some(sp_task.id.as_str()),
                format!("Task \"{}\" exists in SP but not in markdown", sp_task.title),
            ));
        }
    }

    for md_task in md_tasks {
        let sp_task = md_task.id.as_deref().and_then(|id| sp_by_id.get(id));
        let Some(sp_task) = sp_task else {
            differences.push(diff(
                DifferenceKind::MissingInSp,
                md_task.id.as_deref(),
                format!("Task \"{}\" exists in markdown but not in SP", md_task.title),
            ));
            continue;
        };

        if sp_task.title != md_task.title {
            let mut d = diff(
                DifferenceKind::PropertyMismatch,
                Some(sp_task.id.as_str()),
                format!("Title mismatch for task {}", sp_task.id),
            );
            d.details = Some(json!({ "sp": sp_task.title, "md": md_task.title }));
            differences.push(d);
        }
        if sp_task.is_done != md_task.completed {
            let mut d = diff(
                DifferenceKind::PropertyMismatch,
                Some(sp_task.id.as_str()),
                format!("Completion status mismatch for task \"{}\"", sp_task.title),
            );
            d.details = Some(json!({ "sp": sp_task.is_done, "md": md_task.completed }));
            differences.push(d);
        }
        let md_notes = md_task.note_lines.join("\n");
        if normalize_notes(&md_notes) != normalize_notes(sp_task.notes_text()) {
            let mut d = diff(
                DifferenceKind::PropertyMismatch,
                Some(sp_task.id.as_str()),
                format!("Notes mismatch for task \"{}\"", sp_task.title),
            );
            d.details = Some(json!({ "sp": sp_task.notes_text(), "md": md_notes }));
            differences.push(d);
        }
        if sp_task.parent_id != md_task.parent_id {
            let mut d = diff(
                DifferenceKind::PropertyMismatch,
                Some(sp_task.id.as_str()),
                format!("Parent mismatch for task \"{}\"", sp_task.title),
            );
            d.details = Some(json!({ "sp": sp_task.parent_id, "md": md_task.parent_id }));
            differences.push(d);
        }
    }

    let sp_roots: Vec<&str> = root_order
        .iter()
        .map(String::as_str)
        .filter(|id| sp_by_id.get(id).is_some_and(|t| t.parent_id.is_none()))
        .collect();
    let md_roots: Vec<&str> = md_tasks
        .iter()
        .filter(|t| !t.is_subtask)
        .filter_map(|t| t.id.as_deref())
        .filter(|id| sp_by_id.contains_key(id))
        .collect();
    if !sp_roots.is_empty() && sp_roots.len() == md_roots.len() && sp_roots != md_roots {
        let mut d = diff(
            DifferenceKind::OrderMismatch,
            None,
            "Parent task order mismatch".to_string(),
        );
        d.details = Some(json!({ "sp": sp_roots, "md": md_roots }));
        differences.push(d);
    }

    for sp_task in sp_tasks.iter().filter(|t| !t.sub_task_ids.is_empty()) {
        let md_children: Vec<&str> = md_tasks
            .iter()
            .filter(|t| t.parent_id.as_deref() == Some(sp_task.id.as_str()))
            .filter_map(|t| t.id.as_deref())
            .filter(|id| sp_by_id.contains_key(id))
            .collect();
        let sp_children: Vec<&str> = sp_task.sub_task_ids.iter().map(String::as_str).collect();
        if sp_children.len() == md_children.len() && sp_children != md_children {
            let mut d = diff(
                DifferenceKind::OrderMismatch,
                Some(sp_task.id.as_str()),
                format!("Subtask order mismatch for task \"{}\"", sp_task.title),
            );
            d.details = Some(json!({ "sp": sp_children, "md": md_children }));
            differences.push(d);
        }
    }

    SyncVerification {
        is_in_sync: differences.is_empty(),
        differences,
    }
}

/// Report a verification through tracing.
pub fn log_sync_verification(result: &SyncVerification, context: &str) {
    if result.is_in_sync {
        info!(context, "sync verification passed");
        return;
    }
    warn!(
        context,
        differences = result.differences.len(),
        "sync verification failed"
    );
    for difference in &result.differences {
        warn!(
            kind = difference.kind.as_str(),
            task = difference.task_id.as_deref().unwrap_or(""),
            details = ?difference.details,
            "{}",
            difference.message
        );
    }
}
