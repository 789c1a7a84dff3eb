//! mdsync plan command implementation
//!
//! Dry run of a file to project cycle: prints the batch the watcher would
//! apply, without applying it.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;
use crate::model::Operation;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::parser::{parse_markdown, ParseOptions, ParseWarning};
use crate::reconcile::{reconcile, OperationCounts};

/// Options for the plan command
pub struct PlanOptions {
    pub file: PathBuf,
    pub graph: PathBuf,
    pub project: Option<String>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct PlanReport {
    project: String,
    operations: Vec<Operation>,
    counts: OperationCounts,
    warnings: Vec<String>,
    parse_warnings: Vec<ParseWarning>,
}

fn describe_operation(op: &Operation) -> String {
    match op {
        Operation::Create { temp_id, data } => {
            let mut line = format!("create {temp_id} \"{}\"", data.title);
            if let Some(parent) = &data.parent_id {
                line.push_str(&format!(" under {parent}"));
            }
            if let Some(after) = &data.after_id {
                line.push_str(&format!(" after {after}"));
            }
            line
        }
        Operation::Update { task_id, updates } => {
            let mut fields = Vec::new();
            if let Some(title) = &updates.title {
                fields.push(format!("title \"{title}\""));
            }
            if let Some(done) = updates.is_done {
                fields.push(if done { "done" } else { "not done" }.to_string());
            }
            if updates.notes.is_some() {
                fields.push("notes".to_string());
            }
            match &updates.parent_id {
                Some(Some(parent)) => fields.push(format!("parent {parent}")),
                Some(None) => fields.push("moved to root".to_string()),
                None => {}
            }
            if updates.sub_task_ids.is_some() {
                fields.push("subtask order".to_string());
            }
            format!("update {task_id}: {}", fields.join(", "))
        }
        Operation::Delete { task_id } => format!("delete {task_id}"),
        Operation::Reorder { task_ids } => format!("reorder {}", task_ids.join(", ")),
    }
}

pub fn run(options: PlanOptions) -> Result<()> {
    let (config, _) = super::load_config(options.config.as_deref())?;
    let project_id = options
        .project
        .unwrap_or_else(|| config.sync.project_id.clone());
    let (project, tasks) = super::load_project(&options.graph, &project_id)?;
    let content = super::read_document(&options.file)?;

    let parsed = parse_markdown(&content, ParseOptions::sync());
    let reconciliation = reconcile(&parsed.tasks, &tasks, &project.task_ids);
    let counts = reconciliation.counts();

    let header = match counts.describe() {
        Some(summary) => format!("mdsync plan: {summary}"),
        None => "mdsync plan: already up to date".to_string(),
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("project", project.id.clone());
    human.push_summary("operations", reconciliation.operations.len().to_string());
    for op in &reconciliation.operations {
        human.push_detail(describe_operation(op));
    }
    for warning in &parsed.warnings {
        human.push_warning(warning.to_string());
    }
    for warning in &reconciliation.warnings {
        human.push_warning(warning.clone());
    }
    if !reconciliation.is_empty() {
        human.push_next_step(format!(
            "mdsync watch --once --graph {} --file {}",
            options.graph.display(),
            options.file.display()
        ));
    }

    let report = PlanReport {
        project: project.id,
        operations: reconciliation.operations,
        counts,
        warnings: reconciliation.warnings,
        parse_warnings: parsed.warnings,
    };

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "plan",
        &report,
        Some(&human),
    )
}
