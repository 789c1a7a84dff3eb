//! mdsync render command implementation

use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};
use crate::output::{emit_document, emit_success, HumanOutput, OutputOptions};
use crate::parser::{parse_markdown, ParseOptions};
use crate::serializer::render_project_document;

/// Options for the render command
pub struct RenderOptions {
    pub graph: PathBuf,
    pub project: Option<String>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct RenderReport {
    project: String,
    tasks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    written: bool,
    document: String,
}

pub fn run(options: RenderOptions) -> Result<()> {
    let (config, _) = super::load_config(options.config.as_deref())?;
    let project_id = options
        .project
        .unwrap_or_else(|| config.sync.project_id.clone());
    let (project, tasks) = super::load_project(&options.graph, &project_id)?;

    let existing = match &options.output {
        Some(path) => lock::read_locked_str(path, DEFAULT_LOCK_TIMEOUT_MS)?,
        None => None,
    };
    let header = if config.sync.preserve_header {
        existing
            .as_deref()
            .and_then(|text| parse_markdown(text, ParseOptions::sync()).header)
    } else {
        None
    };
    let mut document = render_project_document(&tasks, &project.task_ids, header.as_deref());
    if !document.is_empty() && !document.ends_with('\n') {
        document.push('\n');
    }

    let output_options = OutputOptions {
        json: options.json,
        quiet: options.quiet,
    };
    let Some(path) = options.output else {
        let report = RenderReport {
            project: project.id,
            tasks: tasks.len(),
            output: None,
            written: false,
            document: document.clone(),
        };
        return emit_document(output_options, "render", &document, &report);
    };

    let written = existing.as_deref() != Some(document.as_str());
    if written {
        lock::write_atomic_locked(&path, document.as_bytes(), DEFAULT_LOCK_TIMEOUT_MS)?;
    }

    let header = if written {
        format!("mdsync render: wrote {}", path.display())
    } else {
        format!("mdsync render: {} already up to date", path.display())
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("project", project.id.clone());
    human.push_summary("tasks", tasks.len().to_string());

    let report = RenderReport {
        project: project.id,
        tasks: tasks.len(),
        output: Some(path),
        written,
        document,
    };
    emit_success(
        output_options,
        "render",
        &report,
        Some(&human),
    )
}
