//! mdsync verify command implementation

use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::parser::{parse_markdown, ParseOptions};
use crate::verify::{verify_sync_state, SyncVerification};

/// Options for the verify command
pub struct VerifyOptions {
    pub file: PathBuf,
    pub graph: PathBuf,
    pub project: Option<String>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct VerifyReport {
    project: String,
    #[serde(flatten)]
    verification: SyncVerification,
}

pub fn run(options: VerifyOptions) -> Result<()> {
    let (config, _) = super::load_config(options.config.as_deref())?;
    let project_id = options
        .project
        .unwrap_or_else(|| config.sync.project_id.clone());
    let (project, tasks) = super::load_project(&options.graph, &project_id)?;
    let content = super::read_document(&options.file)?;

    let parsed = parse_markdown(&content, ParseOptions::sync());
    let verification = verify_sync_state(&parsed.tasks, &tasks, &project.task_ids);

    let header = if verification.is_in_sync {
        "mdsync verify: in sync".to_string()
    } else {
        format!(
            "mdsync verify: out of sync ({} differences)",
            verification.differences.len()
        )
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("project", project.id.clone());
    human.push_summary("document tasks", parsed.tasks.len().to_string());
    human.push_summary("project tasks", tasks.len().to_string());
    for difference in &verification.differences {
        human.push_detail(format!("{}: {}", difference.kind.as_str(), difference.message));
    }
    if !verification.is_in_sync {
        human.push_next_step(format!(
            "mdsync plan {} --graph {}",
            options.file.display(),
            options.graph.display()
        ));
    }

    let report = VerifyReport {
        project: project.id,
        verification,
    };

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "verify",
        &report,
        Some(&human),
    )
}
