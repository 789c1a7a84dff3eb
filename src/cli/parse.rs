//! mdsync parse command implementation
//!
//! Shows what the parser recovers from a document, without touching any
//! task graph.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;
use crate::model::TreeNode;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::parser::{self, ParseWarning, ParsedTask};
use crate::tree::parse_markdown_to_tree;

/// Options for the parse command
pub struct ParseOptions {
    pub file: PathBuf,
    pub outline: bool,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct ParseReport {
    file: PathBuf,
    tasks: Vec<ParsedTask>,
    warnings: Vec<ParseWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<String>,
    tree: Vec<TreeNode>,
}

pub fn run(options: ParseOptions) -> Result<()> {
    let content = super::read_document(&options.file)?;
    let parse_options = if options.outline {
        parser::ParseOptions::outline()
    } else {
        parser::ParseOptions::sync()
    };
    let parsed = parser::parse_markdown(&content, parse_options);
    let tree = parse_markdown_to_tree(&parsed.tasks);

    let with_ids = parsed.tasks.iter().filter(|t| t.id.is_some()).count();
    let done = parsed.tasks.iter().filter(|t| t.completed).count();

    let mut human = HumanOutput::new(format!(
        "mdsync parse: {} tasks in {}",
        parsed.tasks.len(),
        options.file.display()
    ));
    human.push_summary("with ids", with_ids.to_string());
    human.push_summary("done", done.to_string());
    if parsed.header.is_some() {
        human.push_summary("header", "kept");
    }
    for task in &parsed.tasks {
        let mark = if task.completed { "x" } else { " " };
        let id = task.id.as_deref().unwrap_or("new");
        human.push_detail(format!(
            "{}[{mark}] {} ({id}, line {})",
            "  ".repeat(task.depth),
            task.title,
            task.line + 1
        ));
    }
    for warning in &parsed.warnings {
        human.push_warning(warning.to_string());
    }

    let report = ParseReport {
        file: options.file,
        tasks: parsed.tasks,
        warnings: parsed.warnings,
        header: parsed.header,
        tree,
    };

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "parse",
        &report,
        Some(&human),
    )
}
