//! Shared output formatting for mdsync CLI commands.
//!
//! Every command reports either a human summary or, with `--json`, one
//! envelope on stdout:
//!
//! ```text
//! { "schema_version": "mdsync.v1", "command": "plan", "status": "success", "data": { .. } }
//! { "schema_version": "mdsync.v1", "command": "plan", "status": "error", "error": { .. } }
//! ```

use serde::Serialize;

use crate::error::{exit_codes, Error, Result};

pub const SCHEMA_VERSION: &str = "mdsync.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Human-readable report: a header line followed by optional sections.
#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            summary: Vec::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: String,
    code: i32,
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody<'a>>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    next_steps: &'a [String],
}

fn print_envelope<T: Serialize>(envelope: &Envelope<'_, T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let (warnings, next_steps) = match human {
            Some(h) => (h.warnings.as_slice(), h.next_steps.as_slice()),
            None => (&[][..], &[][..]),
        };
        return print_envelope(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data: Some(data),
            error: None,
            warnings,
            next_steps,
        });
    }

    if options.quiet {
        return Ok(());
    }
    if let Some(human) = human {
        println!("{}", format_human(human));
    }
    Ok(())
}

/// Print a rendered document as is, or wrapped in the envelope with `--json`.
pub fn emit_document<T: Serialize>(
    options: OutputOptions,
    command: &str,
    document: &str,
    data: &T,
) -> Result<()> {
    if options.json {
        return emit_success(options, command, data, None);
    }
    print!("{document}");
    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let next_steps = error_next_steps(err);
    if json {
        return print_envelope::<()>(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            data: None,
            error: Some(ErrorBody {
                message: err.to_string(),
                code: err.exit_code(),
                kind: error_kind(err),
                details: err.details(),
            }),
            warnings: &[],
            next_steps: &next_steps,
        });
    }

    eprintln!("error: {err}");
    if let Some(hint) = next_steps.first() {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = vec![output.header.clone()];

    push_summary(&mut lines, &output.summary);
    push_section(&mut lines, "Details", &output.details);
    push_section(&mut lines, "Warnings", &output.warnings);
    push_section(&mut lines, "Next steps", &output.next_steps);

    lines.join("\n")
}

/// Subcommand name for error envelopes, read before clap has parsed
/// anything. Skips global flags and the values of `--config`/`--events`.
pub fn infer_command_name_from_args() -> String {
    command_name(std::env::args().skip(1))
}

fn command_name(args: impl Iterator<Item = String>) -> String {
    let mut skip_value = false;
    for arg in args {
        if skip_value {
            skip_value = false;
            continue;
        }
        if arg == "--config" || arg == "--events" {
            skip_value = true;
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        return arg;
    }
    "mdsync".to_string()
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        exit_codes::USER_ERROR => "user_error",
        _ => "operation_failed",
    }
}

fn error_next_steps(err: &Error) -> Vec<String> {
    match err {
        Error::InvalidConfig(_) => vec!["fix .mdsync.toml then retry".to_string()],
        Error::ProjectNotFound(id) => {
            vec![format!("check that project '{id}' exists in the graph snapshot")]
        }
        Error::BatchFailed(_) => {
            vec!["mdsync plan <file> --graph <snapshot> to inspect the batch".to_string()]
        }
        Error::LockFailed(path) => vec![format!("retry once {} is released", path.display())],
        _ => Vec::new(),
    }
}

fn push_summary(lines: &mut Vec<String>, summary: &[(String, String)]) {
    if summary.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push("Summary:".to_string());
    for (key, value) in summary {
        if value.is_empty() {
            lines.push(format!("- {key}"));
        } else {
            lines.push(format!("- {key}: {value}"));
        }
    }
}

fn push_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push(format!("{title}:"));
    for item in items {
        lines.push(format!("- {item}"));
    }
}
