//! mdsync - markdown checklist sync CLI
//!
//! Keeps a markdown checklist and a task graph project in sync in both
//! directions.

use clap::Parser;
use mdsync::cli::Cli;
use mdsync::output::{emit_error, infer_command_name_from_args};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Tracing is opt-in via `MDSYNC_LOG`, falling back to `RUST_LOG`.
/// Empty, oversized or invalid filters leave it off.
fn log_filter() -> EnvFilter {
    ["MDSYNC_LOG", "RUST_LOG"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find_map(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.len() > 4096 {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("off"))
}

fn main() {
    // stdout carries reports and `--events -`, so logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_filter())
        .init();

    let command = infer_command_name_from_args();
    let cli = Cli::parse();
    let events_on_stdout = cli.events.as_deref().is_some_and(|value| value.trim() == "-");
    let json = cli.json && !events_on_stdout;

    if let Err(err) = cli.run() {
        let _ = emit_error(&command, &err, json);
        std::process::exit(err.exit_code());
    }
}
