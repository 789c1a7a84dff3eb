//! Command-line interface for mdsync
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is defined in its own submodule.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};
use crate::model::{collect_project_tasks, GraphSnapshot, Project, Task};

mod parse;
mod plan;
mod render;
mod verify;
mod watch;

/// mdsync - markdown checklist sync
///
/// Keeps a markdown checklist and a task graph project in sync in both
/// directions, writing task ids into the document as inline markers.
#[derive(Parser, Debug)]
#[command(name = "mdsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file (defaults to ./.mdsync.toml)
    #[arg(long, global = true, env = "MDSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write watcher events as JSON lines to a file, or "-" for stdout
    #[arg(long, global = true, env = "MDSYNC_EVENTS")]
    pub events: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a checklist document and show its tasks
    Parse {
        /// Markdown document
        file: PathBuf,

        /// Keep checklist lines at any depth as tasks
        #[arg(long)]
        outline: bool,
    },

    /// Render a project from a graph snapshot as a checklist document
    Render {
        /// Graph snapshot (JSON with `tasks` and `projects`)
        #[arg(long, short = 'g')]
        graph: PathBuf,

        /// Project id (defaults to sync.project_id)
        #[arg(long, short = 'p')]
        project: Option<String>,

        /// Write the document here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Show the batch that would bring a project in line with a document
    Plan {
        /// Markdown document
        file: PathBuf,

        /// Graph snapshot (JSON with `tasks` and `projects`)
        #[arg(long, short = 'g')]
        graph: PathBuf,

        /// Project id (defaults to sync.project_id)
        #[arg(long, short = 'p')]
        project: Option<String>,
    },

    /// Compare a document with a project and list differences
    Verify {
        /// Markdown document
        file: PathBuf,

        /// Graph snapshot (JSON with `tasks` and `projects`)
        #[arg(long, short = 'g')]
        graph: PathBuf,

        /// Project id (defaults to sync.project_id)
        #[arg(long, short = 'p')]
        project: Option<String>,
    },

    /// Keep the configured document in sync with an in-memory graph
    Watch {
        /// Seed the graph from this snapshot and follow its changes
        #[arg(long, short = 'g')]
        graph: Option<PathBuf>,

        /// Document to watch (overrides sync.file_path)
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,

        /// Run a single manual sync, flush deferred writes and exit
        #[arg(long)]
        once: bool,

        /// Write the graph back to the snapshot on exit
        #[arg(long, requires = "graph")]
        persist: bool,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Parse { file, outline } => parse::run(parse::ParseOptions {
                file,
                outline,
                json: self.json,
                quiet: self.quiet,
            }),
            Commands::Render {
                graph,
                project,
                output,
            } => render::run(render::RenderOptions {
                graph,
                project,
                output,
                config: self.config,
                json: self.json,
                quiet: self.quiet,
            }),
            Commands::Plan {
                file,
                graph,
                project,
            } => plan::run(plan::PlanOptions {
                file,
                graph,
                project,
                config: self.config,
                json: self.json,
                quiet: self.quiet,
            }),
            Commands::Verify {
                file,
                graph,
                project,
            } => verify::run(verify::VerifyOptions {
                file,
                graph,
                project,
                config: self.config,
                json: self.json,
                quiet: self.quiet,
            }),
            Commands::Watch {
                graph,
                file,
                once,
                persist,
            } => watch::run(watch::WatchOptions {
                graph,
                file,
                once,
                persist,
                events: self.events,
                config: self.config,
                json: self.json,
                quiet: self.quiet,
            }),
        }
    }
}

/// Load the config and the directory relative paths resolve against.
///
/// An explicit path must exist and validate; otherwise `./.mdsync.toml` is
/// used when present, falling back to defaults.
pub(crate) fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    match path {
        Some(path) => {
            let config = Config::load(path)?;
            let base = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            Ok((config, base))
        }
        None => {
            let cwd = std::env::current_dir()?;
            Ok((Config::load_from_dir(&cwd), cwd))
        }
    }
}

/// Load one project and its tasks from a graph snapshot.
pub(crate) fn load_project(graph: &Path, project_id: &str) -> Result<(Project, Vec<Task>)> {
    let snapshot = GraphSnapshot::load(graph)?;
    let project = snapshot
        .project(project_id)
        .cloned()
        .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))?;
    let tasks = collect_project_tasks(&project, &snapshot.tasks);
    Ok((project, tasks))
}

/// Read a document that must exist.
pub(crate) fn read_document(path: &Path) -> Result<String> {
    lock::read_locked_str(path, DEFAULT_LOCK_TIMEOUT_MS)?
        .ok_or_else(|| Error::Document(format!("{} does not exist", path.display())))
}
