//! mdsync - markdown checklist sync library
//!
//! Keeps a markdown checklist document and a project in a task graph in
//! sync. Each task line carries its graph id in an inline marker:
//!
//! ```text
//! - [ ] <!-- sp:01HZX3 --> Write release notes
//!   - [x] <!-- sp:01HZX4 --> Collect changes
//! ```
//!
//! # Module Organization
//!
//! - `parser`: markdown checklist to line-addressed tasks
//! - `tree`: nested task trees from either side
//! - `serializer`: task trees back to markdown
//! - `reconcile`: document vs graph diff as a batch of operations
//! - `verify`: read-only consistency check
//! - `watcher`: triggers, debouncing and deferred writes
//! - `scheduler`: keyed cancellable timers
//! - `graph`: task graph capability and in-memory graph
//! - `document`: document capability, on disk or in memory
//! - `lock`: file locking and atomic writes
//! - `model`: tasks, projects, operations and snacks
//! - `output`: human and JSON command output
//! - `config`: configuration loading from `.mdsync.toml`
//! - `events`: JSONL lifecycle events
//! - `cli`: command-line interface using clap

pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod graph;
pub mod lock;
pub mod model;
pub mod output;
pub mod parser;
pub mod reconcile;
pub mod scheduler;
pub mod serializer;
pub mod tree;
pub mod verify;
pub mod watcher;

pub use error::{Error, Result};
