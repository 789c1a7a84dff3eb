//! Error types for mdsync
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, bad config, unknown project)
//! - 4: Operation failed (batch rejected, document or graph I/O)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the mdsync CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for sync operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    // Operation failures (exit code 4)
    #[error("Batch update failed: {}", .0.join(", "))]
    BatchFailed(Vec<String>),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Task graph error: {0}")]
    Graph(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::InvalidConfig(_) | Error::InvalidArgument(_) | Error::ProjectNotFound(_) => {
                exit_codes::USER_ERROR
            }

            // Operation failures
            Error::BatchFailed(_)
            | Error::Document(_)
            | Error::Graph(_)
            | Error::Watch(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for the JSON error envelope, when the variant has any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::BatchFailed(errors) => Some(serde_json::json!({ "errors": errors })),
            Error::ProjectNotFound(id) => Some(serde_json::json!({ "project_id": id })),
            _ => None,
        }
    }
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
