//! Configuration loading and management
//!
//! Handles parsing of `.mdsync.toml` configuration files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// File name looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = ".mdsync.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which document syncs with which project, and how
    #[serde(default)]
    pub sync: SyncConfig,

    /// Debounce and deferral timings
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Direction of a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncDirection {
    FileToProject,
    ProjectToFile,
    Bidirectional,
}

impl SyncDirection {
    /// Whether document edits are pulled into the graph.
    pub fn reads_document(self) -> bool {
        matches!(self, SyncDirection::FileToProject | SyncDirection::Bidirectional)
    }

    /// Whether graph changes are pushed into the document.
    pub fn writes_document(self) -> bool {
        matches!(self, SyncDirection::ProjectToFile | SyncDirection::Bidirectional)
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SyncDirection::FileToProject => "fileToProject",
            SyncDirection::ProjectToFile => "projectToFile",
            SyncDirection::Bidirectional => "bidirectional",
        };
        f.write_str(value)
    }
}

impl std::str::FromStr for SyncDirection {
    type Err = crate::error::Error;

    fn from_str(raw: &str) -> crate::error::Result<Self> {
        match raw.trim() {
            "fileToProject" => Ok(SyncDirection::FileToProject),
            "projectToFile" => Ok(SyncDirection::ProjectToFile),
            "bidirectional" => Ok(SyncDirection::Bidirectional),
            other => Err(crate::error::Error::InvalidArgument(format!(
                "invalid sync direction '{other}' (expected fileToProject|projectToFile|bidirectional)"
            ))),
        }
    }
}

/// Document/project pairing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Path of the markdown document
    #[serde(default = "default_file_path")]
    pub file_path: PathBuf,

    /// Project whose tasks mirror the document
    #[serde(default = "default_project_id")]
    pub project_id: String,

    /// Master switch for the watcher
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// fileToProject, projectToFile or bidirectional
    #[serde(default = "default_direction")]
    pub sync_direction: SyncDirection,

    /// Keep text above the first task when rewriting the document
    #[serde(default = "default_true")]
    pub preserve_header: bool,
}

fn default_file_path() -> PathBuf {
    PathBuf::from("tasks.md")
}

fn default_project_id() -> String {
    "INBOX".to_string()
}

fn default_true() -> bool {
    true
}

fn default_direction() -> SyncDirection {
    SyncDirection::Bidirectional
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            file_path: default_file_path(),
            project_id: default_project_id(),
            enabled: default_true(),
            sync_direction: default_direction(),
            preserve_header: default_true(),
        }
    }
}

/// Timer settings, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Quiet period after a document change before importing it
    #[serde(default = "default_long_delay")]
    pub file_debounce_ms: u64,

    /// Quiet period after a graph change before syncing
    #[serde(default = "default_long_delay")]
    pub graph_debounce_ms: u64,

    /// Delay before writing created ids back into the document
    #[serde(default = "default_long_delay")]
    pub id_write_delay_ms: u64,

    /// Delay before a project to file rewrite lands
    #[serde(default = "default_short_delay")]
    pub write_delay_ms: u64,

    /// Settle time after the window regains focus
    #[serde(default = "default_short_delay")]
    pub focus_settle_ms: u64,
}

fn default_long_delay() -> u64 {
    10_000
}

fn default_short_delay() -> u64 {
    2_000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            file_debounce_ms: default_long_delay(),
            graph_debounce_ms: default_long_delay(),
            id_write_delay_ms: default_long_delay(),
            write_delay_ms: default_short_delay(),
            focus_settle_ms: default_short_delay(),
        }
    }
}

impl TimingConfig {
    pub fn file_debounce(&self) -> Duration {
        Duration::from_millis(self.file_debounce_ms)
    }

    pub fn graph_debounce(&self) -> Duration {
        Duration::from_millis(self.graph_debounce_ms)
    }

    pub fn id_write_delay(&self) -> Duration {
        Duration::from_millis(self.id_write_delay_ms)
    }

    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms)
    }

    pub fn focus_settle(&self) -> Duration {
        Duration::from_millis(self.focus_settle_ms)
    }

    fn validate(&self) -> crate::error::Result<()> {
        let fields = [
            ("timing.file_debounce_ms", self.file_debounce_ms),
            ("timing.graph_debounce_ms", self.graph_debounce_ms),
            ("timing.id_write_delay_ms", self.id_write_delay_ms),
            ("timing.write_delay_ms", self.write_delay_ms),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(crate::error::Error::InvalidConfig(format!(
                    "{field} must be > 0"
                )));
            }
        }
        Ok(())
    }
}

impl SyncConfig {
    fn validate(&self) -> crate::error::Result<()> {
        if self.file_path.as_os_str().is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "sync.file_path cannot be empty".to_string(),
            ));
        }
        if self.project_id.trim().is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "sync.project_id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a `.mdsync.toml` file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Self {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the document path against the directory holding the config.
    pub fn document_path(&self, base: &Path) -> PathBuf {
        if self.sync.file_path.is_absolute() {
            self.sync.file_path.clone()
        } else {
            base.join(&self.sync.file_path)
        }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        self.sync.validate()?;
        self.timing.validate()?;
        Ok(())
    }
}
