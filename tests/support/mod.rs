#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use mdsync::model::{GraphSnapshot, Project, Task};
use tempfile::TempDir;

pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn read_file(&self, rel_path: &str) -> std::io::Result<String> {
        fs::read_to_string(self.dir.path().join(rel_path))
    }

    pub fn write_snapshot(
        &self,
        rel_path: &str,
        snapshot: &GraphSnapshot,
    ) -> std::io::Result<PathBuf> {
        let content = serde_json::to_string_pretty(snapshot).map_err(std::io::Error::other)?;
        self.write_file(rel_path, &content)
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        self.write_file(".mdsync.toml", contents)
    }
}

/// A root or child task in project `inbox`.
pub fn task(id: &str, title: &str, done: bool, parent: Option<&str>, children: &[&str]) -> Task {
    Task {
        id: id.to_string(),
        title: title.to_string(),
        is_done: done,
        parent_id: parent.map(str::to_string),
        sub_task_ids: children.iter().map(|c| c.to_string()).collect(),
        project_id: Some("inbox".to_string()),
        ..Task::default()
    }
}

/// Snapshot with one project `inbox` whose roots are `roots`.
pub fn snapshot(tasks: Vec<Task>, roots: &[&str]) -> GraphSnapshot {
    GraphSnapshot {
        tasks,
        projects: vec![Project {
            id: "inbox".to_string(),
            title: "Inbox".to_string(),
            task_ids: roots.iter().map(|r| r.to_string()).collect(),
        }],
    }
}
