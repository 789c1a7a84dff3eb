use std::fs;
use std::path::PathBuf;

use mdsync::config::{Config, SyncDirection, CONFIG_FILE_NAME};

#[test]
fn config_defaults_when_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config::load_from_dir(dir.path());

    assert_eq!(config.sync.file_path, PathBuf::from("tasks.md"));
    assert_eq!(config.sync.project_id, "INBOX");
    assert!(config.sync.enabled);
    assert_eq!(config.sync.sync_direction, SyncDirection::Bidirectional);
    assert_eq!(config.timing.write_delay_ms, 2_000);
}

#[test]
fn config_overrides_from_toml() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let toml = r#"
[sync]
file_path = "/srv/notes/todo.md"
project_id = "work"
sync_direction = "fileToProject"

[timing]
id_write_delay_ms = 1500
"#;
    fs::write(dir.path().join(CONFIG_FILE_NAME), toml)?;

    let config = Config::load_from_dir(dir.path());

    assert_eq!(config.sync.project_id, "work");
    assert_eq!(config.sync.sync_direction, SyncDirection::FileToProject);
    assert!(config.sync.sync_direction.reads_document());
    assert!(!config.sync.sync_direction.writes_document());
    assert_eq!(config.timing.id_write_delay_ms, 1500);
    assert_eq!(config.timing.file_debounce_ms, 10_000);
    assert_eq!(
        config.document_path(dir.path()),
        PathBuf::from("/srv/notes/todo.md")
    );

    Ok(())
}

#[test]
fn load_from_dir_defaults_on_invalid_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join(CONFIG_FILE_NAME), "[sync]\nproject_id = 123").expect("write config");

    let config = Config::load_from_dir(dir.path());
    assert_eq!(config.sync.project_id, "INBOX");
}

#[test]
fn config_load_rejects_invalid_toml() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "this = [not valid").expect("write config");

    assert!(Config::load(&path).is_err());
}

#[test]
fn config_load_rejects_zero_delays() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "[timing]\nwrite_delay_ms = 0\n").expect("write config");

    let err = Config::load(&path).expect_err("zero delay");
    assert!(err.to_string().contains("timing.write_delay_ms must be > 0"));
}

#[test]
fn direction_parses_from_flag_values() {
    assert_eq!("projectToFile".parse::<SyncDirection>().unwrap(), SyncDirection::ProjectToFile);
    assert!("sideways".parse::<SyncDirection>().is_err());
    assert_eq!(SyncDirection::Bidirectional.to_string(), "bidirectional");
}
