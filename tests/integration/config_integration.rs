//! Integration tests for layered configuration loading

use std::fs;
use std::path::Path;

use pulse::config::{ConfigLoader, PulseConfig, ValidationError};
use tempfile::TempDir;

use crate::integration::test_utils::with_isolated_env;

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn test_layers_apply_in_precedence_order() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    write(
        &test_dir.path().join("pulse").join("config.toml"),
        r#"
[collector]
flush_interval_secs = 10
staleness_timeout_secs = 60
"#,
    );
    write(
        &workspace.path().join("config").join("config.toml"),
        r#"
[collector]
staleness_timeout_secs = 90
"#,
    );
    write(
        &workspace.path().join("config").join("production.toml"),
        r#"
[collector]
capacity_threshold = 25

[ingestion]
max_reconnect_attempts = 4
"#,
    );

    let config = with_isolated_env(&test_dir, || {
        std::env::set_var("PULSE_ENV", "production");
        ConfigLoader::load(workspace.path()).unwrap()
    });

    assert_eq!(config.collector.flush_interval_secs, 10);
    assert_eq!(config.collector.staleness_timeout_secs, 90);
    assert_eq!(config.collector.capacity_threshold, 25);
    assert_eq!(config.ingestion.max_reconnect_attempts, 4);
    assert_eq!(config.ingestion.handshake_timeout_ms, 15_000);
    assert!(config.validate().is_ok());
}

#[test]
fn test_env_file_ignored_for_other_environment() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write(
        &workspace.path().join("config").join("production.toml"),
        "[collector]\ncapacity_threshold = 25\n",
    );

    let config = with_isolated_env(&test_dir, || ConfigLoader::load(workspace.path()).unwrap());
    assert_eq!(config.collector.capacity_threshold, 10);
}

#[test]
fn test_missing_files_yield_defaults() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    let config = with_isolated_env(&test_dir, || ConfigLoader::load(workspace.path()).unwrap());
    let defaults = PulseConfig::default();
    assert_eq!(config.collector.flush_interval_secs, defaults.collector.flush_interval_secs);
    assert_eq!(config.storage.store_path, defaults.storage.store_path);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_invalid_values_are_reported_per_section() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write(
        &workspace.path().join("config").join("config.toml"),
        r#"
[collector]
flush_interval_secs = 0

[ingestion]
reconnect_base_delay_ms = 60000
reconnect_max_delay_ms = 30000

[aggregation]
default_max_heart_rate = -1.0
"#,
    );

    let config = with_isolated_env(&test_dir, || ConfigLoader::load(workspace.path()).unwrap());
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 3);
    assert!(matches!(errors[0], ValidationError::Collector(_)));
    assert!(matches!(errors[1], ValidationError::Ingestion(_)));
    assert!(matches!(errors[2], ValidationError::Aggregation(_)));
    assert!(errors[1].to_string().contains("exceeds"));
}

#[test]
fn test_malformed_workspace_file_fails_to_load() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write(
        &workspace.path().join("config").join("config.toml"),
        "[collector\nflush_interval_secs = ",
    );

    let result = with_isolated_env(&test_dir, || ConfigLoader::load(workspace.path()));
    assert!(result.is_err());
}

#[test]
fn test_explicit_file_skips_workspace_layers() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write(
        &workspace.path().join("config").join("config.toml"),
        "[collector]\nflush_interval_secs = 5\n",
    );
    let explicit = test_dir.path().join("explicit.toml");
    write(&explicit, "[collector]\ncapacity_threshold = 3\n");

    let config = with_isolated_env(&test_dir, || {
        ConfigLoader::resolve(workspace.path(), Some(&explicit)).unwrap()
    });
    assert_eq!(config.collector.capacity_threshold, 3);
    assert_eq!(config.collector.flush_interval_secs, 30);
}

#[test]
fn test_xdg_config_path_follows_environment() {
    let test_dir = TempDir::new().unwrap();
    let path = with_isolated_env(&test_dir, ConfigLoader::xdg_config_path).unwrap();
    assert_eq!(path, test_dir.path().join("pulse").join("config.toml"));
}
