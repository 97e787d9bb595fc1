//! Integration tests for CLI command routing

use std::fs;
use std::path::PathBuf;

use pulse::cli::{Commands, RunContext};
use pulse::config::PulseConfig;
use pulse::error::PipelineError;
use serde_json::Value;
use tempfile::TempDir;

use crate::integration::test_utils::{metric_frame, status_frame, with_isolated_env};

const EXERCISE_FRAME: &str = r#"{"event":"exercise:progress","sessionId":"s1","progress":{"playerId":"p1","exerciseId":"squat","exerciseName":"Back squat","currentSet":1,"reps":8,"weight":60.0,"completed":true}}"#;

fn write_events(dir: &TempDir) -> PathBuf {
    let lines = [
        metric_frame("s1", "p1", "2026-03-02T17:30:00Z", 120.0),
        metric_frame("s1", "p1", "2026-03-02T17:32:00Z", 150.0),
        metric_frame("s1", "p2", "2026-03-02T17:30:00Z", 135.0),
        EXERCISE_FRAME.to_string(),
        "{\"event\":\"metrics:update\"".to_string(),
        String::new(),
        status_frame("s1", "completed"),
        metric_frame("s2", "p1", "2026-03-02T18:00:00Z", 110.0),
    ];
    let path = dir.path().join("events.jsonl");
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn context(workspace: &TempDir) -> RunContext {
    RunContext::from_config(workspace.path().to_path_buf(), PulseConfig::default())
}

fn replay(file: PathBuf, format: &str) -> Commands {
    Commands::Replay {
        file,
        format: format.to_string(),
    }
}

fn records(session: &str, level: &str, format: &str) -> Commands {
    Commands::Records {
        session: session.to_string(),
        level: level.to_string(),
        format: format.to_string(),
    }
}

#[tokio::test]
async fn test_replay_reports_counts_as_json() {
    let workspace = TempDir::new().unwrap();
    let file = write_events(&workspace);
    let ctx = context(&workspace);

    let output = ctx.execute(&replay(file, "json")).await.unwrap();
    let summary: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(summary["lines"], 7);
    assert_eq!(summary["forwarded"], 6);
    assert_eq!(summary["malformed"], 1);
    assert_eq!(summary["dispatched"], 6);
    assert_eq!(summary["recordsFlushed"], 3);
    assert_eq!(summary["flushFailures"], 0);
    assert_eq!(summary["drained"], true);
    assert_eq!(summary["remaining"]["activeSessionBuffers"], 1);
    assert!(ctx.store_path().starts_with(workspace.path()));
}

#[tokio::test]
async fn test_records_after_replay() {
    let workspace = TempDir::new().unwrap();
    let file = write_events(&workspace);
    let ctx = context(&workspace);
    let text = ctx.execute(&replay(file, "text")).await.unwrap();
    assert!(text.contains("Records flushed"));

    let output = ctx.execute(&records("s1", "session", "json")).await.unwrap();
    let stored: Vec<Value> = serde_json::from_str(&output).unwrap();
    assert_eq!(stored.len(), 2);
    let p1 = stored.iter().find(|r| r["playerId"] == "p1").unwrap();
    assert_eq!(p1["sampleCount"], 2);
    assert_eq!(p1["totalDuration"], 2.0);
    assert_eq!(p1["averageHeartRate"], 135.0);
    assert_eq!(p1["completionRate"], 100.0);
    assert_eq!(p1["aggregationLevel"], "session");

    let table = ctx.execute(&records("s1", "session", "text")).await.unwrap();
    assert!(table.contains("p1"));
    assert!(table.contains("p2"));
    assert!(table.contains("Avg HR"));

    let empty = ctx.execute(&records("missing", "session", "text")).await.unwrap();
    assert_eq!(empty, "No records found.");
}

#[tokio::test]
async fn test_daily_rollup_merges_repeated_replays() {
    let workspace = TempDir::new().unwrap();
    let file = write_events(&workspace);
    let ctx = context(&workspace);
    ctx.execute(&replay(file.clone(), "text")).await.unwrap();
    ctx.execute(&replay(file, "text")).await.unwrap();

    let output = ctx.execute(&records("s1", "session", "json")).await.unwrap();
    let stored: Vec<Value> = serde_json::from_str(&output).unwrap();
    assert_eq!(stored.len(), 4);

    let output = ctx.execute(&records("s1", "daily", "json")).await.unwrap();
    let daily: Vec<Value> = serde_json::from_str(&output).unwrap();
    assert_eq!(daily.len(), 2);
    let p1 = daily.iter().find(|r| r["playerId"] == "p1").unwrap();
    assert_eq!(p1["aggregationLevel"], "daily");
    assert_eq!(p1["sampleCount"], 4);
    assert_eq!(p1["totalDuration"], 4.0);
}

#[tokio::test]
async fn test_records_rejects_unknown_level() {
    let workspace = TempDir::new().unwrap();
    let ctx = context(&workspace);
    let err = ctx
        .execute(&records("s1", "hourly", "text"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ConfigError(_)));
}

#[tokio::test]
async fn test_replay_missing_file_is_io_error() {
    let workspace = TempDir::new().unwrap();
    let ctx = context(&workspace);
    let result = ctx
        .execute(&replay(workspace.path().join("nope.jsonl"), "text"))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_config_command_prints_resolved_toml() {
    let workspace = TempDir::new().unwrap();
    let mut config = PulseConfig::default();
    config.collector.staleness_timeout_secs = 45;
    let ctx = RunContext::from_config(workspace.path().to_path_buf(), config);

    let output = ctx.execute(&Commands::Config).await.unwrap();
    assert!(output.contains("[collector]"));
    assert!(output.contains("staleness_timeout_secs = 45"));
    let parsed: PulseConfig = toml::from_str(&output).unwrap();
    assert_eq!(parsed.collector.staleness_timeout_secs, 45);
}

#[test]
fn test_run_context_rejects_invalid_workspace_config() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let config_dir = workspace.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("config.toml"),
        "[collector]\ncapacity_threshold = 0\n",
    )
    .unwrap();

    let result = with_isolated_env(&test_dir, || {
        RunContext::new(workspace.path().to_path_buf(), None)
    });
    let Err(PipelineError::ConfigError(msg)) = result else {
        panic!("expected a configuration error");
    };
    assert!(msg.contains("capacity_threshold"));
}
