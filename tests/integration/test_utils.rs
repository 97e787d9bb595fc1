//! Shared test utilities for integration tests
//!
//! Collector harness over the in-memory gateway and a manual clock, plus
//! serialized environment isolation for config tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use pulse::aggregation::AggregationConfig;
use pulse::clock::{Clock, ManualClock};
use pulse::collector::{CollectorConfig, MetricsCollector};
use pulse::events::{ExerciseProgressEvent, MetricSample};
use pulse::persistence::MemoryGateway;
use tempfile::TempDir;

/// Global mutex to serialize HOME / XDG / PULSE_* environment access
static ENV_MUTEX: Mutex<()> = Mutex::new(());

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 17, 30, 0).unwrap()
}

pub struct Harness {
    pub gateway: Arc<MemoryGateway>,
    pub clock: Arc<ManualClock>,
    pub collector: Arc<MetricsCollector>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CollectorConfig::default())
    }

    pub fn with_config(config: CollectorConfig) -> Self {
        let gateway = MemoryGateway::shared();
        let clock = Arc::new(ManualClock::new(start_time()));
        let collector = MetricsCollector::shared(
            gateway.clone(),
            clock.clone(),
            config,
            AggregationConfig::default(),
        );
        Self {
            gateway,
            clock,
            collector,
        }
    }

    /// Sample stamped with the harness clock.
    pub fn sample(&self, player: &str, heart_rate: f64) -> MetricSample {
        MetricSample {
            player_id: player.to_string(),
            timestamp: self.clock.now(),
            heart_rate,
            power: None,
            pace: None,
            calories: None,
        }
    }

    pub async fn ingest(&self, session: &str, player: &str, heart_rates: &[f64]) {
        for hr in heart_rates {
            self.collector
                .ingest_sample(session, self.sample(player, *hr))
                .await;
        }
    }
}

pub fn exercise(player: &str, exercise_id: &str, completed: bool) -> ExerciseProgressEvent {
    ExerciseProgressEvent {
        player_id: player.to_string(),
        exercise_id: exercise_id.to_string(),
        exercise_name: exercise_id.to_string(),
        current_set: 1,
        reps: Some(8),
        weight: Some(60.0),
        duration: None,
        completed,
    }
}

/// Metric frame as it arrives on the wire.
pub fn metric_frame(session: &str, player: &str, timestamp: &str, heart_rate: f64) -> String {
    format!(
        r#"{{"event":"metrics:update","sessionId":"{session}","sample":{{"playerId":"{player}","timestamp":"{timestamp}","heartRate":{heart_rate}}}}}"#
    )
}

pub fn status_frame(session: &str, status: &str) -> String {
    format!(r#"{{"event":"session:update","sessionId":"{session}","status":"{status}"}}"#)
}

struct EnvState {
    home: Option<String>,
    xdg_config_home: Option<String>,
    pulse_env: Option<String>,
}

impl EnvState {
    fn capture() -> Self {
        Self {
            home: std::env::var("HOME").ok(),
            xdg_config_home: std::env::var("XDG_CONFIG_HOME").ok(),
            pulse_env: std::env::var("PULSE_ENV").ok(),
        }
    }

    fn restore(self) {
        restore_var("HOME", self.home);
        restore_var("XDG_CONFIG_HOME", self.xdg_config_home);
        restore_var("PULSE_ENV", self.pulse_env);
    }
}

fn restore_var(name: &str, value: Option<String>) {
    match value {
        Some(orig) => std::env::set_var(name, orig),
        None => std::env::remove_var(name),
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME pointed into `test_dir`.
///
/// The user config file lives at `<test_dir>/pulse/config.toml`.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_home).unwrap();
    std::env::set_var("HOME", &test_home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path());
    std::env::remove_var("PULSE_ENV");

    let result = f();

    env_state.restore();
    result
}
