//! CLI route: single route table and run context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::aggregation::{rollup, AggregationLevel};
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_records_json, format_records_text, format_replay_summary_text, ReplaySummary,
};
use crate::clock::SystemClock;
use crate::config::{ConfigLoader, PulseConfig};
use crate::error::{ConnectionError, PipelineError};
use crate::ingestion::{ConnectionState, EventBus};
use crate::persistence::SledGateway;
use crate::pipeline::Pipeline;

/// Runtime context for CLI execution: workspace root and resolved config.
pub struct RunContext {
    workspace_root: PathBuf,
    config: PulseConfig,
}

impl RunContext {
    /// Load and validate configuration for a workspace.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, PipelineError> {
        let config = ConfigLoader::resolve(&workspace_root, config_path.as_deref())?;
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            PipelineError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn from_config(workspace_root: PathBuf, config: PulseConfig) -> Self {
        Self {
            workspace_root,
            config,
        }
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    pub fn store_path(&self) -> PathBuf {
        self.config.storage.resolve(&self.workspace_root)
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, PipelineError> {
        match command {
            Commands::Replay { file, format } => self.replay(file, format).await,
            Commands::Records {
                session,
                level,
                format,
            } => self.records(session, level, format),
            Commands::Config => self
                .config
                .to_toml()
                .map_err(|e| PipelineError::ConfigError(e.to_string())),
        }
    }

    fn open_gateway(&self) -> Result<Arc<SledGateway>, PipelineError> {
        let store_path = self.store_path();
        std::fs::create_dir_all(&store_path)?;
        Ok(Arc::new(SledGateway::open(&store_path)?))
    }

    async fn replay(&self, file: &Path, format: &str) -> Result<String, PipelineError> {
        let contents = std::fs::read_to_string(file)?;
        let gateway = self.open_gateway()?;
        let stored_before = gateway.list_records()?.len();
        let mut pipeline = Pipeline::start(&self.config, gateway.clone(), Arc::new(SystemClock));
        let collector = Arc::clone(pipeline.collector());

        let (bus, source) = EventBus::new_pair();
        let client = pipeline.connect(Arc::new(source))?;
        let mut states = client.subscribe();
        let handshake = self.config.ingestion.handshake_timeout();
        let connected = tokio::time::timeout(
            handshake,
            states.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await
        .is_ok_and(|waited| waited.is_ok());
        if !connected {
            pipeline.shutdown().await;
            return Err(PipelineError::Connection(ConnectionError::HandshakeTimeout(
                handshake,
            )));
        }

        let mut lines = 0;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            lines += 1;
            bus.publish(line);
        }
        bus.close();
        // A graceful close ends the client once every frame has been forwarded.
        let _ = states
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await;

        let ingestion = client.stats();
        let report = pipeline.shutdown().await;
        gateway.flush()?;
        let stored_after = gateway.list_records()?.len();
        info!(
            lines,
            forwarded = ingestion.forwarded,
            records = stored_after - stored_before,
            "Replay finished"
        );

        let summary = ReplaySummary {
            lines,
            forwarded: ingestion.forwarded,
            malformed: ingestion.malformed,
            dispatched: report.dispatched.total(),
            records_flushed: stored_after - stored_before,
            flush_failures: report.flush.failed,
            drained: report.drained,
            remaining: collector.stats(),
        };
        render(format, &summary, format_replay_summary_text)
    }

    fn records(&self, session: &str, level: &str, format: &str) -> Result<String, PipelineError> {
        let level: AggregationLevel = level.parse().map_err(PipelineError::ConfigError)?;
        let gateway = self.open_gateway()?;
        let stored = gateway.read_records(session)?;
        let records = rollup(&stored, level, Utc::now());
        match format {
            "json" => format_records_json(&records)
                .map_err(|e| PipelineError::Persistence(e.into())),
            _ => Ok(format_records_text(&records)),
        }
    }
}

fn render<T: serde::Serialize>(
    format: &str,
    value: &T,
    text: impl FnOnce(&T) -> String,
) -> Result<String, PipelineError> {
    match format {
        "json" => serde_json::to_string_pretty(value)
            .map_err(|e| PipelineError::Persistence(e.into())),
        _ => Ok(text(value)),
    }
}
