//! Configuration System
//!
//! Layered configuration for the pipeline: built-in defaults, the user config
//! file, workspace config files and `PULSE__` environment overrides, merged
//! with the `config` crate and validated before use.

use crate::aggregation::AggregationConfig;
use crate::collector::CollectorConfig;
use crate::ingestion::IngestionConfig;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Buffering and flush settings
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Upstream connection settings
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Derived-metric settings
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Durable store location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled database directory, relative paths resolve against the workspace root
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".pulse/store")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.store_path.as_os_str().is_empty() {
            return Err("Store path cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn resolve(&self, workspace_root: &Path) -> PathBuf {
        if self.store_path.is_absolute() {
            self.store_path.clone()
        } else {
            workspace_root.join(&self.store_path)
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Collector(String),
    Ingestion(String),
    Aggregation(String),
    Storage(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Collector(msg) => write!(f, "Collector: {}", msg),
            ValidationError::Ingestion(msg) => write!(f, "Ingestion: {}", msg),
            ValidationError::Aggregation(msg) => write!(f, "Aggregation: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl PulseConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.collector.validate() {
            errors.push(ValidationError::Collector(e));
        }
        if let Err(e) = self.ingestion.validate() {
            errors.push(ValidationError::Ingestion(e));
        }
        if let Err(e) = self.aggregation.validate() {
            errors.push(ValidationError::Aggregation(e));
        }
        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
