//! Merge rules: defaults first, later sources override earlier ones.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("collector.flush_interval_secs", 30)?
        .set_default("collector.staleness_timeout_secs", 120)?
        .set_default("collector.capacity_threshold", 10)?
        .set_default("ingestion.handshake_timeout_ms", 15_000)?
        .set_default("aggregation.default_max_heart_rate", 200.0)?
        .set_default("storage.store_path", ".pulse/store")
}
