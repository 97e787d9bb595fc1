//! Persistence gateway: the outbound store for raw samples and analytics records.

use async_trait::async_trait;

use crate::aggregation::WorkoutAnalyticsRecord;
use crate::error::PersistenceError;
use crate::events::MetricSample;
use crate::metadata::SessionMetadata;

pub mod memory;
pub mod sled_store;

pub use memory::MemoryGateway;
pub use sled_store::SledGateway;

/// Durable store consumed by the collector.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Write-through of a single raw sample
    async fn save_raw_sample(
        &self,
        session_id: &str,
        sample: &MetricSample,
    ) -> Result<(), PersistenceError>;

    /// Persist one aggregated record
    async fn save_analytics_record(
        &self,
        record: &WorkoutAnalyticsRecord,
    ) -> Result<(), PersistenceError>;

    /// Metadata for a session, `None` when the session is unknown
    async fn lookup_session_metadata(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionMetadata>, PersistenceError>;

    /// Player-specific max heart rate, if one is on file
    async fn player_max_heart_rate(
        &self,
        _player_id: &str,
    ) -> Result<Option<f64>, PersistenceError> {
        Ok(None)
    }
}
