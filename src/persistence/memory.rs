//! In-process gateway with failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::aggregation::WorkoutAnalyticsRecord;
use crate::error::PersistenceError;
use crate::events::MetricSample;
use crate::metadata::SessionMetadata;
use crate::persistence::PersistenceGateway;

#[derive(Default)]
pub struct MemoryGateway {
    raw_samples: Mutex<Vec<(String, MetricSample)>>,
    records: Mutex<Vec<WorkoutAnalyticsRecord>>,
    metadata: Mutex<HashMap<String, SessionMetadata>>,
    max_heart_rates: Mutex<HashMap<String, f64>>,
    fail_records: AtomicBool,
    fail_raw_samples: AtomicBool,
    record_attempts: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn put_session_metadata(&self, session_id: &str, metadata: SessionMetadata) {
        self.metadata.lock().insert(session_id.to_string(), metadata);
    }

    pub fn put_player_max_heart_rate(&self, player_id: &str, max_heart_rate: f64) {
        self.max_heart_rates
            .lock()
            .insert(player_id.to_string(), max_heart_rate);
    }

    /// Make every record write fail until switched back.
    pub fn set_fail_records(&self, fail: bool) {
        self.fail_records.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_raw_samples(&self, fail: bool) {
        self.fail_raw_samples.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<WorkoutAnalyticsRecord> {
        self.records.lock().clone()
    }

    pub fn records_for(&self, session_id: &str, player_id: &str) -> Vec<WorkoutAnalyticsRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.session_id == session_id && r.player_id == player_id)
            .cloned()
            .collect()
    }

    pub fn raw_samples(&self) -> Vec<(String, MetricSample)> {
        self.raw_samples.lock().clone()
    }

    /// Record writes attempted, successful or not.
    pub fn record_attempts(&self) -> usize {
        self.record_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn save_raw_sample(
        &self,
        session_id: &str,
        sample: &MetricSample,
    ) -> Result<(), PersistenceError> {
        if self.fail_raw_samples.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable(
                "raw sample store offline".to_string(),
            ));
        }
        self.raw_samples
            .lock()
            .push((session_id.to_string(), sample.clone()));
        Ok(())
    }

    async fn save_analytics_record(
        &self,
        record: &WorkoutAnalyticsRecord,
    ) -> Result<(), PersistenceError> {
        self.record_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_records.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable(
                "analytics store offline".to_string(),
            ));
        }
        self.records.lock().push(record.clone());
        Ok(())
    }

    async fn lookup_session_metadata(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionMetadata>, PersistenceError> {
        Ok(self.metadata.lock().get(session_id).cloned())
    }

    async fn player_max_heart_rate(
        &self,
        player_id: &str,
    ) -> Result<Option<f64>, PersistenceError> {
        Ok(self.max_heart_rates.lock().get(player_id).copied())
    }
}
