//! Durable sled-backed gateway.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sled::{Db, Tree};

use crate::aggregation::WorkoutAnalyticsRecord;
use crate::error::PersistenceError;
use crate::events::MetricSample;
use crate::metadata::SessionMetadata;
use crate::persistence::PersistenceGateway;

const TREE_RAW_SAMPLES: &str = "raw_samples";
const TREE_RECORDS: &str = "analytics_records";
const TREE_METADATA: &str = "session_metadata";
const TREE_MAX_HR: &str = "player_max_heart_rate";
const SEQ_KEY_PAD: usize = 20;

/// Key prefix for everything stored under one session.
///
/// The id is length-prefixed so `s1` never matches keys of `s1:b`.
fn session_prefix(session_id: &str) -> String {
    format!("{:08x}:{session_id}:", session_id.len())
}

#[derive(Clone)]
pub struct SledGateway {
    db: Db,
    raw_samples: Tree,
    records: Tree,
    metadata: Tree,
    max_heart_rates: Tree,
}

impl SledGateway {
    pub fn new(db: Db) -> Result<Self, PersistenceError> {
        let raw_samples = db.open_tree(TREE_RAW_SAMPLES)?;
        let records = db.open_tree(TREE_RECORDS)?;
        let metadata = db.open_tree(TREE_METADATA)?;
        let max_heart_rates = db.open_tree(TREE_MAX_HR)?;
        Ok(Self {
            db,
            raw_samples,
            records,
            metadata,
            max_heart_rates,
        })
    }

    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        Self::new(sled::open(path)?)
    }

    pub fn shared(db: Db) -> Result<Arc<Self>, PersistenceError> {
        Ok(Arc::new(Self::new(db)?))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn put_session_metadata(
        &self,
        session_id: &str,
        metadata: &SessionMetadata,
    ) -> Result<(), PersistenceError> {
        let value = serde_json::to_vec(metadata)?;
        self.metadata.insert(session_id.as_bytes(), value)?;
        Ok(())
    }

    pub fn put_player_max_heart_rate(
        &self,
        player_id: &str,
        max_heart_rate: f64,
    ) -> Result<(), PersistenceError> {
        let value = serde_json::to_vec(&max_heart_rate)?;
        self.max_heart_rates.insert(player_id.as_bytes(), value)?;
        Ok(())
    }

    /// Records for a session, ordered by record timestamp.
    pub fn read_records(
        &self,
        session_id: &str,
    ) -> Result<Vec<WorkoutAnalyticsRecord>, PersistenceError> {
        let prefix = session_prefix(session_id);
        let mut out = Vec::new();
        for result in self.records.scan_prefix(prefix.as_bytes()) {
            let (_, value) = result?;
            out.push(serde_json::from_slice::<WorkoutAnalyticsRecord>(&value)?);
        }
        out.sort_by_key(|r| r.timestamp);
        Ok(out)
    }

    pub fn list_records(&self) -> Result<Vec<WorkoutAnalyticsRecord>, PersistenceError> {
        let mut out = Vec::new();
        for result in self.records.iter() {
            let (_, value) = result?;
            out.push(serde_json::from_slice::<WorkoutAnalyticsRecord>(&value)?);
        }
        out.sort_by_key(|r| r.timestamp);
        Ok(out)
    }

    /// Raw samples for a session in write order.
    pub fn read_raw_samples(&self, session_id: &str) -> Result<Vec<MetricSample>, PersistenceError> {
        let prefix = session_prefix(session_id);
        let mut out = Vec::new();
        for result in self.raw_samples.scan_prefix(prefix.as_bytes()) {
            let (_, value) = result?;
            out.push(serde_json::from_slice::<MetricSample>(&value)?);
        }
        Ok(out)
    }

    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for SledGateway {
    async fn save_raw_sample(
        &self,
        session_id: &str,
        sample: &MetricSample,
    ) -> Result<(), PersistenceError> {
        let seq = self.db.generate_id()?;
        let key = format!(
            "{}{seq:0width$}",
            session_prefix(session_id),
            width = SEQ_KEY_PAD
        );
        let value = serde_json::to_vec(sample)?;
        self.raw_samples.insert(key.as_bytes(), value)?;
        Ok(())
    }

    async fn save_analytics_record(
        &self,
        record: &WorkoutAnalyticsRecord,
    ) -> Result<(), PersistenceError> {
        let key = format!(
            "{}{}:{}",
            session_prefix(&record.session_id),
            record.player_id,
            record.record_id
        );
        let value = serde_json::to_vec(record)?;
        self.records.insert(key.as_bytes(), value)?;
        Ok(())
    }

    async fn lookup_session_metadata(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionMetadata>, PersistenceError> {
        let Some(raw) = self.metadata.get(session_id.as_bytes())? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn player_max_heart_rate(
        &self,
        player_id: &str,
    ) -> Result<Option<f64>, PersistenceError> {
        let Some(raw) = self.max_heart_rates.get(player_id.as_bytes())? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }
}
