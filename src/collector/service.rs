//! Metrics collector: owns the buffer map and every flush path.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::aggregation::{aggregate, AggregationConfig};
use crate::clock::Clock;
use crate::collector::buffer::{BufferView, SessionBuffer};
use crate::collector::stats::CollectorStats;
use crate::error::PipelineError;
use crate::events::{
    ExerciseProgressEvent, IntervalProgressEvent, MetricSample, ProgressEvent, SessionStatus,
};
use crate::metadata::SessionMetadata;
use crate::persistence::PersistenceGateway;
use crate::types::SessionKey;

/// Buffering and flush settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Seconds between scheduler scans
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Seconds without updates after which a buffer is stale
    #[serde(default = "default_staleness_timeout_secs")]
    pub staleness_timeout_secs: u64,

    /// Sample count at which a buffer is flushed on the next scan
    #[serde(default = "default_capacity_threshold")]
    pub capacity_threshold: usize,

    /// Bound of the ingestion-to-collector channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Seconds to wait for the dispatcher to drain on shutdown
    #[serde(default = "default_shutdown_drain_secs")]
    pub shutdown_drain_secs: u64,

    /// Seconds an ended session is remembered so repeated terminal statuses
    /// are ignored
    #[serde(default = "default_ended_session_retention_secs")]
    pub ended_session_retention_secs: u64,
}

fn default_flush_interval_secs() -> u64 {
    30
}

fn default_staleness_timeout_secs() -> u64 {
    120
}

fn default_capacity_threshold() -> usize {
    10
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_shutdown_drain_secs() -> u64 {
    5
}

fn default_ended_session_retention_secs() -> u64 {
    600
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval_secs(),
            staleness_timeout_secs: default_staleness_timeout_secs(),
            capacity_threshold: default_capacity_threshold(),
            channel_capacity: default_channel_capacity(),
            shutdown_drain_secs: default_shutdown_drain_secs(),
            ended_session_retention_secs: default_ended_session_retention_secs(),
        }
    }
}

impl CollectorConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn staleness_timeout(&self) -> Duration {
        Duration::from_secs(self.staleness_timeout_secs)
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }

    pub fn ended_session_retention(&self) -> Duration {
        Duration::from_secs(self.ended_session_retention_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.flush_interval_secs == 0 {
            return Err("flush_interval_secs must be greater than zero".to_string());
        }
        if self.capacity_threshold == 0 {
            return Err("capacity_threshold must be greater than zero".to_string());
        }
        if self.channel_capacity == 0 {
            return Err("channel_capacity must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Result of flushing one buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// No buffer exists for the key.
    NoBuffer,
    /// Nothing to aggregate yet; a closed empty buffer is evicted.
    Empty { evicted: bool },
    Persisted {
        record_id: String,
        samples: usize,
        evicted: bool,
    },
}

impl FlushOutcome {
    pub fn evicted(&self) -> bool {
        match self {
            FlushOutcome::NoBuffer => false,
            FlushOutcome::Empty { evicted } | FlushOutcome::Persisted { evicted, .. } => *evicted,
        }
    }
}

/// Totals over a batch of flushes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub flushed: usize,
    pub empty: usize,
    pub failed: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushReason {
    Closed,
    Capacity,
    Stale,
}

impl FlushReason {
    fn as_str(self) -> &'static str {
        match self {
            FlushReason::Closed => "closed",
            FlushReason::Capacity => "capacity",
            FlushReason::Stale => "stale",
        }
    }
}

/// Owns every open buffer, keyed by (session, player).
///
/// The map lock is only held for in-memory work. Flushes are serialized by an
/// async gate and persist outside the map lock, so ingestion never waits on
/// the store.
pub struct MetricsCollector {
    buffers: Mutex<HashMap<SessionKey, SessionBuffer>>,
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    config: CollectorConfig,
    aggregation: AggregationConfig,
    flush_gate: tokio::sync::Mutex<()>,
}

impl MetricsCollector {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        config: CollectorConfig,
        aggregation: AggregationConfig,
    ) -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            gateway,
            clock,
            config,
            aggregation,
            flush_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn shared(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        config: CollectorConfig,
        aggregation: AggregationConfig,
    ) -> Arc<Self> {
        Arc::new(Self::new(gateway, clock, config, aggregation))
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn ingest_sample(&self, session_id: &str, sample: MetricSample) {
        let key = SessionKey::new(session_id, sample.player_id.clone());
        self.write_through(session_id, &sample);
        self.with_buffer(&key, |buffer, now| buffer.push_sample(sample, now))
            .await;
    }

    pub async fn ingest_exercise_progress(&self, session_id: &str, progress: ExerciseProgressEvent) {
        let key = SessionKey::new(session_id, progress.player_id.clone());
        self.with_buffer(&key, |buffer, now| {
            buffer.push_progress(ProgressEvent::Exercise(progress), now)
        })
        .await;
    }

    pub async fn ingest_interval_progress(&self, session_id: &str, progress: IntervalProgressEvent) {
        let key = SessionKey::new(session_id, progress.player_id.clone());
        self.with_buffer(&key, |buffer, now| {
            buffer.push_progress(ProgressEvent::Interval(progress), now)
        })
        .await;
    }

    /// Record a status transition; terminal statuses force-flush and evict
    /// every buffer of the session.
    pub async fn on_session_update(&self, session_id: &str, status: SessionStatus) -> FlushReport {
        let keys: Vec<SessionKey> = {
            let mut buffers = self.buffers.lock();
            buffers
                .iter_mut()
                .filter(|(key, _)| key.session_id == session_id)
                .map(|(key, buffer)| {
                    buffer.set_status(status);
                    key.clone()
                })
                .collect()
        };

        if !status.is_terminal() {
            debug!(
                session_id = %session_id,
                status = status.as_str(),
                buffers = keys.len(),
                "session status updated"
            );
            return FlushReport::default();
        }

        info!(
            session_id = %session_id,
            status = status.as_str(),
            buffers = keys.len(),
            "session ended, forcing flush"
        );
        self.flush_keys(&keys, true).await
    }

    /// Force-flush and evict every buffer of a session regardless of status.
    pub async fn cleanup_session(&self, session_id: &str) -> FlushReport {
        let keys = self.close_session(session_id);
        info!(session_id = %session_id, buffers = keys.len(), "cleaning up session");
        self.flush_keys(&keys, true).await
    }

    /// Aggregate and persist one buffer.
    ///
    /// A buffer without samples is left alone while its session is open and
    /// recent, so progress events wait for heart-rate data. Once the buffer is
    /// closed or stale, progress alone is enough for a record. Pending data is
    /// taken out under the map lock and only dropped once the record is
    /// stored; a failed write puts it back for the next scan.
    pub async fn flush_buffer(&self, key: &SessionKey) -> Result<FlushOutcome, PipelineError> {
        self.flush_key(key, false).await
    }

    async fn flush_key(
        &self,
        key: &SessionKey,
        force: bool,
    ) -> Result<FlushOutcome, PipelineError> {
        let _gate = self.flush_gate.lock().await;
        let now_ms = self.clock.now_millis();
        let staleness_ms = self.config.staleness_timeout().as_millis() as u64;

        let snapshot = {
            let mut buffers = self.buffers.lock();
            let Some(buffer) = buffers.get_mut(key) else {
                return Ok(FlushOutcome::NoBuffer);
            };
            let progress_due =
                force || buffer.is_closed() || buffer.is_stale(now_ms, staleness_ms);
            if !buffer.has_samples() && !(progress_due && buffer.has_pending()) {
                let evicted = buffer.is_closed() && !buffer.has_pending();
                if evicted {
                    buffers.remove(key);
                    debug!(key = %key, "evicted closed buffer");
                }
                return Ok(FlushOutcome::Empty { evicted });
            }
            buffer.take_pending()
        };

        let samples = snapshot.samples.len();
        let last_calories = snapshot.last_calories();
        let record = aggregate(&snapshot, &self.aggregation, self.clock.now());

        match self.gateway.save_analytics_record(&record).await {
            Ok(()) => {
                let evicted = {
                    let mut buffers = self.buffers.lock();
                    let done = buffers
                        .get(key)
                        .is_some_and(|b| b.is_closed() && !b.has_pending());
                    if done {
                        buffers.remove(key);
                    } else if let (Some(buffer), Some(calories)) =
                        (buffers.get_mut(key), last_calories)
                    {
                        buffer.advance_calories_baseline(calories);
                    }
                    done
                };
                info!(
                    key = %key,
                    record_id = %record.record_id,
                    samples,
                    evicted,
                    "flushed buffer"
                );
                Ok(FlushOutcome::Persisted {
                    record_id: record.record_id,
                    samples,
                    evicted,
                })
            }
            Err(source) => {
                let now = self.clock.now_millis();
                {
                    let mut buffers = self.buffers.lock();
                    match buffers.get_mut(key) {
                        Some(buffer) => buffer.restore(snapshot),
                        None => {
                            buffers.insert(key.clone(), SessionBuffer::from_snapshot(snapshot, now));
                        }
                    }
                }
                warn!(
                    key = %key,
                    samples,
                    error = %source,
                    "flush failed, keeping buffer for retry"
                );
                Err(PipelineError::Flush {
                    key: key.clone(),
                    source,
                })
            }
        }
    }

    /// Flush every buffer that is closed, at capacity, or stale.
    pub async fn flush_due(&self) -> FlushReport {
        let now = self.clock.now_millis();
        let staleness_ms = self.config.staleness_timeout().as_millis() as u64;
        let due: Vec<(SessionKey, FlushReason)> = {
            let buffers = self.buffers.lock();
            buffers
                .iter()
                .filter_map(|(key, buffer)| {
                    let reason = if buffer.is_closed() {
                        FlushReason::Closed
                    } else if buffer.sample_count() >= self.config.capacity_threshold {
                        FlushReason::Capacity
                    } else if buffer.has_pending() && buffer.is_stale(now, staleness_ms) {
                        FlushReason::Stale
                    } else {
                        return None;
                    };
                    Some((key.clone(), reason))
                })
                .collect()
        };

        for (key, reason) in &due {
            debug!(key = %key, reason = reason.as_str(), "buffer due for flush");
        }
        let keys: Vec<SessionKey> = due.into_iter().map(|(key, _)| key).collect();
        self.flush_keys(&keys, false).await
    }

    /// Flush every buffer of one session without closing it.
    pub async fn flush_session(&self, session_id: &str) -> FlushReport {
        let keys = self.session_keys(session_id);
        self.flush_keys(&keys, false).await
    }

    /// Flush everything, used on shutdown. Progress-only buffers are
    /// persisted too. Buffers survive unless closed.
    pub async fn flush_all(&self) -> FlushReport {
        let keys: Vec<SessionKey> = self.buffers.lock().keys().cloned().collect();
        self.flush_keys(&keys, true).await
    }

    pub fn stats(&self) -> CollectorStats {
        let now = self.clock.now_millis();
        let buffers = self.buffers.lock();
        let sessions: HashSet<&str> = buffers.keys().map(|k| k.session_id.as_str()).collect();
        let oldest_buffer_age_ms = buffers
            .values()
            .filter_map(|b| b.pending_since_ms())
            .map(|since| now.saturating_sub(since))
            .max()
            .unwrap_or(0);
        CollectorStats {
            active_session_buffers: sessions.len(),
            total_player_buffers: buffers.len(),
            oldest_buffer_age_ms,
        }
    }

    pub fn buffer_view(&self, key: &SessionKey) -> Option<BufferView> {
        self.buffers.lock().get(key).map(SessionBuffer::view)
    }

    pub fn session_keys(&self, session_id: &str) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = self
            .buffers
            .lock()
            .keys()
            .filter(|k| k.session_id == session_id)
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Drop every buffer without flushing. Returns how many were dropped.
    pub fn reset(&self) -> usize {
        let mut buffers = self.buffers.lock();
        let dropped = buffers.len();
        buffers.clear();
        dropped
    }

    fn close_session(&self, session_id: &str) -> Vec<SessionKey> {
        let mut buffers = self.buffers.lock();
        buffers
            .iter_mut()
            .filter(|(key, _)| key.session_id == session_id)
            .map(|(key, buffer)| {
                buffer.close();
                key.clone()
            })
            .collect()
    }

    async fn flush_keys(&self, keys: &[SessionKey], force: bool) -> FlushReport {
        let mut report = FlushReport::default();
        for key in keys {
            match self.flush_key(key, force).await {
                Ok(outcome) => {
                    match outcome {
                        FlushOutcome::Persisted { .. } => report.flushed += 1,
                        FlushOutcome::Empty { .. } => report.empty += 1,
                        FlushOutcome::NoBuffer => {}
                    }
                    if outcome.evicted() {
                        report.evicted += 1;
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    error!(key = %key, error = %err, "buffer flush failed");
                }
            }
        }
        report
    }

    async fn with_buffer<R>(
        &self,
        key: &SessionKey,
        apply: impl FnOnce(&mut SessionBuffer, u64) -> R,
    ) -> R {
        let exists = self.buffers.lock().contains_key(key);
        let hydrated = if exists {
            None
        } else {
            Some(self.hydrate(key).await)
        };

        let now = self.clock.now_millis();
        let mut buffers = self.buffers.lock();
        let buffer = match buffers.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let (metadata, max_heart_rate) = hydrated.unwrap_or_else(|| {
                    warn!(key = %key, "buffer evicted during ingest, recreating with fallback metadata");
                    (SessionMetadata::fallback(self.clock.now()), None)
                });
                debug!(key = %key, workout_type = metadata.workout_type.as_str(), "created buffer");
                entry.insert(SessionBuffer::new(key.clone(), metadata, max_heart_rate, now))
            }
        };
        apply(buffer, now)
    }

    async fn hydrate(&self, key: &SessionKey) -> (SessionMetadata, Option<f64>) {
        let metadata = match self.gateway.lookup_session_metadata(&key.session_id).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                warn!(
                    session_id = %key.session_id,
                    "session metadata not found, using fallback metadata"
                );
                SessionMetadata::fallback(self.clock.now())
            }
            Err(err) => {
                warn!(
                    session_id = %key.session_id,
                    error = %err,
                    "session metadata lookup failed, using fallback metadata"
                );
                SessionMetadata::fallback(self.clock.now())
            }
        };
        let max_heart_rate = match self.gateway.player_max_heart_rate(&key.player_id).await {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    player_id = %key.player_id,
                    error = %err,
                    "max heart rate lookup failed, using default"
                );
                None
            }
        };
        (metadata, max_heart_rate)
    }

    /// Detached write of the raw sample; failures are logged and dropped.
    fn write_through(&self, session_id: &str, sample: &MetricSample) {
        let gateway = Arc::clone(&self.gateway);
        let session_id = session_id.to_string();
        let sample = sample.clone();
        tokio::spawn(async move {
            if let Err(err) = gateway.save_raw_sample(&session_id, &sample).await {
                warn!(
                    session_id = %session_id,
                    player_id = %sample.player_id,
                    error = %err,
                    "raw sample write-through failed"
                );
            }
        });
    }
}
