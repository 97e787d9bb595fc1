//! In-memory buffer for one (session, player) pair.

use crate::events::{MetricSample, ProgressEvent, SessionStatus};
use crate::metadata::SessionMetadata;
use crate::types::SessionKey;

/// Accumulated, not yet flushed data for one key.
///
/// Samples and progress events keep arrival order. A flush takes the pending
/// lists out with [`SessionBuffer::take_pending`]; if persisting fails the
/// snapshot goes back in with [`SessionBuffer::restore`], ahead of anything
/// appended while the flush was in flight.
///
/// Calories arrive cumulative. The last value persisted is kept as a baseline
/// so each record only carries what was burned in its own window.
#[derive(Debug)]
pub struct SessionBuffer {
    key: SessionKey,
    metadata: SessionMetadata,
    max_heart_rate: Option<f64>,
    last_update_ms: u64,
    pending_since_ms: Option<u64>,
    status: SessionStatus,
    closed: bool,
    calories_baseline: Option<f64>,
    samples: Vec<MetricSample>,
    progress: Vec<ProgressEvent>,
}

/// Data taken out of a buffer for one flush.
#[derive(Debug, Clone)]
pub struct BufferSnapshot {
    pub key: SessionKey,
    pub metadata: SessionMetadata,
    pub max_heart_rate: Option<f64>,
    pub samples: Vec<MetricSample>,
    pub progress: Vec<ProgressEvent>,
    pub pending_since_ms: Option<u64>,
    /// Cumulative calories already covered by earlier records.
    pub calories_baseline: Option<f64>,
}

impl BufferSnapshot {
    /// Latest cumulative calorie reading in the snapshot.
    pub fn last_calories(&self) -> Option<f64> {
        self.samples.iter().rev().find_map(|s| s.calories)
    }
}

/// Read-only view for stats and inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferView {
    pub key: SessionKey,
    pub sample_count: usize,
    pub progress_count: usize,
    pub last_update_ms: u64,
    pub pending_since_ms: Option<u64>,
    pub status: SessionStatus,
    pub closed: bool,
    pub metadata: SessionMetadata,
}

impl SessionBuffer {
    pub fn new(
        key: SessionKey,
        metadata: SessionMetadata,
        max_heart_rate: Option<f64>,
        now_ms: u64,
    ) -> Self {
        Self {
            key,
            metadata,
            max_heart_rate,
            last_update_ms: now_ms,
            pending_since_ms: None,
            status: SessionStatus::Active,
            closed: false,
            calories_baseline: None,
            samples: Vec::new(),
            progress: Vec::new(),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn push_sample(&mut self, sample: MetricSample, now_ms: u64) {
        self.samples.push(sample);
        self.pending_since_ms.get_or_insert(now_ms);
        self.last_update_ms = now_ms;
    }

    pub fn push_progress(&mut self, event: ProgressEvent, now_ms: u64) {
        self.progress.push(event);
        self.pending_since_ms.get_or_insert(now_ms);
        self.last_update_ms = now_ms;
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn has_samples(&self) -> bool {
        !self.samples.is_empty()
    }

    /// Samples or progress events not yet covered by a record.
    pub fn has_pending(&self) -> bool {
        !self.samples.is_empty() || !self.progress.is_empty()
    }

    pub fn last_update_ms(&self) -> u64 {
        self.last_update_ms
    }

    pub fn pending_since_ms(&self) -> Option<u64> {
        self.pending_since_ms
    }

    pub fn is_stale(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_update_ms) >= timeout_ms
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        if status.is_terminal() {
            self.closed = true;
        }
    }

    /// Called once a record covering `calories` has been stored.
    pub fn advance_calories_baseline(&mut self, calories: f64) {
        self.calories_baseline = Some(calories);
    }

    /// Mark for eviction without changing the reported status.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn take_pending(&mut self) -> BufferSnapshot {
        BufferSnapshot {
            key: self.key.clone(),
            metadata: self.metadata.clone(),
            max_heart_rate: self.max_heart_rate,
            samples: std::mem::take(&mut self.samples),
            progress: std::mem::take(&mut self.progress),
            pending_since_ms: self.pending_since_ms.take(),
            calories_baseline: self.calories_baseline,
        }
    }

    pub fn restore(&mut self, snapshot: BufferSnapshot) {
        let BufferSnapshot {
            mut samples,
            mut progress,
            pending_since_ms,
            ..
        } = snapshot;
        samples.append(&mut self.samples);
        progress.append(&mut self.progress);
        self.samples = samples;
        self.progress = progress;
        self.pending_since_ms = match (pending_since_ms, self.pending_since_ms) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    /// Rebuild a buffer from a snapshot whose buffer has since been evicted.
    pub fn from_snapshot(snapshot: BufferSnapshot, now_ms: u64) -> Self {
        let mut buffer = Self::new(
            snapshot.key.clone(),
            snapshot.metadata.clone(),
            snapshot.max_heart_rate,
            now_ms,
        );
        buffer.calories_baseline = snapshot.calories_baseline;
        buffer.restore(snapshot);
        buffer
    }

    pub fn view(&self) -> BufferView {
        BufferView {
            key: self.key.clone(),
            sample_count: self.samples.len(),
            progress_count: self.progress.len(),
            last_update_ms: self.last_update_ms,
            pending_since_ms: self.pending_since_ms,
            status: self.status,
            closed: self.closed,
            metadata: self.metadata.clone(),
        }
    }
}
