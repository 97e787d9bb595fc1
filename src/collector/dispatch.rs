//! Single consumer of the ingestion channel.

use std::sync::Arc;

use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::collector::MetricsCollector;
use crate::events::InboundEvent;
use crate::lifecycle::SessionLifecycleHandler;

/// Counts of events handled by one dispatcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub samples: u64,
    pub progress: u64,
    pub status_updates: u64,
}

impl DispatchSummary {
    pub fn total(&self) -> u64 {
        self.samples + self.progress + self.status_updates
    }
}

/// Routes decoded events to the collector and lifecycle handler, one at a
/// time, in channel order.
pub struct EventDispatcher {
    collector: Arc<MetricsCollector>,
    lifecycle: Arc<SessionLifecycleHandler>,
}

impl EventDispatcher {
    pub fn new(collector: Arc<MetricsCollector>, lifecycle: Arc<SessionLifecycleHandler>) -> Self {
        Self {
            collector,
            lifecycle,
        }
    }

    pub async fn dispatch(&self, event: InboundEvent, summary: &mut DispatchSummary) {
        match event {
            InboundEvent::MetricSample { session_id, sample } => {
                summary.samples += 1;
                self.collector.ingest_sample(&session_id, sample).await;
            }
            InboundEvent::ExerciseProgress {
                session_id,
                progress,
            } => {
                summary.progress += 1;
                self.collector
                    .ingest_exercise_progress(&session_id, progress)
                    .await;
            }
            InboundEvent::IntervalProgress {
                session_id,
                progress,
            } => {
                summary.progress += 1;
                self.collector
                    .ingest_interval_progress(&session_id, progress)
                    .await;
            }
            InboundEvent::SessionUpdate { session_id, status } => {
                summary.status_updates += 1;
                let action = self.lifecycle.handle(&session_id, status).await;
                debug!(session_id = %session_id, action = ?action, "status update handled");
            }
        }
    }

    /// Consume until every sender is dropped.
    pub async fn run(self, mut events: Receiver<InboundEvent>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        while let Some(event) = events.recv().await {
            self.dispatch(event, &mut summary).await;
        }
        info!(
            samples = summary.samples,
            progress = summary.progress,
            status_updates = summary.status_updates,
            "event dispatcher drained"
        );
        summary
    }

    pub fn spawn(self, events: Receiver<InboundEvent>) -> JoinHandle<DispatchSummary> {
        tokio::spawn(self.run(events))
    }
}
