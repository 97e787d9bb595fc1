//! Wiring of ingestion, dispatcher, collector, scheduler and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::collector::{
    CollectorStats, DispatchSummary, EventDispatcher, FlushReport, MetricsCollector,
};
use crate::config::PulseConfig;
use crate::error::{ConnectionError, PipelineError};
use crate::events::InboundEvent;
use crate::ingestion::{EventSource, IngestionClient, IngestionConfig};
use crate::lifecycle::SessionLifecycleHandler;
use crate::persistence::PersistenceGateway;
use crate::scheduler::FlushScheduler;

type ClientTask = (Arc<IngestionClient>, JoinHandle<Result<(), ConnectionError>>);

/// What shutdown managed to drain and flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub dispatched: DispatchSummary,
    /// False when the dispatcher did not drain within the timeout.
    pub drained: bool,
    pub flush: FlushReport,
}

/// A running pipeline. Dropping it without [`Pipeline::shutdown`] loses
/// whatever is still buffered.
pub struct Pipeline {
    collector: Arc<MetricsCollector>,
    lifecycle: Arc<SessionLifecycleHandler>,
    scheduler: FlushScheduler,
    events: Option<mpsc::Sender<InboundEvent>>,
    dispatcher: Option<JoinHandle<DispatchSummary>>,
    clients: Vec<ClientTask>,
    ingestion: IngestionConfig,
    drain_timeout: Duration,
}

impl Pipeline {
    /// Spawn the dispatcher and the flush scheduler.
    pub fn start(
        config: &PulseConfig,
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let collector = MetricsCollector::shared(
            gateway,
            clock,
            config.collector.clone(),
            config.aggregation.clone(),
        );
        let lifecycle = Arc::new(SessionLifecycleHandler::new(Arc::clone(&collector)));
        let (events, receiver) = mpsc::channel(config.collector.channel_capacity);
        let dispatcher =
            EventDispatcher::new(Arc::clone(&collector), Arc::clone(&lifecycle)).spawn(receiver);
        let scheduler = FlushScheduler::new(Arc::clone(&collector));
        scheduler.start();

        info!(
            channel_capacity = config.collector.channel_capacity,
            flush_interval_secs = config.collector.flush_interval_secs,
            staleness_timeout_secs = config.collector.staleness_timeout_secs,
            capacity_threshold = config.collector.capacity_threshold,
            "Started metrics pipeline"
        );

        Self {
            collector,
            lifecycle,
            scheduler,
            events: Some(events),
            dispatcher: Some(dispatcher),
            clients: Vec::new(),
            ingestion: config.ingestion.clone(),
            drain_timeout: config.collector.shutdown_drain(),
        }
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    pub fn lifecycle(&self) -> &Arc<SessionLifecycleHandler> {
        &self.lifecycle
    }

    pub fn scheduler(&self) -> &FlushScheduler {
        &self.scheduler
    }

    /// Direct handle to the dispatcher channel.
    pub fn sender(&self) -> Result<mpsc::Sender<InboundEvent>, PipelineError> {
        self.events.clone().ok_or(PipelineError::ChannelClosed)
    }

    /// Start an ingestion client against `source`.
    pub fn connect(
        &mut self,
        source: Arc<dyn EventSource>,
    ) -> Result<Arc<IngestionClient>, PipelineError> {
        let client = Arc::new(IngestionClient::new(
            source,
            self.sender()?,
            self.ingestion.clone(),
        ));
        let handle = Arc::clone(&client).spawn();
        self.clients.push((Arc::clone(&client), handle));
        Ok(client)
    }

    pub fn stats(&self) -> CollectorStats {
        self.collector.stats()
    }

    /// Force-flush and evict a session, then forget its status.
    pub async fn cleanup_session(&self, session_id: &str) -> FlushReport {
        let report = self.collector.cleanup_session(session_id).await;
        self.lifecycle.forget(session_id);
        report
    }

    /// Stop the scheduler, disconnect clients, drain the dispatcher for at
    /// most the configured timeout, then flush every buffer.
    pub async fn shutdown(mut self) -> ShutdownReport {
        info!("Shutting down metrics pipeline");
        self.scheduler.stop().await;

        for (client, handle) in self.clients.drain(..) {
            client.disconnect();
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "ingestion client ended with error"),
                Err(err) => warn!(error = %err, "ingestion client task failed"),
            }
        }

        self.events.take();
        let mut report = ShutdownReport::default();
        if let Some(dispatcher) = self.dispatcher.take() {
            match tokio::time::timeout(self.drain_timeout, dispatcher).await {
                Ok(Ok(summary)) => {
                    report.dispatched = summary;
                    report.drained = true;
                }
                Ok(Err(err)) => warn!(error = %err, "event dispatcher task failed"),
                Err(_) => warn!(
                    timeout_secs = self.drain_timeout.as_secs_f64(),
                    "event dispatcher did not drain in time"
                ),
            }
        }

        report.flush = self.collector.flush_all().await;
        info!(
            dispatched = report.dispatched.total(),
            drained = report.drained,
            flushed = report.flush.flushed,
            failed = report.flush.failed,
            "Stopped metrics pipeline"
        );
        report
    }
}
