//! Periodic flush scan over all open buffers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::collector::{FlushReport, MetricsCollector};

/// Runs [`MetricsCollector::flush_due`] on a fixed interval.
pub struct FlushScheduler {
    collector: Arc<MetricsCollector>,
    period: Duration,
    running: Arc<RwLock<bool>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    scans: Arc<AtomicU64>,
}

impl FlushScheduler {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        let period = collector.config().flush_interval();
        Self::with_period(collector, period)
    }

    pub fn with_period(collector: Arc<MetricsCollector>, period: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            collector,
            period,
            running: Arc::new(RwLock::new(false)),
            shutdown,
            task: Mutex::new(None),
            scans: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn the scan loop. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut running = self.running.write();
        if *running {
            return;
        }
        *running = true;
        drop(running);

        self.shutdown.send_replace(false);
        let mut shutdown = self.shutdown.subscribe();
        let collector = Arc::clone(&self.collector);
        let scans = Arc::clone(&self.scans);
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = collector.flush_due().await;
                        scans.fetch_add(1, Ordering::Relaxed);
                        log_scan(&report);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        *self.task.lock() = Some(handle);

        info!(period_secs = period.as_secs_f64(), "Started flush scheduler");
    }

    /// Stop the loop and wait for an in-flight scan to finish.
    pub async fn stop(&self) {
        let mut running = self.running.write();
        if !*running {
            return;
        }
        *running = false;
        drop(running);

        self.shutdown.send_replace(true);
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "flush scheduler task ended abnormally");
            }
        }
        info!("Stopped flush scheduler");
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// One scan, outside the timer.
    pub async fn scan_once(&self) -> FlushReport {
        let report = self.collector.flush_due().await;
        self.scans.fetch_add(1, Ordering::Relaxed);
        log_scan(&report);
        report
    }

    /// Scans completed so far.
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }
}

fn log_scan(report: &FlushReport) {
    if report.failed > 0 {
        warn!(
            flushed = report.flushed,
            failed = report.failed,
            evicted = report.evicted,
            "flush scan finished with failures"
        );
    } else if report.flushed > 0 || report.evicted > 0 {
        debug!(
            flushed = report.flushed,
            evicted = report.evicted,
            "flush scan finished"
        );
    }
}
