//! Integration tests for the assembled pipeline and its shutdown path

use std::sync::Arc;
use std::time::Duration;

use pulse::clock::ManualClock;
use pulse::config::PulseConfig;
use pulse::events::{InboundEvent, SessionStatus};
use pulse::ingestion::{ConnectionState, EventBus};
use pulse::persistence::MemoryGateway;
use pulse::pipeline::Pipeline;

use crate::integration::test_utils::{metric_frame, start_time, status_frame};

fn start(config: &PulseConfig) -> (Pipeline, Arc<MemoryGateway>) {
    let gateway = MemoryGateway::shared();
    let clock = Arc::new(ManualClock::new(start_time()));
    let pipeline = Pipeline::start(config, gateway.clone(), clock);
    (pipeline, gateway)
}

async fn wait_until(mut ready: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if ready() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_everything_received() {
    let (mut pipeline, gateway) = start(&PulseConfig::default());
    let (bus, source) = EventBus::new_pair();
    let client = pipeline.connect(Arc::new(source)).unwrap();
    wait_until(|| client.state() == ConnectionState::Connected).await;

    bus.publish(metric_frame("s1", "p1", "2026-03-02T17:30:00Z", 120.0));
    bus.publish(metric_frame("s1", "p1", "2026-03-02T17:31:00Z", 140.0));
    bus.publish(metric_frame("s1", "p2", "2026-03-02T17:30:30Z", 160.0));
    bus.publish("garbage");
    wait_until(|| client.stats().forwarded == 3).await;
    assert_eq!(client.stats().malformed, 1);

    let report = pipeline.shutdown().await;
    assert!(report.drained);
    assert_eq!(report.dispatched.samples, 3);
    assert_eq!(report.flush.flushed, 2);
    assert_eq!(report.flush.failed, 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let p1 = gateway.records_for("s1", "p1");
    assert_eq!(p1.len(), 1);
    assert_eq!(p1[0].sample_count, 2);
    assert_eq!(p1[0].total_duration, 1.0);
    assert_eq!(gateway.records_for("s1", "p2").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn completed_status_on_the_bus_tears_down_the_session() {
    let (mut pipeline, gateway) = start(&PulseConfig::default());
    let (bus, source) = EventBus::new_pair();
    let client = pipeline.connect(Arc::new(source)).unwrap();
    wait_until(|| client.state() == ConnectionState::Connected).await;

    bus.publish(metric_frame("s1", "p1", "2026-03-02T17:30:00Z", 120.0));
    bus.publish(metric_frame("s1", "p2", "2026-03-02T17:30:00Z", 125.0));
    bus.publish(status_frame("s1", "completed"));
    wait_until(|| gateway.records().len() == 2).await;

    let collector = Arc::clone(pipeline.collector());
    wait_until(|| collector.session_keys("s1").is_empty()).await;
    assert_eq!(pipeline.stats().total_player_buffers, 0);
    assert_eq!(
        pipeline.lifecycle().status("s1"),
        Some(SessionStatus::Completed)
    );

    let report = pipeline.shutdown().await;
    assert_eq!(report.dispatched.status_updates, 1);
    assert_eq!(report.flush.flushed, 0);
    assert_eq!(gateway.records().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn cleanup_session_flushes_and_forgets() {
    let (pipeline, gateway) = start(&PulseConfig::default());
    let sender = pipeline.sender().unwrap();
    for frame in [
        metric_frame("s1", "p1", "2026-03-02T17:30:00Z", 120.0),
        metric_frame("s1", "p2", "2026-03-02T17:30:00Z", 130.0),
        metric_frame("s2", "p1", "2026-03-02T17:30:00Z", 140.0),
        status_frame("s1", "paused"),
    ] {
        sender.send(InboundEvent::decode(&frame).unwrap()).await.unwrap();
    }
    let collector = Arc::clone(pipeline.collector());
    let lifecycle = Arc::clone(pipeline.lifecycle());
    wait_until(|| lifecycle.status("s1") == Some(SessionStatus::Paused)).await;
    assert_eq!(collector.session_keys("s1").len(), 2);

    let stats = pipeline.stats();
    assert_eq!(stats.active_session_buffers, 2);
    assert_eq!(stats.total_player_buffers, 3);

    let report = pipeline.cleanup_session("s1").await;
    assert_eq!(report.flushed, 2);
    assert_eq!(report.evicted, 2);
    assert!(collector.session_keys("s1").is_empty());
    assert_eq!(lifecycle.status("s1"), None);
    assert_eq!(gateway.records().len(), 2);

    drop(sender);
    let report = pipeline.shutdown().await;
    assert_eq!(report.flush.flushed, 1);
    assert_eq!(gateway.records_for("s2", "p1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_shutdown_flush_keeps_buffers() {
    let (pipeline, gateway) = start(&PulseConfig::default());
    gateway.set_fail_records(true);
    let sender = pipeline.sender().unwrap();
    let frame = metric_frame("s1", "p1", "2026-03-02T17:30:00Z", 120.0);
    sender.send(InboundEvent::decode(&frame).unwrap()).await.unwrap();
    drop(sender);

    let collector = Arc::clone(pipeline.collector());
    let report = pipeline.shutdown().await;
    assert!(report.drained);
    assert_eq!(report.flush.failed, 1);
    assert!(gateway.records().is_empty());
    assert_eq!(collector.stats().total_player_buffers, 1);
}

#[tokio::test(start_paused = true)]
async fn scheduler_flushes_full_buffers_while_running() {
    let mut config = PulseConfig::default();
    config.collector.capacity_threshold = 2;
    let (pipeline, gateway) = start(&config);
    assert!(pipeline.scheduler().is_running());

    let sender = pipeline.sender().unwrap();
    for frame in [
        metric_frame("s1", "p1", "2026-03-02T17:30:00Z", 120.0),
        metric_frame("s1", "p1", "2026-03-02T17:30:05Z", 121.0),
    ] {
        sender.send(InboundEvent::decode(&frame).unwrap()).await.unwrap();
    }
    drop(sender);

    tokio::time::sleep(Duration::from_secs(31)).await;
    wait_until(|| gateway.records().len() == 1).await;
    assert!(pipeline.scheduler().scans() >= 1);

    let report = pipeline.shutdown().await;
    assert_eq!(report.flush.flushed, 0);
}
