//! Integration tests for session teardown driven through the dispatcher

use std::sync::Arc;

use pulse::collector::{DispatchSummary, EventDispatcher};
use pulse::events::{InboundEvent, SessionStatus};
use pulse::lifecycle::{LifecycleAction, SessionLifecycleHandler};
use pulse::types::SessionKey;
use tokio::sync::mpsc;

use crate::integration::test_utils::{metric_frame, status_frame, Harness};

fn decode(frames: &[String]) -> Vec<InboundEvent> {
    frames
        .iter()
        .map(|f| InboundEvent::decode(f).unwrap())
        .collect()
}

async fn run_frames(
    h: &Harness,
    lifecycle: Arc<SessionLifecycleHandler>,
    frames: &[String],
) -> DispatchSummary {
    let (tx, rx) = mpsc::channel(16);
    let dispatcher = EventDispatcher::new(Arc::clone(&h.collector), lifecycle);
    let handle = dispatcher.spawn(rx);
    for event in decode(frames) {
        tx.send(event).await.unwrap();
    }
    drop(tx);
    handle.await.unwrap()
}

#[tokio::test]
async fn completed_session_flushes_and_removes_every_player_buffer() {
    let h = Harness::new();
    let lifecycle = Arc::new(SessionLifecycleHandler::new(Arc::clone(&h.collector)));
    let frames = vec![
        metric_frame("s1", "p1", "2026-03-02T17:30:00Z", 120.0),
        metric_frame("s1", "p2", "2026-03-02T17:30:00Z", 150.0),
        metric_frame("s1", "p1", "2026-03-02T17:31:00Z", 130.0),
        metric_frame("s2", "p1", "2026-03-02T17:31:00Z", 110.0),
        status_frame("s1", "completed"),
    ];

    let summary = run_frames(&h, Arc::clone(&lifecycle), &frames).await;
    assert_eq!(summary.samples, 4);
    assert_eq!(summary.status_updates, 1);

    assert!(h.collector.session_keys("s1").is_empty());
    assert_eq!(h.collector.session_keys("s2").len(), 1);
    assert_eq!(h.gateway.records_for("s1", "p1")[0].sample_count, 2);
    assert_eq!(h.gateway.records_for("s1", "p2")[0].sample_count, 1);
    assert!(h.gateway.records_for("s2", "p1").is_empty());
    assert_eq!(lifecycle.status("s1"), Some(SessionStatus::Completed));
}

#[tokio::test]
async fn paused_then_resumed_session_keeps_buffering() {
    let h = Harness::new();
    let lifecycle = Arc::new(SessionLifecycleHandler::new(Arc::clone(&h.collector)));
    let frames = vec![
        metric_frame("s1", "p1", "2026-03-02T17:30:00Z", 120.0),
        status_frame("s1", "paused"),
        status_frame("s1", "active"),
        metric_frame("s1", "p1", "2026-03-02T17:31:00Z", 125.0),
    ];

    run_frames(&h, Arc::clone(&lifecycle), &frames).await;

    let view = h.collector.buffer_view(&SessionKey::new("s1", "p1")).unwrap();
    assert_eq!(view.sample_count, 2);
    assert_eq!(view.status, SessionStatus::Active);
    assert!(!view.closed);
    assert!(h.gateway.records().is_empty());
}

#[tokio::test]
async fn cancelled_session_with_failing_store_is_retried_then_evicted() {
    let h = Harness::new();
    let lifecycle = SessionLifecycleHandler::new(Arc::clone(&h.collector));
    h.ingest("s1", "p1", &[120.0, 140.0]).await;
    h.gateway.set_fail_records(true);

    let action = lifecycle.handle("s1", SessionStatus::Cancelled).await;
    let LifecycleAction::Flushed(report) = action else {
        panic!("expected a flush, got {action:?}");
    };
    assert_eq!(report.failed, 1);
    let view = h.collector.buffer_view(&SessionKey::new("s1", "p1")).unwrap();
    assert!(view.closed);
    assert_eq!(view.sample_count, 2);

    assert_eq!(
        lifecycle.handle("s1", SessionStatus::Completed).await,
        LifecycleAction::AlreadyEnded
    );

    h.gateway.set_fail_records(false);
    let report = h.collector.flush_due().await;
    assert_eq!(report.flushed, 1);
    assert_eq!(report.evicted, 1);
    assert!(h.collector.session_keys("s1").is_empty());
    assert_eq!(lifecycle.status("s1"), Some(SessionStatus::Cancelled));
}

#[tokio::test]
async fn late_samples_after_completion_open_a_fresh_buffer() {
    let h = Harness::new();
    let lifecycle = Arc::new(SessionLifecycleHandler::new(Arc::clone(&h.collector)));
    let frames = vec![
        metric_frame("s1", "p1", "2026-03-02T17:30:00Z", 120.0),
        status_frame("s1", "completed"),
        metric_frame("s1", "p1", "2026-03-02T17:32:00Z", 118.0),
    ];

    run_frames(&h, lifecycle, &frames).await;

    assert_eq!(h.gateway.records().len(), 1);
    let view = h.collector.buffer_view(&SessionKey::new("s1", "p1")).unwrap();
    assert_eq!(view.sample_count, 1);
}
