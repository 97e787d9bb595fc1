//! Integration tests for upstream reconnection under paused time

use std::sync::Arc;
use std::time::Duration;

use pulse::error::ConnectionError;
use pulse::events::InboundEvent;
use pulse::ingestion::{ConnectionState, EventBus, IngestionClient, IngestionConfig};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::integration::test_utils::metric_frame;

fn client(
    config: IngestionConfig,
) -> (EventBus, Arc<IngestionClient>, mpsc::Receiver<InboundEvent>) {
    let (bus, source) = EventBus::new_pair();
    let (tx, rx) = mpsc::channel(64);
    let client = Arc::new(IngestionClient::new(Arc::new(source), tx, config));
    (bus, client, rx)
}

/// Poll in virtual time until `ready` holds.
async fn wait_until(mut ready: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if ready() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn severed_stream_reconnects_with_backoff() {
    let (bus, client, mut rx) = client(IngestionConfig::default());
    let handle = Arc::clone(&client).spawn();
    wait_until(|| client.state() == ConnectionState::Connected).await;

    bus.fail_next_connects(2);
    let severed_at = Instant::now();
    bus.sever();

    wait_until(|| client.stats().reconnects == 1).await;
    assert!(severed_at.elapsed() >= Duration::from_secs(7));
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(bus.connect_count(), 4);

    assert!(bus.publish(metric_frame("s1", "p1", "2026-03-02T17:30:00Z", 120.0)));
    let event = rx.recv().await.unwrap();
    assert_eq!(event.session_id(), "s1");

    client.disconnect();
    handle.await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn exhausted_attempts_give_up() {
    let (bus, client, _rx) = client(IngestionConfig {
        max_reconnect_attempts: 3,
        ..IngestionConfig::default()
    });
    let handle = Arc::clone(&client).spawn();
    wait_until(|| client.state() == ConnectionState::Connected).await;

    bus.fail_next_connects(100);
    bus.sever();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, ConnectionError::GaveUp { attempts: 3 }));
    assert_eq!(client.state(), ConnectionState::GivingUp);
    assert_eq!(bus.connect_count(), 4);
    assert_eq!(client.stats().reconnects, 0);
}

#[tokio::test(start_paused = true)]
async fn successful_reconnect_resets_the_attempt_budget() {
    let (bus, client, _rx) = client(IngestionConfig {
        max_reconnect_attempts: 3,
        ..IngestionConfig::default()
    });
    let handle = Arc::clone(&client).spawn();
    wait_until(|| client.state() == ConnectionState::Connected).await;

    for round in 1..=2u64 {
        bus.fail_next_connects(2);
        bus.sever();
        wait_until(|| client.stats().reconnects == round).await;
        assert_eq!(client.state(), ConnectionState::Connected);
    }
    assert_eq!(bus.connect_count(), 7);

    client.disconnect();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn stalled_reconnect_attempts_time_out() {
    let (bus, client, _rx) = client(IngestionConfig {
        max_reconnect_attempts: 2,
        handshake_timeout_ms: 5_000,
        ..IngestionConfig::default()
    });
    let handle = Arc::clone(&client).spawn();
    wait_until(|| client.state() == ConnectionState::Connected).await;

    bus.stall_connects(true);
    let severed_at = Instant::now();
    bus.sever();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, ConnectionError::GaveUp { attempts: 2 }));
    // 1s + 5s timeout, then 2s + 5s timeout
    assert!(severed_at.elapsed() >= Duration::from_secs(13));
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_backoff_stops_cleanly() {
    let (bus, client, _rx) = client(IngestionConfig {
        reconnect_base_delay_ms: 10_000,
        ..IngestionConfig::default()
    });
    let handle = Arc::clone(&client).spawn();
    wait_until(|| client.state() == ConnectionState::Connected).await;

    bus.sever();
    wait_until(|| matches!(client.state(), ConnectionState::Reconnecting { attempt: 1 })).await;

    client.disconnect();
    handle.await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(bus.connect_count(), 1);
}
