//! Reconnect-resilient ingestion client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ConnectionError;
use crate::events::InboundEvent;
use crate::ingestion::backoff::ReconnectPolicy;
use crate::ingestion::transport::{EventSource, EventStream};

/// Connection and reconnect settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_handshake_timeout_ms() -> u64 {
    15_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl IngestionConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.handshake_timeout_ms == 0 {
            return Err("handshake_timeout_ms must be greater than zero".to_string());
        }
        if self.reconnect_base_delay_ms > self.reconnect_max_delay_ms {
            return Err(format!(
                "reconnect_base_delay_ms ({}) exceeds reconnect_max_delay_ms ({})",
                self.reconnect_base_delay_ms, self.reconnect_max_delay_ms
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    GivingUp,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting { .. } => "reconnecting",
            ConnectionState::GivingUp => "giving_up",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionStats {
    pub forwarded: u64,
    pub malformed: u64,
    pub reconnects: u64,
}

enum PumpEnd {
    Shutdown,
    UpstreamClosed,
    ChannelClosed,
    Dropped(ConnectionError),
}

/// Subscribes to an [`EventSource`], decodes frames and forwards them to the
/// dispatcher channel.
///
/// The first connection must complete within the handshake timeout or
/// [`IngestionClient::run`] fails. Later drops go through exponential
/// backoff until `max_reconnect_attempts` is exhausted.
pub struct IngestionClient {
    source: Arc<dyn EventSource>,
    events: Mutex<Option<mpsc::Sender<InboundEvent>>>,
    config: IngestionConfig,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Sender<bool>,
    forwarded: AtomicU64,
    malformed: AtomicU64,
    reconnects: AtomicU64,
}

impl IngestionClient {
    pub fn new(
        source: Arc<dyn EventSource>,
        events: mpsc::Sender<InboundEvent>,
        config: IngestionConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        Self {
            source,
            events: Mutex::new(Some(events)),
            config,
            state,
            shutdown,
            forwarded: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> IngestionStats {
        IngestionStats {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }

    /// Stop the run loop and release the dispatcher channel.
    pub fn disconnect(&self) {
        self.shutdown.send_replace(true);
        self.events.lock().take();
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<Result<(), ConnectionError>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Connect, then pump frames until disconnect, a graceful upstream close,
    /// or reconnects run out.
    pub async fn run(&self) -> Result<(), ConnectionError> {
        let Some(events) = self.events.lock().clone() else {
            debug!("ingestion client already disconnected");
            return Ok(());
        };
        let mut shutdown = self.shutdown.subscribe();

        let mut stream = self.connect().await?;
        loop {
            match self.pump(stream.as_mut(), &events, &mut shutdown).await {
                PumpEnd::Shutdown => {
                    self.set_state(ConnectionState::Disconnected);
                    info!("ingestion client disconnected");
                    return Ok(());
                }
                PumpEnd::UpstreamClosed => {
                    self.set_state(ConnectionState::Disconnected);
                    info!("upstream closed the stream, not reconnecting");
                    return Ok(());
                }
                PumpEnd::ChannelClosed => {
                    self.set_state(ConnectionState::Disconnected);
                    warn!("dispatcher channel closed, stopping ingestion");
                    return Ok(());
                }
                PumpEnd::Dropped(err) => {
                    warn!(error = %err, "upstream connection lost");
                    match self.reconnect(&mut shutdown).await? {
                        Some(next) => stream = next,
                        None => {
                            self.set_state(ConnectionState::Disconnected);
                            info!("ingestion client disconnected while reconnecting");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Initial connection bounded by the handshake timeout.
    async fn connect(&self) -> Result<Box<dyn EventStream>, ConnectionError> {
        self.set_state(ConnectionState::Connecting);
        let timeout = self.config.handshake_timeout();
        let result = match tokio::time::timeout(timeout, self.source.connect()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::HandshakeTimeout(timeout)),
        };
        match result {
            Ok(stream) => {
                self.set_state(ConnectionState::Connected);
                info!("connected to upstream");
                Ok(stream)
            }
            Err(err) => {
                self.set_state(ConnectionState::Disconnected);
                error!(error = %err, "initial upstream connection failed");
                Err(err)
            }
        }
    }

    async fn pump(
        &self,
        stream: &mut dyn EventStream,
        events: &mpsc::Sender<InboundEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> PumpEnd {
        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown_signal(shutdown) => return PumpEnd::Shutdown,
                frame = stream.next_frame() => frame,
            };
            let raw = match frame {
                Ok(Some(raw)) => raw,
                Ok(None) => return PumpEnd::UpstreamClosed,
                Err(err) => return PumpEnd::Dropped(err),
            };
            match InboundEvent::decode(&raw) {
                Ok(event) => {
                    if events.send(event).await.is_err() {
                        return PumpEnd::ChannelClosed;
                    }
                    self.forwarded.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.malformed.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %err, "dropping malformed frame");
                }
            }
        }
    }

    /// `Ok(None)` when disconnect was requested mid-way.
    async fn reconnect(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<Box<dyn EventStream>>, ConnectionError> {
        let policy = ReconnectPolicy::from(&self.config);
        let timeout = self.config.handshake_timeout();

        for attempt in 1..=policy.max_attempts {
            self.set_state(ConnectionState::Reconnecting { attempt });
            let delay = policy.delay(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "waiting before reconnect");

            tokio::select! {
                biased;
                _ = shutdown_signal(shutdown) => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
            let result = tokio::select! {
                biased;
                _ = shutdown_signal(shutdown) => return Ok(None),
                result = tokio::time::timeout(timeout, self.source.connect()) => result,
            };

            match result {
                Ok(Ok(stream)) => {
                    self.reconnects.fetch_add(1, Ordering::Relaxed);
                    self.set_state(ConnectionState::Connected);
                    info!(attempt, "reconnected to upstream");
                    return Ok(Some(stream));
                }
                Ok(Err(err)) => warn!(attempt, error = %err, "reconnect attempt failed"),
                Err(_) => warn!(
                    attempt,
                    timeout_ms = timeout.as_millis() as u64,
                    "reconnect attempt timed out"
                ),
            }
        }

        self.set_state(ConnectionState::GivingUp);
        error!(
            attempts = policy.max_attempts,
            "giving up on upstream connection"
        );
        Err(ConnectionError::GaveUp {
            attempts: policy.max_attempts,
        })
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = previous.as_str(), to = state.as_str(), "connection state changed");
        }
    }
}

async fn shutdown_signal(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
