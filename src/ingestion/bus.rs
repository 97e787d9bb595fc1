//! In-process event bus implementing the transport seam.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::ConnectionError;
use crate::events::InboundEvent;
use crate::ingestion::transport::{EventSource, EventStream};

enum BusFrame {
    Message(String),
    End,
}

#[derive(Default)]
struct BusState {
    subscriber: Option<UnboundedSender<BusFrame>>,
    fail_connects: u32,
    stall_connects: bool,
    connects: u32,
}

/// Publishing half. Frames published while nobody is connected are dropped.
#[derive(Clone)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

/// Connecting half, handed to the ingestion client.
#[derive(Clone)]
pub struct BusSource {
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    pub fn new_pair() -> (Self, BusSource) {
        let state = Arc::new(Mutex::new(BusState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            BusSource { state },
        )
    }

    /// Returns whether a subscriber received the frame.
    pub fn publish(&self, frame: impl Into<String>) -> bool {
        let state = self.state.lock();
        match &state.subscriber {
            Some(subscriber) => subscriber.send(BusFrame::Message(frame.into())).is_ok(),
            None => false,
        }
    }

    pub fn publish_event(&self, event: &InboundEvent) -> Result<bool, serde_json::Error> {
        Ok(self.publish(event.encode()?))
    }

    /// Drop the current subscription without a close frame.
    pub fn sever(&self) {
        self.state.lock().subscriber = None;
    }

    /// End the current subscription gracefully.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if let Some(subscriber) = state.subscriber.take() {
            let _ = subscriber.send(BusFrame::End);
        }
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().fail_connects = count;
    }

    /// Make connection attempts hang until switched back.
    pub fn stall_connects(&self, stall: bool) {
        self.state.lock().stall_connects = stall;
    }

    /// Connection attempts seen, successful or not.
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connects
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .subscriber
            .as_ref()
            .is_some_and(|s| !s.is_closed())
    }
}

#[async_trait]
impl EventSource for BusSource {
    async fn connect(&self) -> Result<Box<dyn EventStream>, ConnectionError> {
        let stalled = {
            let mut state = self.state.lock();
            state.connects += 1;
            state.stall_connects
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(ConnectionError::Transport("connection refused".to_string()));
        }
        let (sender, receiver) = unbounded_channel();
        state.subscriber = Some(sender);
        Ok(Box::new(BusStream { receiver }))
    }
}

struct BusStream {
    receiver: UnboundedReceiver<BusFrame>,
}

#[async_trait]
impl EventStream for BusStream {
    async fn next_frame(&mut self) -> Result<Option<String>, ConnectionError> {
        match self.receiver.recv().await {
            Some(BusFrame::Message(raw)) => Ok(Some(raw)),
            Some(BusFrame::End) => Ok(None),
            None => Err(ConnectionError::Closed),
        }
    }
}
