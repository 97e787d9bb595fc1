//! Transport seam between the ingestion client and an upstream bus.

use async_trait::async_trait;

use crate::error::ConnectionError;

/// Something the client can (re)connect to.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a new subscription. Slow handshakes are bounded by the caller.
    async fn connect(&self) -> Result<Box<dyn EventStream>, ConnectionError>;
}

/// One live subscription.
#[async_trait]
pub trait EventStream: Send {
    /// Next raw frame.
    ///
    /// `Ok(None)` is a graceful end of stream and is not retried. An error
    /// means the connection dropped and the client should reconnect.
    async fn next_frame(&mut self) -> Result<Option<String>, ConnectionError>;
}
