//! Upstream ingestion: transport seam, in-process bus and the reconnecting client.

pub mod backoff;
pub mod bus;
pub mod client;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use bus::{BusSource, EventBus};
pub use client::{ConnectionState, IngestionClient, IngestionConfig, IngestionStats};
pub use transport::{EventSource, EventStream};
