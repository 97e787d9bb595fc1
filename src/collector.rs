//! Session-scoped buffering of live samples.
//!
//! Buffers are keyed by [`SessionKey`](crate::types::SessionKey). The
//! collector is fed by a single [`EventDispatcher`] and drained by the
//! flush scheduler, the lifecycle handler and shutdown.

pub mod buffer;
pub mod dispatch;
pub mod service;
pub mod stats;

pub use buffer::{BufferSnapshot, BufferView, SessionBuffer};
pub use dispatch::{DispatchSummary, EventDispatcher};
pub use service::{CollectorConfig, FlushOutcome, FlushReport, MetricsCollector};
pub use stats::CollectorStats;
