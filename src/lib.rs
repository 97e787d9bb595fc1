//! Pulse: real-time training session metrics pipeline
//!
//! Ingests live per-player samples and progress events from an upstream bus,
//! buffers them per (session, player), and turns them into durable workout
//! analytics records on staleness, capacity, session end, or shutdown.

pub mod aggregation;
pub mod cli;
pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod events;
pub mod ingestion;
pub mod lifecycle;
pub mod logging;
pub mod metadata;
pub mod persistence;
pub mod pipeline;
pub mod scheduler;
pub mod types;
