//! Error types for the session metrics pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::types::SessionKey;

/// Errors raised by a persistence gateway.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Persistence unavailable: {0}")]
    Unavailable(String),

    #[error("Record rejected: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
}

/// Transport-level failures of the ingestion channel.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed by remote")]
    Closed,

    #[error("Gave up reconnecting after {attempts} attempts")]
    GaveUp { attempts: u32 },
}

/// An inbound frame that could not be turned into an event.
#[derive(Debug, Error)]
pub enum MalformedEventError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Missing event kind")]
    MissingKind,

    #[error("Unknown event kind: {0}")]
    UnknownKind(String),

    #[error("Invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Top-level pipeline error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Malformed event: {0}")]
    Malformed(#[from] MalformedEventError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Flush of {key} failed: {source}")]
    Flush {
        key: SessionKey,
        #[source]
        source: PersistenceError,
    },

    #[error("Dispatch channel closed")]
    ChannelClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}
