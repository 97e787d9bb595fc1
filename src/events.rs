//! Event schema for the inbound session stream.
//!
//! Frames arrive as JSON objects tagged by an `event` field. Decoding is strict:
//! unknown kinds and payloads that fail validation are reported as
//! [`MalformedEventError`] so the ingestion client can log and drop them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MalformedEventError;

pub const METRICS_UPDATE: &str = "metrics:update";
pub const EXERCISE_PROGRESS: &str = "exercise:progress";
pub const INTERVAL_PROGRESS: &str = "interval:progress";
pub const SESSION_UPDATE: &str = "session:update";

const KNOWN_KINDS: [&str; 4] = [
    METRICS_UPDATE,
    EXERCISE_PROGRESS,
    INTERVAL_PROGRESS,
    SESSION_UPDATE,
];

/// One physiological reading for a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub player_id: String,
    pub timestamp: DateTime<Utc>,
    pub heart_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace: Option<f64>,
    /// Cumulative calories burned so far in the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseProgressEvent {
    pub player_id: String,
    pub exercise_id: String,
    #[serde(default)]
    pub exercise_name: String,
    #[serde(default)]
    pub current_set: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Seconds spent on the set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalProgressEvent {
    pub player_id: String,
    pub interval_id: String,
    /// Seconds.
    #[serde(default)]
    pub duration: f64,
    pub completed: bool,
}

/// Buffered progress, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Exercise(ExerciseProgressEvent),
    Interval(IntervalProgressEvent),
}

impl ProgressEvent {
    pub fn completed(&self) -> bool {
        match self {
            ProgressEvent::Exercise(e) => e.completed,
            ProgressEvent::Interval(i) => i.completed,
        }
    }

    pub fn player_id(&self) -> &str {
        match self {
            ProgressEvent::Exercise(e) => &e.player_id,
            ProgressEvent::Interval(i) => &i.player_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled sessions receive no further data.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

/// A decoded frame from the upstream bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum InboundEvent {
    #[serde(rename = "metrics:update")]
    MetricSample {
        #[serde(rename = "sessionId")]
        session_id: String,
        sample: MetricSample,
    },
    #[serde(rename = "exercise:progress")]
    ExerciseProgress {
        #[serde(rename = "sessionId")]
        session_id: String,
        progress: ExerciseProgressEvent,
    },
    #[serde(rename = "interval:progress")]
    IntervalProgress {
        #[serde(rename = "sessionId")]
        session_id: String,
        progress: IntervalProgressEvent,
    },
    #[serde(rename = "session:update")]
    SessionUpdate {
        #[serde(rename = "sessionId")]
        session_id: String,
        status: SessionStatus,
    },
}

impl InboundEvent {
    pub fn decode(raw: &str) -> Result<Self, MalformedEventError> {
        let value: Value = serde_json::from_str(raw).map_err(MalformedEventError::InvalidJson)?;
        let kind = value
            .get("event")
            .and_then(Value::as_str)
            .ok_or(MalformedEventError::MissingKind)?
            .to_string();
        if !KNOWN_KINDS.contains(&kind.as_str()) {
            return Err(MalformedEventError::UnknownKind(kind));
        }
        let event: InboundEvent = serde_json::from_value(value)
            .map_err(|source| MalformedEventError::InvalidPayload { kind, source })?;
        event.validate()?;
        Ok(event)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn session_id(&self) -> &str {
        match self {
            InboundEvent::MetricSample { session_id, .. }
            | InboundEvent::ExerciseProgress { session_id, .. }
            | InboundEvent::IntervalProgress { session_id, .. }
            | InboundEvent::SessionUpdate { session_id, .. } => session_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::MetricSample { .. } => METRICS_UPDATE,
            InboundEvent::ExerciseProgress { .. } => EXERCISE_PROGRESS,
            InboundEvent::IntervalProgress { .. } => INTERVAL_PROGRESS,
            InboundEvent::SessionUpdate { .. } => SESSION_UPDATE,
        }
    }

    fn validate(&self) -> Result<(), MalformedEventError> {
        require_non_empty("sessionId", self.session_id())?;
        match self {
            InboundEvent::MetricSample { sample, .. } => {
                require_non_empty("playerId", &sample.player_id)?;
                if !sample.heart_rate.is_finite() || sample.heart_rate < 0.0 {
                    return Err(MalformedEventError::InvalidField {
                        field: "heartRate",
                        reason: format!("{} is not a valid heart rate", sample.heart_rate),
                    });
                }
                Ok(())
            }
            InboundEvent::ExerciseProgress { progress, .. } => {
                require_non_empty("playerId", &progress.player_id)?;
                require_non_empty("exerciseId", &progress.exercise_id)
            }
            InboundEvent::IntervalProgress { progress, .. } => {
                require_non_empty("playerId", &progress.player_id)?;
                require_non_empty("intervalId", &progress.interval_id)
            }
            InboundEvent::SessionUpdate { .. } => Ok(()),
        }
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), MalformedEventError> {
    if value.trim().is_empty() {
        return Err(MalformedEventError::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}
