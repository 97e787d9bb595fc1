//! Session metadata used to hydrate a new buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_ID: &str = "unknown";

/// Kind of workout; selects which performance metrics a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutType {
    Strength,
    Conditioning,
    Agility,
}

impl WorkoutType {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkoutType::Strength => "strength",
            WorkoutType::Conditioning => "conditioning",
            WorkoutType::Agility => "agility",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub team_id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer_id: Option<String>,
    pub workout_type: WorkoutType,
    pub started_at: DateTime<Utc>,
}

impl SessionMetadata {
    /// Stand-in used when the session is not known to the store yet.
    pub fn fallback(started_at: DateTime<Utc>) -> Self {
        Self {
            team_id: UNKNOWN_ID.to_string(),
            organization_id: UNKNOWN_ID.to_string(),
            trainer_id: None,
            workout_type: WorkoutType::Strength,
            started_at,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.team_id == UNKNOWN_ID && self.organization_id == UNKNOWN_ID
    }
}
