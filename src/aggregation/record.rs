//! Durable analytics record produced by a flush.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metadata::WorkoutType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationLevel {
    Session,
    Daily,
    Weekly,
    Monthly,
    Seasonal,
}

impl AggregationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationLevel::Session => "session",
            AggregationLevel::Daily => "daily",
            AggregationLevel::Weekly => "weekly",
            AggregationLevel::Monthly => "monthly",
            AggregationLevel::Seasonal => "seasonal",
        }
    }
}

impl std::str::FromStr for AggregationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(AggregationLevel::Session),
            "daily" => Ok(AggregationLevel::Daily),
            "weekly" => Ok(AggregationLevel::Weekly),
            "monthly" => Ok(AggregationLevel::Monthly),
            "seasonal" => Ok(AggregationLevel::Seasonal),
            other => Err(format!(
                "invalid aggregation level: {other} (expected session, daily, weekly, monthly or seasonal)"
            )),
        }
    }
}

/// Share of samples, in percent, per heart-rate zone.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeartRateZones {
    pub zone1: f64,
    pub zone2: f64,
    pub zone3: f64,
    pub zone4: f64,
    pub zone5: f64,
}

impl HeartRateZones {
    pub fn as_array(&self) -> [f64; 5] {
        [self.zone1, self.zone2, self.zone3, self.zone4, self.zone5]
    }

    pub fn from_array(values: [f64; 5]) -> Self {
        Self {
            zone1: values[0],
            zone2: values[1],
            zone3: values[2],
            zone4: values[3],
            zone5: values[4],
        }
    }

    pub fn total(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StrengthMetrics {
    pub total_reps: u64,
    pub total_sets: u64,
    /// Sum of weight x reps across sets.
    pub total_volume: f64,
    pub max_weight: f64,
    pub exercises_completed: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditioningMetrics {
    pub total_calories: Option<f64>,
    pub average_power: Option<f64>,
    pub max_power: Option<f64>,
    pub average_pace: Option<f64>,
    pub intervals_completed: u64,
    pub interval_count: u64,
    /// Seconds.
    pub interval_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgilityMetrics {
    pub drills_attempted: u64,
    pub drills_completed: u64,
    /// Seconds.
    pub total_drill_duration: f64,
    pub average_drill_duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PerformanceMetrics {
    Strength(StrengthMetrics),
    Conditioning(ConditioningMetrics),
    Agility(AgilityMetrics),
}

impl PerformanceMetrics {
    pub fn workout_type(&self) -> WorkoutType {
        match self {
            PerformanceMetrics::Strength(_) => WorkoutType::Strength,
            PerformanceMetrics::Conditioning(_) => WorkoutType::Conditioning,
            PerformanceMetrics::Agility(_) => WorkoutType::Agility,
        }
    }
}

/// Type-specific metrics plus custom fields that have no typed home yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub metrics: PerformanceMetrics,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

impl PerformanceReport {
    pub fn new(metrics: PerformanceMetrics) -> Self {
        Self {
            metrics,
            extensions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutAnalyticsRecord {
    pub record_id: String,
    pub session_id: String,
    pub player_id: String,
    pub team_id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer_id: Option<String>,
    pub workout_type: WorkoutType,
    pub aggregation_level: AggregationLevel,
    pub timestamp: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub sample_count: u64,
    /// Minutes.
    pub total_duration: f64,
    /// Minutes.
    pub active_time: f64,
    /// Minutes.
    pub rest_time: f64,
    pub average_heart_rate: f64,
    pub max_heart_rate: f64,
    pub heart_rate_zones: HeartRateZones,
    pub performance_metrics: PerformanceReport,
    pub completion_rate: f64,
    pub adherence_score: f64,
    pub skipped_exercises: u64,
    pub training_load: f64,
}
