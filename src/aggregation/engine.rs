//! Pure transform from a buffer snapshot to an analytics record.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::aggregation::record::{
    AgilityMetrics, AggregationLevel, ConditioningMetrics, PerformanceMetrics, PerformanceReport,
    StrengthMetrics, WorkoutAnalyticsRecord,
};
use crate::aggregation::zones::{training_load, zone_counts, zone_distribution};
use crate::collector::buffer::BufferSnapshot;
use crate::events::{ExerciseProgressEvent, IntervalProgressEvent, MetricSample, ProgressEvent};
use crate::metadata::WorkoutType;
use crate::types::new_record_id;

/// Aggregation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Max heart rate assumed when no player-specific value is known
    #[serde(default = "default_max_heart_rate")]
    pub default_max_heart_rate: f64,

    /// Share of the session counted as active time. The rest is rest time.
    #[serde(default = "default_active_time_ratio")]
    pub active_time_ratio: f64,
}

fn default_max_heart_rate() -> f64 {
    200.0
}

fn default_active_time_ratio() -> f64 {
    0.8
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            default_max_heart_rate: default_max_heart_rate(),
            active_time_ratio: default_active_time_ratio(),
        }
    }
}

impl AggregationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.default_max_heart_rate.is_finite() && self.default_max_heart_rate > 0.0) {
            return Err("default_max_heart_rate must be a positive number".to_string());
        }
        if !(0.0..=1.0).contains(&self.active_time_ratio) {
            return Err("active_time_ratio must be between 0 and 1".to_string());
        }
        Ok(())
    }
}

/// Build the session-level record for one flush.
///
/// Active and rest time are a fixed split of the total duration, not measured.
/// With no progress events the completion rate is 100: nothing assigned counts
/// as fully complete. Calories cover only this window: the latest cumulative
/// reading minus the snapshot's baseline.
pub fn aggregate(
    snapshot: &BufferSnapshot,
    config: &AggregationConfig,
    computed_at: DateTime<Utc>,
) -> WorkoutAnalyticsRecord {
    let samples = &snapshot.samples;
    let max_hr_reference = snapshot
        .max_heart_rate
        .filter(|hr| hr.is_finite() && *hr > 0.0)
        .unwrap_or(config.default_max_heart_rate);

    let period_start = samples.iter().map(|s| s.timestamp).min().unwrap_or(computed_at);
    let period_end = samples.iter().map(|s| s.timestamp).max().unwrap_or(computed_at);
    let total_duration = (period_end - period_start).num_milliseconds().max(0) as f64 / 60_000.0;
    let active_time = total_duration * config.active_time_ratio;

    let (average_heart_rate, max_heart_rate) = heart_rate_summary(samples);
    let zones = zone_distribution(zone_counts(
        samples.iter().map(|s| s.heart_rate),
        max_hr_reference,
    ));

    let completion_rate = completion_rate(&snapshot.progress);
    let skipped_exercises = snapshot.progress.iter().filter(|p| !p.completed()).count() as u64;

    WorkoutAnalyticsRecord {
        record_id: new_record_id(),
        session_id: snapshot.key.session_id.clone(),
        player_id: snapshot.key.player_id.clone(),
        team_id: snapshot.metadata.team_id.clone(),
        organization_id: snapshot.metadata.organization_id.clone(),
        trainer_id: snapshot.metadata.trainer_id.clone(),
        workout_type: snapshot.metadata.workout_type,
        aggregation_level: AggregationLevel::Session,
        timestamp: computed_at,
        period_start,
        period_end,
        sample_count: samples.len() as u64,
        total_duration,
        active_time,
        rest_time: total_duration - active_time,
        average_heart_rate,
        max_heart_rate,
        heart_rate_zones: zones,
        performance_metrics: performance_report(snapshot),
        completion_rate,
        adherence_score: completion_rate,
        skipped_exercises,
        training_load: training_load(total_duration, &zones),
    }
}

fn heart_rate_summary(samples: &[MetricSample]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let sum: f64 = samples.iter().map(|s| s.heart_rate).sum();
    let max = samples.iter().map(|s| s.heart_rate).fold(f64::MIN, f64::max);
    (sum / samples.len() as f64, max)
}

fn completion_rate(progress: &[ProgressEvent]) -> f64 {
    if progress.is_empty() {
        return 100.0;
    }
    let completed = progress.iter().filter(|p| p.completed()).count();
    completed as f64 / progress.len() as f64 * 100.0
}

fn performance_report(snapshot: &BufferSnapshot) -> PerformanceReport {
    let workout_type = snapshot.metadata.workout_type;
    let samples = &snapshot.samples;
    let progress = &snapshot.progress;
    let exercises: Vec<&ExerciseProgressEvent> = progress
        .iter()
        .filter_map(|p| match p {
            ProgressEvent::Exercise(e) => Some(e),
            ProgressEvent::Interval(_) => None,
        })
        .collect();
    let intervals: Vec<&IntervalProgressEvent> = progress
        .iter()
        .filter_map(|p| match p {
            ProgressEvent::Interval(i) => Some(i),
            ProgressEvent::Exercise(_) => None,
        })
        .collect();
    let total_calories = window_calories(snapshot);

    let metrics = match workout_type {
        WorkoutType::Strength => PerformanceMetrics::Strength(strength_metrics(&exercises)),
        WorkoutType::Conditioning => PerformanceMetrics::Conditioning(conditioning_metrics(
            samples,
            &intervals,
            total_calories,
        )),
        WorkoutType::Agility => PerformanceMetrics::Agility(agility_metrics(&exercises, &intervals)),
    };

    let mut report = PerformanceReport::new(metrics);
    if workout_type != WorkoutType::Conditioning {
        if let Some(calories) = total_calories {
            report.extensions.insert("total_calories".to_string(), json!(calories));
        }
    }
    if workout_type == WorkoutType::Strength && !intervals.is_empty() {
        let done = intervals.iter().filter(|i| i.completed).count();
        report.extensions.insert("intervals_completed".to_string(), json!(done));
    }
    report
}

fn window_calories(snapshot: &BufferSnapshot) -> Option<f64> {
    let last = snapshot.last_calories()?;
    let baseline = snapshot.calories_baseline.unwrap_or(0.0);
    Some((last - baseline).max(0.0))
}

fn strength_metrics(exercises: &[&ExerciseProgressEvent]) -> StrengthMetrics {
    let mut sets = HashSet::new();
    let mut completed_exercises = HashSet::new();
    let mut metrics = StrengthMetrics::default();
    for e in exercises {
        sets.insert((e.exercise_id.as_str(), e.current_set));
        if e.completed {
            completed_exercises.insert(e.exercise_id.as_str());
        }
        let reps = e.reps.unwrap_or(0);
        metrics.total_reps += u64::from(reps);
        if let Some(weight) = e.weight {
            metrics.total_volume += weight * f64::from(reps);
            metrics.max_weight = metrics.max_weight.max(weight);
        }
    }
    metrics.total_sets = sets.len() as u64;
    metrics.exercises_completed = completed_exercises.len() as u64;
    metrics
}

fn conditioning_metrics(
    samples: &[MetricSample],
    intervals: &[&IntervalProgressEvent],
    total_calories: Option<f64>,
) -> ConditioningMetrics {
    let power: Vec<f64> = samples.iter().filter_map(|s| s.power).collect();
    let pace: Vec<f64> = samples.iter().filter_map(|s| s.pace).collect();
    ConditioningMetrics {
        total_calories,
        average_power: mean(&power),
        max_power: power.iter().copied().reduce(f64::max),
        average_pace: mean(&pace),
        intervals_completed: intervals.iter().filter(|i| i.completed).count() as u64,
        interval_count: intervals.len() as u64,
        interval_duration: intervals.iter().map(|i| i.duration).sum(),
    }
}

fn agility_metrics(
    exercises: &[&ExerciseProgressEvent],
    intervals: &[&IntervalProgressEvent],
) -> AgilityMetrics {
    let durations: Vec<f64> = exercises
        .iter()
        .filter_map(|e| e.duration)
        .chain(intervals.iter().map(|i| i.duration))
        .collect();
    let completed = exercises.iter().filter(|e| e.completed).count()
        + intervals.iter().filter(|i| i.completed).count();
    AgilityMetrics {
        drills_attempted: (exercises.len() + intervals.len()) as u64,
        drills_completed: completed as u64,
        total_drill_duration: durations.iter().sum(),
        average_drill_duration: mean(&durations),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
