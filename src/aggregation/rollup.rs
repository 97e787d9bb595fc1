//! Roll session records up into daily, weekly, monthly or seasonal records.
//!
//! Records are grouped by player, workout type and calendar period of their
//! `period_start`. Heart-rate, power and pace averages are weighted by sample
//! count. Durations, calories and training load are summed, which is sound
//! because each session record only carries its own window. Completion is
//! averaged per record. Seasons are calendar years.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;

use crate::aggregation::record::{
    AggregationLevel, HeartRateZones, PerformanceMetrics, PerformanceReport,
    WorkoutAnalyticsRecord,
};
use crate::metadata::WorkoutType;
use crate::types::new_record_id;

/// Calendar bucket label for a timestamp at the given level.
pub fn period_key(level: AggregationLevel, at: DateTime<Utc>) -> String {
    match level {
        AggregationLevel::Session => at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        AggregationLevel::Daily => at.format("%Y-%m-%d").to_string(),
        AggregationLevel::Weekly => {
            let week = at.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        AggregationLevel::Monthly => at.format("%Y-%m").to_string(),
        AggregationLevel::Seasonal => at.format("%Y").to_string(),
    }
}

pub fn rollup(
    records: &[WorkoutAnalyticsRecord],
    level: AggregationLevel,
    computed_at: DateTime<Utc>,
) -> Vec<WorkoutAnalyticsRecord> {
    if level == AggregationLevel::Session {
        return records.to_vec();
    }

    let mut groups: BTreeMap<(String, WorkoutType, String), Vec<&WorkoutAnalyticsRecord>> =
        BTreeMap::new();
    for record in records {
        let period = period_key(level, record.period_start);
        groups
            .entry((record.player_id.clone(), record.workout_type, period))
            .or_default()
            .push(record);
    }

    groups
        .into_iter()
        .filter_map(|((_, _, period), group)| merge_group(&group, level, &period, computed_at))
        .collect()
}

fn merge_group(
    group: &[&WorkoutAnalyticsRecord],
    level: AggregationLevel,
    period: &str,
    computed_at: DateTime<Utc>,
) -> Option<WorkoutAnalyticsRecord> {
    let (first, rest) = group.split_first()?;
    let mut merged = (*first).clone();
    merged.record_id = new_record_id();
    merged.session_id = format!("{}:{}", level.as_str(), period);
    merged.aggregation_level = level;
    merged.timestamp = computed_at;

    let mut weighted_hr = first.average_heart_rate * first.sample_count as f64;
    let mut weighted_zones = scale(first.heart_rate_zones.as_array(), first.sample_count as f64);
    let mut completion_sum = first.completion_rate;
    let mut adherence_sum = first.adherence_score;

    for record in rest {
        let weight = record.sample_count as f64;
        let merged_weight = merged.sample_count as f64;
        merged.period_start = merged.period_start.min(record.period_start);
        merged.period_end = merged.period_end.max(record.period_end);
        merged.sample_count += record.sample_count;
        merged.total_duration += record.total_duration;
        merged.active_time += record.active_time;
        merged.rest_time += record.rest_time;
        merged.max_heart_rate = merged.max_heart_rate.max(record.max_heart_rate);
        merged.skipped_exercises += record.skipped_exercises;
        merged.training_load += record.training_load;
        weighted_hr += record.average_heart_rate * weight;
        for (acc, pct) in weighted_zones
            .iter_mut()
            .zip(record.heart_rate_zones.as_array())
        {
            *acc += pct * weight;
        }
        completion_sum += record.completion_rate;
        adherence_sum += record.adherence_score;
        merge_report(
            &mut merged.performance_metrics,
            merged_weight,
            &record.performance_metrics,
            weight,
        );
    }

    let total_samples = merged.sample_count as f64;
    if total_samples > 0.0 {
        merged.average_heart_rate = weighted_hr / total_samples;
        merged.heart_rate_zones =
            HeartRateZones::from_array(scale(weighted_zones, 1.0 / total_samples));
    }
    merged.completion_rate = completion_sum / group.len() as f64;
    merged.adherence_score = adherence_sum / group.len() as f64;
    Some(merged)
}

fn scale(values: [f64; 5], factor: f64) -> [f64; 5] {
    values.map(|v| v * factor)
}

fn merge_report(
    into: &mut PerformanceReport,
    into_weight: f64,
    other: &PerformanceReport,
    other_weight: f64,
) {
    match (&mut into.metrics, &other.metrics) {
        (PerformanceMetrics::Strength(a), PerformanceMetrics::Strength(b)) => {
            a.total_reps += b.total_reps;
            a.total_sets += b.total_sets;
            a.total_volume += b.total_volume;
            a.max_weight = a.max_weight.max(b.max_weight);
            a.exercises_completed += b.exercises_completed;
        }
        (PerformanceMetrics::Conditioning(a), PerformanceMetrics::Conditioning(b)) => {
            a.total_calories = sum_options(a.total_calories, b.total_calories);
            a.average_power =
                weighted_mean_options(a.average_power, into_weight, b.average_power, other_weight);
            a.max_power = max_options(a.max_power, b.max_power);
            a.average_pace =
                weighted_mean_options(a.average_pace, into_weight, b.average_pace, other_weight);
            a.intervals_completed += b.intervals_completed;
            a.interval_count += b.interval_count;
            a.interval_duration += b.interval_duration;
        }
        (PerformanceMetrics::Agility(a), PerformanceMetrics::Agility(b)) => {
            a.drills_attempted += b.drills_attempted;
            a.drills_completed += b.drills_completed;
            a.total_drill_duration += b.total_drill_duration;
            a.average_drill_duration = if a.drills_attempted > 0 {
                Some(a.total_drill_duration / a.drills_attempted as f64)
            } else {
                None
            };
        }
        // Groups share a workout type, so mismatches only come from hand-built records.
        _ => {}
    }

    for (key, value) in &other.extensions {
        match (into.extensions.get(key).and_then(Value::as_f64), value.as_f64()) {
            (Some(a), Some(b)) => {
                into.extensions.insert(key.clone(), Value::from(a + b));
            }
            _ => {
                into.extensions
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
    }
}

fn sum_options(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    }
}

/// Falls back to a plain mean when neither side carries samples.
fn weighted_mean_options(a: Option<f64>, wa: f64, b: Option<f64>, wb: f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) if wa + wb > 0.0 => Some((a * wa + b * wb) / (wa + wb)),
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (a, b) => a.or(b),
    }
}

fn max_options(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
