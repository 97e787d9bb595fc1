//! CLI presentation: text tables and JSON for command results.

use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde::Serialize;

use crate::aggregation::WorkoutAnalyticsRecord;
use crate::collector::CollectorStats;

/// Result of `pulse replay`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub lines: usize,
    pub forwarded: u64,
    pub malformed: u64,
    pub dispatched: u64,
    pub records_flushed: usize,
    pub flush_failures: usize,
    pub drained: bool,
    pub remaining: CollectorStats,
}

pub fn format_replay_summary_text(summary: &ReplaySummary) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Lines read".to_string(), summary.lines.to_string()]);
    table.add_row(vec!["Frames forwarded".to_string(), summary.forwarded.to_string()]);
    table.add_row(vec!["Malformed frames".to_string(), summary.malformed.to_string()]);
    table.add_row(vec!["Events dispatched".to_string(), summary.dispatched.to_string()]);
    table.add_row(vec!["Records flushed".to_string(), summary.records_flushed.to_string()]);
    table.add_row(vec!["Flush failures".to_string(), summary.flush_failures.to_string()]);
    table.add_row(vec![
        "Open buffers".to_string(),
        summary.remaining.total_player_buffers.to_string(),
    ]);
    let mut out = format!("{}", table);
    if !summary.drained {
        out.push_str("\nwarning: dispatcher did not drain before shutdown");
    }
    out
}

pub fn format_records_text(records: &[WorkoutAnalyticsRecord]) -> String {
    if records.is_empty() {
        return "No records found.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Player",
        "Workout",
        "Level",
        "Period start",
        "Samples",
        "Duration (min)",
        "Avg HR",
        "Max HR",
        "Completion",
        "Load",
    ]);
    for record in records {
        table.add_row(vec![
            record.player_id.clone(),
            record.workout_type.as_str().to_string(),
            record.aggregation_level.as_str().to_string(),
            record.period_start.format("%Y-%m-%d %H:%M").to_string(),
            record.sample_count.to_string(),
            format!("{:.1}", record.total_duration),
            format!("{:.0}", record.average_heart_rate),
            format!("{:.0}", record.max_heart_rate),
            format!("{:.0}%", record.completion_rate),
            format!("{:.1}", record.training_load),
        ]);
    }
    format!("{}", table)
}

pub fn format_records_json(records: &[WorkoutAnalyticsRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(records)
}
