//! Aggregation engine: buffered samples to analytics records.

pub mod engine;
pub mod record;
pub mod rollup;
pub mod zones;

pub use engine::{aggregate, AggregationConfig};
pub use record::{
    AgilityMetrics, AggregationLevel, ConditioningMetrics, HeartRateZones, PerformanceMetrics,
    PerformanceReport, StrengthMetrics, WorkoutAnalyticsRecord,
};
pub use rollup::rollup;
