//! Heart-rate zone bucketing and zone-weighted training load.

use crate::aggregation::record::HeartRateZones;

/// Lower bounds (percent of max heart rate) for zones 2 through 5.
const ZONE_FLOORS: [f64; 4] = [60.0, 70.0, 80.0, 90.0];

/// Zone index (0-based) for a heart rate given the player's max.
pub fn zone_index(heart_rate: f64, max_heart_rate: f64) -> usize {
    let pct = heart_rate / max_heart_rate * 100.0;
    ZONE_FLOORS.iter().take_while(|floor| pct >= **floor).count()
}

pub fn zone_counts(heart_rates: impl IntoIterator<Item = f64>, max_heart_rate: f64) -> [u64; 5] {
    let mut counts = [0u64; 5];
    for hr in heart_rates {
        counts[zone_index(hr, max_heart_rate)] += 1;
    }
    counts
}

/// Bucket counts as percentages of the total. All zeros for an empty set.
pub fn zone_distribution(counts: [u64; 5]) -> HeartRateZones {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return HeartRateZones::default();
    }
    let mut pct = [0.0f64; 5];
    for (slot, count) in pct.iter_mut().zip(counts) {
        *slot = count as f64 * 100.0 / total as f64;
    }
    HeartRateZones::from_array(pct)
}

/// Duration in minutes scaled by the zone mix, zone n weighted n.
pub fn training_load(duration_minutes: f64, zones: &HeartRateZones) -> f64 {
    let intensity: f64 = zones
        .as_array()
        .iter()
        .enumerate()
        .map(|(i, pct)| pct / 100.0 * (i + 1) as f64)
        .sum();
    duration_minutes * intensity
}
