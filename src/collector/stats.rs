use serde::Serialize;

/// Collector health snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorStats {
    /// Distinct sessions with at least one open buffer
    pub active_session_buffers: usize,
    /// Open (session, player) buffers
    pub total_player_buffers: usize,
    /// Age of the oldest unflushed sample, 0 when nothing is pending
    pub oldest_buffer_age_ms: u64,
}
