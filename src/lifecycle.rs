//! Session lifecycle: terminal statuses force a flush and tear buffers down.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::collector::{FlushReport, MetricsCollector};
use crate::events::SessionStatus;

/// What a status transition led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Non-terminal status stored on the session's buffers.
    Recorded,
    /// First terminal status; buffers were flushed.
    Flushed(FlushReport),
    /// Terminal status for a session that already ended.
    AlreadyEnded,
}

/// Tracks the last status of each session.
///
/// Sessions that ended are moved out of the live map and remembered for the
/// collector's `ended_session_retention`, long enough to absorb repeated
/// terminal signals. After that they are pruned.
pub struct SessionLifecycleHandler {
    collector: Arc<MetricsCollector>,
    statuses: Mutex<HashMap<String, SessionStatus>>,
    ended: Mutex<HashMap<String, EndedSession>>,
}

#[derive(Debug, Clone, Copy)]
struct EndedSession {
    status: SessionStatus,
    ended_at_ms: u64,
}

impl SessionLifecycleHandler {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self {
            collector,
            statuses: Mutex::new(HashMap::new()),
            ended: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle(&self, session_id: &str, status: SessionStatus) -> LifecycleAction {
        self.prune_ended();

        let reopened = {
            let mut ended = self.ended.lock();
            if ended.contains_key(session_id) && status.is_terminal() {
                None
            } else {
                Some(ended.remove(session_id).is_some())
            }
        };
        let Some(reopened) = reopened else {
            debug!(
                session_id = %session_id,
                status = status.as_str(),
                "session already ended, ignoring repeated terminal status"
            );
            return LifecycleAction::AlreadyEnded;
        };

        if reopened {
            warn!(
                session_id = %session_id,
                status = status.as_str(),
                "status update for a session that already ended"
            );
        }

        if !status.is_terminal() {
            self.statuses.lock().insert(session_id.to_string(), status);
            self.collector.on_session_update(session_id, status).await;
            return LifecycleAction::Recorded;
        }

        let now_ms = self.collector.clock().now_millis();
        self.statuses.lock().remove(session_id);
        self.ended.lock().insert(
            session_id.to_string(),
            EndedSession {
                status,
                ended_at_ms: now_ms,
            },
        );

        let report = self.collector.on_session_update(session_id, status).await;
        info!(
            session_id = %session_id,
            flushed = report.flushed,
            failed = report.failed,
            evicted = report.evicted,
            "session teardown finished"
        );
        LifecycleAction::Flushed(report)
    }

    /// Drop ended sessions older than the retention window. Returns how many
    /// were dropped.
    pub fn prune_ended(&self) -> usize {
        let now_ms = self.collector.clock().now_millis();
        let retention_ms = self
            .collector
            .config()
            .ended_session_retention()
            .as_millis() as u64;
        let mut ended = self.ended.lock();
        let before = ended.len();
        ended.retain(|_, e| now_ms.saturating_sub(e.ended_at_ms) < retention_ms);
        let pruned = before - ended.len();
        if pruned > 0 {
            debug!(pruned, remaining = ended.len(), "pruned ended sessions");
        }
        pruned
    }

    /// Last status seen for a session.
    pub fn status(&self, session_id: &str) -> Option<SessionStatus> {
        if let Some(status) = self.statuses.lock().get(session_id) {
            return Some(*status);
        }
        self.ended.lock().get(session_id).map(|e| e.status)
    }

    pub fn forget(&self, session_id: &str) -> Option<SessionStatus> {
        let live = self.statuses.lock().remove(session_id);
        let ended = self.ended.lock().remove(session_id).map(|e| e.status);
        live.or(ended)
    }

    pub fn tracked_sessions(&self) -> usize {
        self.statuses.lock().len() + self.ended.lock().len()
    }
}
