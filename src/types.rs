//! Shared identifiers and helpers: buffer keys, timestamps and record ids.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

static RECORD_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies exactly one buffer: a player's participation in a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub session_id: String,
    pub player_id: String,
}

impl SessionKey {
    pub fn new(session_id: impl Into<String>, player_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            player_id: player_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.player_id)
    }
}

/// Current time as milliseconds since Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique analytics record id.
pub fn new_record_id() -> String {
    let ts = now_millis();
    let pid = std::process::id();
    let seq = RECORD_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("rec-{ts}-{pid}-{seq}")
}
