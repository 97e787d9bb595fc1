use std::time::Duration;

use crate::ingestion::IngestionConfig;

/// Exponential reconnect delays: `base * 2^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
        }
    }

    /// Delay before the given 1-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Sum of every delay if all attempts are used.
    pub fn total_budget(&self) -> Duration {
        (1..=self.max_attempts).map(|attempt| self.delay(attempt)).sum()
    }
}

impl From<&IngestionConfig> for ReconnectPolicy {
    fn from(config: &IngestionConfig) -> Self {
        Self::new(
            config.reconnect_base_delay(),
            config.reconnect_max_delay(),
            config.max_reconnect_attempts,
        )
    }
}
