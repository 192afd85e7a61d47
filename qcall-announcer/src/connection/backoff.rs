//! Reconnection backoff policy

use std::time::Duration;

/// Exponential backoff bounded by a maximum delay and attempt count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retries before the connection is declared failed
    pub max_attempts: u32,
    /// Pause between the failure notice and the full reload
    pub reload_grace: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
            reload_grace: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry `attempt` (1-based): `min(base * 2^(attempt-1), max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// True once `attempt` retries have been used up
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}
