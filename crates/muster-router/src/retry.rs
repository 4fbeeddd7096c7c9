use serde::{Deserialize, Serialize};

/// Retry and backoff tuning for failed tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries allowed per task before failure becomes terminal.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Ceiling the exponential backoff never exceeds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry attempt `retry_count` (1-based): doubles per
    /// attempt, capped at `max_delay_ms`.
    pub fn backoff_delay_ms(&self, retry_count: u32) -> u64 {
        // Exponent capped so the shift cannot overflow.
        let exponent = retry_count.saturating_sub(1).min(63);
        self.initial_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms)
    }
}
