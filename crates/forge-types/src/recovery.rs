//! Retry and backoff configuration for resuming checkpointed runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How many times a checkpointed run is retried and how long to wait between tries.
///
/// ```toml
/// [recovery]
/// max_attempts = 5
/// base_delay_ms = 200
/// exponential = true
/// max_delay_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    /// Total attempts, including the first one (default 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds (default 100).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Double the delay after every failed attempt (default true).
    #[serde(default = "default_exponential")]
    pub exponential: bool,
    /// Upper bound for exponential delays, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_exponential() -> bool {
    true
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            exponential: default_exponential(),
            max_delay_ms: None,
        }
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl RecoveryPolicy {
    /// Fixed delay between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: saturating_millis(delay),
            exponential: false,
            max_delay_ms: None,
        }
    }

    /// Exponential backoff `min(base * 2^(attempt-1), max_delay)`.
    pub fn exponential(max_attempts: u32, base: Duration, max_delay: Option<Duration>) -> Self {
        Self {
            max_attempts,
            base_delay_ms: saturating_millis(base),
            exponential: true,
            max_delay_ms: max_delay.map(saturating_millis),
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt `attempt` (1-based) before the next one.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let millis = if self.exponential {
            let shift = attempt.saturating_sub(1).min(63);
            let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
            self.base_delay_ms.saturating_mul(factor)
        } else {
            self.base_delay_ms
        };

        let capped = match self.max_delay_ms {
            Some(max) => millis.min(max),
            None => millis,
        };
        Duration::from_millis(capped)
    }
}
