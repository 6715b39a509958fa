//! Step retry policy

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Plan runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Delay between an action and reading the resulting state
    pub settle_ms: u64,
    /// Extra attempts for a step whose action fails
    pub step_retries: u32,
    pub action_timeout_ms: u64,
    /// Base for exponential backoff between attempts
    pub retry_backoff_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            settle_ms: 800,
            step_retries: 2,
            action_timeout_ms: 5_000,
            retry_backoff_ms: 250,
        }
    }
}

impl RunnerConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.step_retries
    }

    /// Backoff before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped at ten seconds.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
        let total_ms = self.retry_backoff_ms.saturating_mul(multiplier);
        Duration::from_millis(total_ms.min(10_000))
    }
}
