use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-channel retry schedule. Delays are in seconds so the policy reads naturally in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_secs: f64,
    pub backoff_factor: f64,
    pub max_delay_secs: f64,
    /// Upper bound on a single send attempt. An elapsed timeout counts as a failed attempt.
    pub attempt_timeout_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 2.0,
            backoff_factor: 1.5,
            max_delay_secs: 60.0,
            attempt_timeout_secs: 30.0,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.max_attempts >= 1, "max_attempts must be at least 1");
        anyhow::ensure!(
            self.base_delay_secs.is_finite() && self.base_delay_secs >= 0.0,
            "base_delay_secs must be a non-negative number, got {}",
            self.base_delay_secs
        );
        anyhow::ensure!(
            self.backoff_factor.is_finite() && self.backoff_factor >= 1.0,
            "backoff_factor must be >= 1, got {}",
            self.backoff_factor
        );
        anyhow::ensure!(
            self.max_delay_secs.is_finite() && self.max_delay_secs >= self.base_delay_secs,
            "max_delay_secs must be >= base_delay_secs, got {}",
            self.max_delay_secs
        );
        anyhow::ensure!(
            self.attempt_timeout_secs.is_finite() && self.attempt_timeout_secs > 0.0,
            "attempt_timeout_secs must be positive, got {}",
            self.attempt_timeout_secs
        );
        Ok(())
    }

    /// Wait between attempt `attempt` and the next one:
    /// `min(max_delay, base_delay * backoff_factor^(attempt - 1))`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = (self.base_delay_secs * self.backoff_factor.powi(exp)).min(self.max_delay_secs);
        Duration::try_from_secs_f64(secs).unwrap_or_else(|_| self.max_delay())
    }

    pub fn max_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_delay_secs).unwrap_or(Duration::ZERO)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.attempt_timeout_secs).unwrap_or(Duration::from_secs(30))
    }
}
