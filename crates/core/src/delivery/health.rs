use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub available: bool,
    /// Failed attempt sequences since the last success.
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self {
            available: true,
            consecutive_failures: 0,
            last_success: None,
            last_attempt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HealthPolicy {
    /// Consecutive failed sequences before a channel is marked unavailable.
    pub unavailable_after: u32,
    /// An unavailable channel is probed again once its last attempt is this old.
    pub cooldown_secs: u64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            unavailable_after: 5,
            cooldown_secs: 3600,
        }
    }
}

impl HealthPolicy {
    /// Longest cooldown honoured; larger values are clamped.
    pub const MAX_COOLDOWN_SECS: u64 = 30 * 24 * 3600;

    fn cooldown(&self) -> Duration {
        let secs = self.cooldown_secs.min(Self::MAX_COOLDOWN_SECS);
        Duration::seconds(i64::try_from(secs).unwrap_or(0))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.unavailable_after >= 1,
            "health.unavailable_after must be at least 1"
        );
        anyhow::ensure!(
            self.cooldown_secs <= Self::MAX_COOLDOWN_SECS,
            "health.cooldown_secs must be at most {}",
            Self::MAX_COOLDOWN_SECS
        );
        Ok(())
    }
}

/// Delivery health shared across runs: per-channel status plus process-wide counters.
///
/// Owned by the orchestrator; `&mut` access is the only synchronisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryHealthTracker {
    #[serde(skip)]
    policy: HealthPolicy,
    #[serde(default)]
    channels: BTreeMap<String, ChannelStatus>,
    #[serde(default)]
    undelivered_count: u64,
    #[serde(default)]
    last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default)]
    last_notification: Option<DateTime<Utc>>,
}

impl DeliveryHealthTracker {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Reattaches a policy after loading persisted state.
    pub fn with_policy(mut self, policy: HealthPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    pub fn status(&self, channel_id: &str) -> Option<&ChannelStatus> {
        self.channels.get(channel_id)
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, &ChannelStatus)> {
        self.channels.iter().map(|(id, s)| (id.as_str(), s))
    }

    pub fn undelivered_count(&self) -> u64 {
        self.undelivered_count
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat
    }

    pub fn last_notification(&self) -> Option<DateTime<Utc>> {
        self.last_notification
    }

    /// Unknown and available channels are always attempted. An unavailable channel is
    /// attempted again only after the cooldown since its last attempt.
    pub fn should_attempt(&self, channel_id: &str, now: DateTime<Utc>) -> bool {
        let Some(status) = self.channels.get(channel_id) else {
            return true;
        };
        if status.available {
            return true;
        }
        status
            .last_attempt
            .map_or(true, |last| now - last >= self.policy.cooldown())
    }

    pub fn record_success(&mut self, channel_id: &str, now: DateTime<Utc>) {
        let status = self.channels.entry(channel_id.to_string()).or_default();
        if !status.available {
            tracing::info!(channel = %channel_id, "channel recovered");
        }
        status.available = true;
        status.consecutive_failures = 0;
        status.last_success = Some(now);
        status.last_attempt = Some(now);
    }

    pub fn record_failure(&mut self, channel_id: &str, now: DateTime<Utc>) {
        let threshold = self.policy.unavailable_after;
        let status = self.channels.entry(channel_id.to_string()).or_default();
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        status.last_attempt = Some(now);

        if status.available && status.consecutive_failures >= threshold {
            status.available = false;
            tracing::warn!(
                channel = %channel_id,
                failures = status.consecutive_failures,
                "channel marked unavailable"
            );
        }
    }

    pub fn record_undelivered(&mut self) {
        self.undelivered_count = self.undelivered_count.saturating_add(1);
    }

    pub fn record_notification(&mut self, now: DateTime<Utc>) {
        self.last_notification = Some(now);
    }

    pub fn record_heartbeat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = Some(now);
    }
}
