//! Multi-channel fan-out with per-channel retry, health tracking and a file backup of last
//! resort.

pub mod backup;
pub mod health;
pub mod heartbeat;
pub mod retry;

pub use backup::{BackupStore, RequeueSummary, UndeliveredRecord};
pub use health::{ChannelStatus, DeliveryHealthTracker, HealthPolicy};
pub use heartbeat::{HeartbeatMonitor, HeartbeatResult};
pub use retry::RetryPolicy;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A rendered message, identical for every channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub urgent: bool,
}

impl Notification {
    pub fn text(subject: impl Into<String>, body_text: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body_text: body_text.into(),
            body_html: None,
            urgent: false,
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.body_html = Some(html.into());
        self
    }

    pub fn urgent(mut self, urgent: bool) -> Self {
        self.urgent = urgent;
        self
    }
}

/// A delivery mechanism. Adapters own their wire protocol and network timeout; an `Err`
/// is one failed attempt.
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    fn id(&self) -> &str;

    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Line,
    Telegram,
    Email,
    File,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Line,
        ChannelKind::Telegram,
        ChannelKind::Email,
        ChannelKind::File,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Line => "line",
            ChannelKind::Telegram => "telegram",
            ChannelKind::Email => "email",
            ChannelKind::File => "file",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelSettings {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Lower runs first.
    pub priority: u32,
    /// Overrides the global retry policy for this channel.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ChannelTable {
    pub line: ChannelSettings,
    pub telegram: ChannelSettings,
    pub email: ChannelSettings,
    pub file: ChannelSettings,
}

impl Default for ChannelTable {
    fn default() -> Self {
        let at = |priority| ChannelSettings {
            enabled: true,
            priority,
            retry: None,
        };
        Self {
            line: at(1),
            telegram: at(2),
            email: at(3),
            file: at(4),
        }
    }
}

impl ChannelTable {
    pub fn get(&self, kind: ChannelKind) -> &ChannelSettings {
        match kind {
            ChannelKind::Line => &self.line,
            ChannelKind::Telegram => &self.telegram,
            ChannelKind::Email => &self.email,
            ChannelKind::File => &self.file,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DeliveryConfig {
    pub retry: RetryPolicy,
    pub channels: ChannelTable,
    pub health: HealthPolicy,
    pub heartbeat_interval_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            channels: ChannelTable::default(),
            health: HealthPolicy::default(),
            heartbeat_interval_secs: 3600,
        }
    }
}

impl DeliveryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.retry.validate()?;
        for kind in ChannelKind::ALL {
            if let Some(retry) = &self.channels.get(kind).retry {
                retry
                    .validate()
                    .map_err(|e| anyhow!("channels.{kind}.retry: {e}"))?;
            }
        }
        self.health.validate()?;
        anyhow::ensure!(
            self.heartbeat_interval_secs > 0,
            "heartbeat_interval_secs must be positive"
        );
        Ok(())
    }
}

pub struct ChannelRegistration {
    channel: Box<dyn Channel>,
    priority: u32,
    enabled: bool,
    retry: Option<RetryPolicy>,
}

impl ChannelRegistration {
    pub fn new(channel: Box<dyn Channel>, priority: u32) -> Self {
        Self {
            channel,
            priority,
            enabled: true,
            retry: None,
        }
    }

    pub fn from_settings(channel: Box<dyn Channel>, settings: &ChannelSettings) -> Self {
        Self {
            channel,
            priority: settings.priority,
            enabled: settings.enabled,
            retry: settings.retry,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn id(&self) -> &str {
        self.channel.id()
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }
}

impl fmt::Debug for ChannelRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistration")
            .field("id", &self.channel.id())
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryOutcome {
    /// Attempted channels only.
    pub per_channel: BTreeMap<String, bool>,
    /// Disabled channels and channels still cooling down.
    pub skipped: Vec<String>,
    pub overall_success: bool,
    /// Set when every channel failed and the backup write succeeded.
    pub backup_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct DeliveryOrchestrator {
    channels: Vec<ChannelRegistration>,
    retry: RetryPolicy,
    health: DeliveryHealthTracker,
    backup: Option<BackupStore>,
}

impl DeliveryOrchestrator {
    pub fn new(retry: RetryPolicy, health: DeliveryHealthTracker) -> Self {
        Self {
            channels: Vec::new(),
            retry,
            health,
            backup: None,
        }
    }

    pub fn with_backup(mut self, store: BackupStore) -> Self {
        self.backup = Some(store);
        self
    }

    /// Keeps channels ordered by priority, then id.
    pub fn register(&mut self, registration: ChannelRegistration) {
        let pos = self.channels.partition_point(|r| {
            (r.priority, r.id()) <= (registration.priority, registration.id())
        });
        self.channels.insert(pos, registration);
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|r| r.id())
    }

    pub fn health(&self) -> &DeliveryHealthTracker {
        &self.health
    }

    pub fn health_mut(&mut self) -> &mut DeliveryHealthTracker {
        &mut self.health
    }

    pub fn backup(&self) -> Option<&BackupStore> {
        self.backup.as_ref()
    }

    pub async fn deliver(&mut self, notification: &Notification) -> DeliveryOutcome {
        self.deliver_at(notification, Utc::now()).await
    }

    /// Attempts every enabled, currently available channel. Never fails: total failure is
    /// reported through the outcome and the backup file.
    pub async fn deliver_at(
        &mut self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> DeliveryOutcome {
        let mut outcome = self.fan_out(notification, now).await;
        if outcome.overall_success {
            return outcome;
        }

        self.health.record_undelivered();
        tracing::error!(
            subject = %notification.subject,
            attempted = outcome.per_channel.len(),
            undelivered = self.health.undelivered_count(),
            "every delivery channel failed"
        );

        if let Some(store) = &self.backup {
            match store.save(notification, now).await {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "saved undelivered notification");
                    outcome.backup_path = Some(path);
                }
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "failed to save undelivered notification");
                }
            }
        }

        outcome
    }

    /// Fan-out without the undelivered bookkeeping.
    pub(crate) async fn fan_out(
        &mut self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> DeliveryOutcome {
        self.health.record_notification(now);
        let mut outcome = DeliveryOutcome::default();

        for reg in &self.channels {
            let id = reg.id();
            if !reg.enabled {
                tracing::debug!(channel = %id, "channel disabled");
                outcome.skipped.push(id.to_string());
                continue;
            }
            if !self.health.should_attempt(id, now) {
                tracing::info!(channel = %id, "channel unavailable; skipping until cooldown passes");
                outcome.skipped.push(id.to_string());
                continue;
            }

            let policy = reg.retry.as_ref().unwrap_or(&self.retry);
            let ok = attempt_channel(reg.channel.as_ref(), policy, notification).await;
            if ok {
                self.health.record_success(id, now);
            } else {
                self.health.record_failure(id, now);
            }
            outcome.per_channel.insert(id.to_string(), ok);
        }

        outcome.overall_success = outcome.per_channel.values().any(|ok| *ok);
        tracing::info!(
            subject = %notification.subject,
            succeeded = outcome.per_channel.values().filter(|ok| **ok).count(),
            attempted = outcome.per_channel.len(),
            skipped = outcome.skipped.len(),
            "delivery finished"
        );
        outcome
    }
}

async fn attempt_channel(
    channel: &dyn Channel,
    policy: &RetryPolicy,
    notification: &Notification,
) -> bool {
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let result = match tokio::time::timeout(policy.attempt_timeout(), channel.send(notification)).await {
            Ok(res) => res,
            Err(_) => Err(anyhow!(
                "send timed out after {:?}",
                policy.attempt_timeout()
            )),
        };

        match result {
            Ok(()) => {
                tracing::debug!(channel = %channel.id(), attempt, "channel send succeeded");
                return true;
            }
            Err(err) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    channel = %channel.id(),
                    attempt,
                    ?delay,
                    error = %format!("{err:#}"),
                    "channel send failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                tracing::warn!(
                    channel = %channel.id(),
                    attempt,
                    error = %format!("{err:#}"),
                    "channel send failed; giving up"
                );
            }
        }
    }
    false
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedChannel;
    use super::*;
    use std::time::Duration;

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_secs: 1.0,
            backoff_factor: 2.0,
            max_delay_secs: 3.0,
            attempt_timeout_secs: 5.0,
        }
    }

    fn note() -> Notification {
        Notification::text("【午盤掃描分析報告】- 2026/03/02", "body")
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_survives_one_dead_channel() {
        let a = ScriptedChannel::new("a", &[false, false, true], false);
        let b = ScriptedChannel::always("b", false);
        let a_calls = a.calls.clone();
        let b_calls = b.calls.clone();

        let mut orch = DeliveryOrchestrator::new(fast_retry(3), DeliveryHealthTracker::default());
        orch.register(ChannelRegistration::new(Box::new(a), 1));
        orch.register(ChannelRegistration::new(Box::new(b), 2));

        let outcome = orch.deliver(&note()).await;
        assert!(outcome.overall_success);
        assert_eq!(outcome.per_channel.get("a"), Some(&true));
        assert_eq!(outcome.per_channel.get("b"), Some(&false));
        assert!(outcome.backup_path.is_none());

        assert_eq!(a_calls.lock().unwrap().len(), 3);
        assert_eq!(b_calls.lock().unwrap().len(), 3);
        assert_eq!(orch.health().status("a").unwrap().consecutive_failures, 0);
        assert_eq!(orch.health().status("b").unwrap().consecutive_failures, 1);
        assert_eq!(orch.health().undelivered_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn every_channel_is_attempted_after_a_success() {
        let first = ScriptedChannel::always("first", true);
        let second = ScriptedChannel::always("second", true);
        let second_sent = second.sent.clone();

        let mut orch = DeliveryOrchestrator::new(fast_retry(2), DeliveryHealthTracker::default());
        orch.register(ChannelRegistration::new(Box::new(second), 2));
        orch.register(ChannelRegistration::new(Box::new(first), 1));

        assert_eq!(orch.channel_ids().collect::<Vec<_>>(), vec!["first", "second"]);
        let outcome = orch.deliver(&note()).await;
        assert_eq!(outcome.per_channel.len(), 2);
        assert_eq!(second_sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn total_failure_writes_backup_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        let mut orch = DeliveryOrchestrator::new(fast_retry(2), DeliveryHealthTracker::default())
            .with_backup(store.clone());
        orch.register(ChannelRegistration::new(Box::new(ScriptedChannel::always("x", false)), 1));
        orch.register(ChannelRegistration::new(Box::new(ScriptedChannel::always("y", false)), 2));

        let outcome = orch.deliver(&note()).await;
        assert!(!outcome.overall_success);
        let path = outcome.backup_path.expect("backup written");
        assert!(path.exists());
        assert_eq!(orch.health().undelivered_count(), 1);
        assert_eq!(store.pending().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_channels_counts_as_undelivered() {
        let mut orch = DeliveryOrchestrator::new(fast_retry(1), DeliveryHealthTracker::default());
        let outcome = orch.deliver(&note()).await;
        assert!(!outcome.overall_success);
        assert!(outcome.per_channel.is_empty());
        assert_eq!(orch.health().undelivered_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_spacing_follows_policy() {
        let ch = ScriptedChannel::always("slow", false);
        let calls = ch.calls.clone();
        let mut orch = DeliveryOrchestrator::new(fast_retry(4), DeliveryHealthTracker::default());
        orch.register(ChannelRegistration::new(Box::new(ch), 1));

        orch.deliver(&note()).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        let policy = fast_retry(4);
        for k in 1..calls.len() {
            let gap = calls[k] - calls[k - 1];
            assert!(gap >= policy.delay_after(k as u32), "gap {k} was {gap:?}");
        }
        assert!(calls[3] - calls[0] >= Duration::from_secs(1 + 2 + 3));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempt_times_out_and_counts_as_failure() {
        let ch = ScriptedChannel::hanging("hung", Duration::from_secs(600));
        let calls = ch.calls.clone();
        let mut orch = DeliveryOrchestrator::new(fast_retry(2), DeliveryHealthTracker::default());
        orch.register(ChannelRegistration::new(Box::new(ch), 1));

        let start = tokio::time::Instant::now();
        let outcome = orch.deliver(&note()).await;
        assert!(!outcome.overall_success);
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert!(start.elapsed() < Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn per_channel_retry_override_wins() {
        let ch = ScriptedChannel::always("once", false);
        let calls = ch.calls.clone();
        let mut orch = DeliveryOrchestrator::new(fast_retry(3), DeliveryHealthTracker::default());
        orch.register(ChannelRegistration::new(Box::new(ch), 1).retry(fast_retry(1)));

        orch.deliver(&note()).await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_and_unavailable_channels_are_skipped() {
        use chrono::TimeZone;
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap();

        let mut health = DeliveryHealthTracker::new(HealthPolicy {
            unavailable_after: 1,
            cooldown_secs: 3600,
        });
        health.record_failure("down", now - chrono::Duration::minutes(10));

        let down = ScriptedChannel::always("down", true);
        let down_calls = down.calls.clone();
        let mut orch = DeliveryOrchestrator::new(fast_retry(1), health);
        orch.register(ChannelRegistration::new(Box::new(down), 1));
        orch.register(
            ChannelRegistration::new(Box::new(ScriptedChannel::always("off", true)), 2).enabled(false),
        );
        orch.register(ChannelRegistration::new(Box::new(ScriptedChannel::always("up", true)), 3));

        let outcome = orch.deliver_at(&note(), now).await;
        assert_eq!(outcome.skipped, vec!["down".to_string(), "off".to_string()]);
        assert_eq!(outcome.per_channel.len(), 1);
        assert!(down_calls.lock().unwrap().is_empty());

        // After the cooldown the channel is probed and heals.
        let later = now + chrono::Duration::hours(1);
        let outcome = orch.deliver_at(&note(), later).await;
        assert_eq!(outcome.per_channel.get("down"), Some(&true));
        assert!(orch.health().status("down").unwrap().available);
    }

    #[test]
    fn delivery_config_rejects_bad_override() {
        let mut cfg = DeliveryConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.channels.email.retry = Some(RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        });
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("channels.email.retry"), "{err}");
    }
}
