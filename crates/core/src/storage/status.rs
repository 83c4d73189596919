use crate::delivery::{DeliveryHealthTracker, HealthPolicy};
use crate::storage::write_atomic;
use anyhow::Context;
use std::path::Path;

/// Loads persisted delivery health. A missing file starts fresh; an unreadable one is logged
/// and also starts fresh, since delivery must not be blocked by stale bookkeeping.
pub async fn load(path: &Path, policy: HealthPolicy) -> DeliveryHealthTracker {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return DeliveryHealthTracker::new(policy);
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read delivery status; starting fresh");
            return DeliveryHealthTracker::new(policy);
        }
    };

    match serde_json::from_slice::<DeliveryHealthTracker>(&bytes) {
        Ok(tracker) => tracker.with_policy(policy),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "delivery status is corrupt; starting fresh");
            DeliveryHealthTracker::new(policy)
        }
    }
}

pub async fn save(path: &Path, tracker: &DeliveryHealthTracker) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(tracker).context("failed to serialize delivery status")?;
    write_atomic(path, &json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn round_trips_and_reattaches_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/notification_status.json");
        let mut tracker = DeliveryHealthTracker::default();
        tracker.record_success("line", Utc::now());
        tracker.record_undelivered();
        save(&path, &tracker).await.unwrap();

        let policy = HealthPolicy {
            unavailable_after: 2,
            cooldown_secs: 10,
        };
        let back = load(&path, policy).await;
        assert_eq!(back.undelivered_count(), 1);
        assert!(back.status("line").is_some());
        assert_eq!(back.policy(), &policy);
    }

    #[tokio::test]
    async fn missing_or_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        assert_eq!(load(&path, HealthPolicy::default()).await.undelivered_count(), 0);

        tokio::fs::write(&path, b"{not json").await.unwrap();
        let fresh = load(&path, HealthPolicy::default()).await;
        assert_eq!(fresh.channels().count(), 0);
    }
}
