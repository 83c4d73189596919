use crate::delivery::{DeliveryOrchestrator, Notification};
use crate::time::tw_market::taipei_offset;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const PREFIX: &str = "undelivered_";
const SUBJECT_CHARS: usize = 30;

/// A notification no channel accepted, kept on disk for a later retry pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndeliveredRecord {
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub body_text: String,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub retry_count: u32,
}

impl UndeliveredRecord {
    pub fn new(notification: &Notification, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            subject: notification.subject.clone(),
            body_text: notification.body_text.clone(),
            body_html: notification.body_html.clone(),
            urgent: notification.urgent,
            retry_count: 0,
        }
    }

    fn retry_notification(&self, max_retries: u32) -> Notification {
        Notification {
            subject: format!(
                "{} [重試 {}/{}]",
                self.subject,
                self.retry_count + 1,
                max_retries
            ),
            body_text: self.body_text.clone(),
            body_html: self.body_html.clone(),
            urgent: self.urgent,
        }
    }
}

/// `{log_dir}/undelivered/undelivered_{YYYYmmdd_HHMMSS}_{subject}.json`
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: log_dir.as_ref().join("undelivered"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn save(&self, notification: &Notification, now: DateTime<Utc>) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let stamp = now.with_timezone(&taipei_offset()?).format("%Y%m%d_%H%M%S");
        let stem = format!("{PREFIX}{stamp}_{}", safe_subject(&notification.subject));

        let mut path = self.dir.join(format!("{stem}.json"));
        let mut n = 1;
        while tokio::fs::try_exists(&path).await.unwrap_or(false) {
            n += 1;
            path = self.dir.join(format!("{stem}_{n}.json"));
        }

        write_record(&path, &UndeliveredRecord::new(notification, now)).await?;
        Ok(path)
    }

    /// Queued files in name order, which is also age order.
    pub async fn pending(&self) -> anyhow::Result<Vec<PathBuf>> {
        if !tokio::fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to list {}", self.dir.display()))?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(PREFIX) && name.ends_with(".json") {
                out.push(entry.path());
            }
        }
        out.sort();
        Ok(out)
    }

    pub async fn load(&self, path: &Path) -> anyhow::Result<UndeliveredRecord> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("{} is not a valid undelivered record", path.display()))
    }
}

async fn write_record(path: &Path, record: &UndeliveredRecord) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(record).context("failed to serialize undelivered record")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Filename-safe subject: alphanumerics kept (any script), everything else `_`.
pub fn safe_subject(subject: &str) -> String {
    subject
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(SUBJECT_CHARS)
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequeueSummary {
    pub found: usize,
    pub delivered: usize,
    /// Files left alone because they reached the retry cap.
    pub exhausted: usize,
    /// Files that could not be read, removed or rewritten. The pass moves on past them.
    pub failed: usize,
}

impl DeliveryOrchestrator {
    /// Re-delivers queued notifications. A delivered file is removed; a failed one has its
    /// retry count bumped. Failures here never create new backup files.
    pub async fn retry_undelivered(&mut self, max_retries: u32) -> anyhow::Result<RequeueSummary> {
        let Some(store) = self.backup().cloned() else {
            return Ok(RequeueSummary::default());
        };

        let files = store.pending().await?;
        let mut summary = RequeueSummary {
            found: files.len(),
            ..Default::default()
        };
        if files.is_empty() {
            return Ok(summary);
        }
        tracing::info!(count = files.len(), "retrying undelivered notifications");

        for path in files {
            let mut record = match store.load(&path).await {
                Ok(r) => r,
                Err(err) => {
                    tracing::error!(path = %path.display(), error = %format!("{err:#}"), "skipping unreadable undelivered record");
                    summary.failed += 1;
                    continue;
                }
            };

            if record.retry_count >= max_retries {
                tracing::warn!(path = %path.display(), retries = record.retry_count, "undelivered record reached retry cap");
                summary.exhausted += 1;
                continue;
            }

            let outcome = self
                .fan_out(&record.retry_notification(max_retries), Utc::now())
                .await;

            if outcome.overall_success {
                summary.delivered += 1;
                if let Err(err) = tokio::fs::remove_file(&path).await {
                    // Delivered but still queued; the next pass may send it again.
                    tracing::error!(path = %path.display(), error = %err, "failed to remove delivered record");
                    summary.failed += 1;
                }
            } else {
                record.retry_count += 1;
                match write_record(&path, &record).await {
                    Ok(()) => {
                        tracing::warn!(path = %path.display(), retries = record.retry_count, "undelivered record still failing")
                    }
                    Err(err) => {
                        tracing::error!(path = %path.display(), error = %format!("{err:#}"), "failed to update undelivered record");
                        summary.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            found = summary.found,
            delivered = summary.delivered,
            exhausted = summary.exhausted,
            failed = summary.failed,
            "undelivered retry pass finished"
        );
        Ok(summary)
    }
}
