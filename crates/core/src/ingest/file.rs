use crate::domain::contract::{SnapshotFeed, ValidatedFeed};
use crate::ingest::SnapshotSource;
use anyhow::Context;
use chrono::NaiveDate;
use std::path::PathBuf;

/// Reads a snapshot feed from a JSON file. The file's `as_of_date` must match the run date.
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl SnapshotSource for FileSnapshotSource {
    fn source_name(&self) -> &'static str {
        "json_file"
    }

    async fn fetch_snapshots(&self, as_of_date: NaiveDate) -> anyhow::Result<ValidatedFeed> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read snapshot file {}", self.path.display()))?;
        let feed: SnapshotFeed = serde_json::from_slice(&bytes)
            .with_context(|| format!("{} is not a snapshot feed", self.path.display()))?;
        feed.validate_and_into_snapshots(Some(as_of_date))
    }
}
