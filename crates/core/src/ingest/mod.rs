pub mod file;
pub mod provider;

pub use file::FileSnapshotSource;
pub use provider::HttpJsonSnapshotSource;

use crate::domain::contract::ValidatedFeed;
use chrono::NaiveDate;

/// Where a run's snapshots come from. Implementations validate the feed before returning it.
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_snapshots(&self, as_of_date: NaiveDate) -> anyhow::Result<ValidatedFeed>;
}
