use crate::domain::recommendation::RecommendationSet;
use crate::storage::write_atomic;
use crate::time::TimeSlot;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk shape of one run's output. Advisory: nothing in the engine reads it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecommendations {
    pub as_of_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub set: RecommendationSet,
}

/// `{data_dir}/results/{YYYYMMDD}/{time_slot}_recommendations.json`
pub fn results_path(data_dir: &Path, as_of_date: NaiveDate, time_slot: TimeSlot) -> PathBuf {
    data_dir
        .join("results")
        .join(as_of_date.format("%Y%m%d").to_string())
        .join(format!("{}_recommendations.json", time_slot.as_str()))
}

pub async fn persist(
    data_dir: &Path,
    as_of_date: NaiveDate,
    set: &RecommendationSet,
    generated_at: DateTime<Utc>,
) -> anyhow::Result<PathBuf> {
    let path = results_path(data_dir, as_of_date, set.time_slot);
    let doc = PersistedRecommendations {
        as_of_date,
        generated_at,
        set: set.clone(),
    };
    let json = serde_json::to_vec_pretty(&doc).context("failed to serialize recommendations")?;
    write_atomic(&path, &json).await?;
    tracing::info!(path = %path.display(), count = set.len(), "persisted recommendations");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::{Bucket, Recommendation};
    use crate::scoring::Grade;

    #[test]
    fn path_is_date_and_slot_keyed() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let p = results_path(Path::new("data"), date, TimeSlot::WeeklySummary);
        assert_eq!(p, Path::new("data/results/20260302/weekly_summary_recommendations.json"));
    }

    #[tokio::test]
    async fn persist_writes_buckets_at_top_level() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mut set = RecommendationSet::empty(TimeSlot::MorningScan);
        set.long_term.push(Recommendation {
            code: "2412".into(),
            name: "中華電".into(),
            current_price: 120.0,
            bucket: Bucket::LongTerm,
            grade: Grade::B,
            weighted_total: 6.2,
            reason: "殖利率 5% 以上".into(),
            target_price: Some(134.4),
            stop_loss: 108.0,
            trade_value: 2.0e9,
        });

        let path = persist(dir.path(), date, &set, Utc::now()).await.unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(raw["time_slot"], "morning_scan");
        assert_eq!(raw["long_term"][0]["code"], "2412");
        assert_eq!(raw["short_term"].as_array().unwrap().len(), 0);

        let back: PersistedRecommendations =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back.set, set);
        assert_eq!(back.as_of_date, date);
    }
}
