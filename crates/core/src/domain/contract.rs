use crate::domain::snapshot::StockSnapshot;
use anyhow::ensure;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire shape of a snapshot feed. Items stay untyped until validated one by one, so a single
/// bad row cannot reject the whole feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFeed {
    pub as_of_date: NaiveDate,
    pub items: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct ValidatedFeed {
    pub as_of_date: NaiveDate,
    pub snapshots: Vec<StockSnapshot>,
    pub skipped: usize,
}

impl SnapshotFeed {
    pub fn validate_and_into_snapshots(
        self,
        expected_as_of_date: Option<NaiveDate>,
    ) -> anyhow::Result<ValidatedFeed> {
        if let Some(expected) = expected_as_of_date {
            ensure!(
                self.as_of_date == expected,
                "snapshot feed as_of_date mismatch: expected {expected}, got {}",
                self.as_of_date
            );
        }

        let mut snapshots = Vec::with_capacity(self.items.len());
        let mut skipped = 0usize;
        for (idx, item) in self.items.into_iter().enumerate() {
            match into_snapshot(item) {
                Ok(s) => snapshots.push(s),
                Err(err) => {
                    skipped += 1;
                    tracing::warn!(idx, error = %err, "skipping malformed feed item");
                }
            }
        }

        // Duplicate codes would break the one-bucket-per-code guarantee downstream.
        let mut seen = std::collections::BTreeSet::new();
        snapshots.retain(|s| {
            let fresh = seen.insert(s.code.clone());
            if !fresh {
                skipped += 1;
                tracing::warn!(code = %s.code, "skipping duplicate feed item");
            }
            fresh
        });

        Ok(ValidatedFeed {
            as_of_date: self.as_of_date,
            snapshots,
            skipped,
        })
    }
}

fn into_snapshot(item: Value) -> anyhow::Result<StockSnapshot> {
    let mut snapshot: StockSnapshot = serde_json::from_value(item)?;
    snapshot.code = snapshot.code.trim().to_string();
    snapshot.name = snapshot.name.trim().to_string();
    snapshot.validate()?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 27).unwrap()
    }

    #[test]
    fn keeps_valid_items_and_skips_bad_ones() {
        let feed: SnapshotFeed = serde_json::from_value(json!({
            "as_of_date": as_of(),
            "items": [
                {"code": " 2330 ", "name": "台積電", "current_price": 600.0, "change_percent": 1.5,
                 "trade_value": 2.0e10,
                 "fundamental": {"dividend_yield": 2.3, "eps_growth": 12.8, "pe_ratio": 18.2, "roe": 23.5}},
                {"code": "2317", "name": "鴻海", "current_price": "oops", "change_percent": 0.0},
                {"code": "2603", "name": "長榮", "current_price": -5.0, "change_percent": 0.0},
                {"code": "2330", "name": "台積電", "current_price": 601.0, "change_percent": 1.6}
            ]
        }))
        .unwrap();

        let out = feed.validate_and_into_snapshots(Some(as_of())).unwrap();
        assert_eq!(out.snapshots.len(), 1);
        assert_eq!(out.snapshots[0].code, "2330");
        assert_eq!(out.snapshots[0].current_price, 600.0);
        assert_eq!(out.skipped, 3);
    }

    #[test]
    fn rejects_wrong_as_of_date() {
        let feed = SnapshotFeed {
            as_of_date: NaiveDate::from_ymd_opt(2026, 1, 26).unwrap(),
            items: vec![],
        };
        assert!(feed.validate_and_into_snapshots(Some(as_of())).is_err());
    }

    #[test]
    fn empty_feed_is_not_an_error() {
        let feed = SnapshotFeed {
            as_of_date: as_of(),
            items: vec![],
        };
        let out = feed.validate_and_into_snapshots(None).unwrap();
        assert!(out.snapshots.is_empty());
    }
}
