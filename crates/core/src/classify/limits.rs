use crate::domain::recommendation::Bucket;
use crate::time::TimeSlot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketLimits {
    pub short_term: usize,
    pub long_term: usize,
    pub weak_stocks: usize,
}

impl BucketLimits {
    pub fn get(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::ShortTerm => self.short_term,
            Bucket::LongTerm => self.long_term,
            Bucket::WeakStocks => self.weak_stocks,
        }
    }
}

/// Per-slot limits. Omitted slots keep their built-in limits; a slot set to `null` uses
/// `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LimitTable {
    pub morning_scan: Option<BucketLimits>,
    pub mid_morning_scan: Option<BucketLimits>,
    pub mid_day_scan: Option<BucketLimits>,
    pub afternoon_scan: Option<BucketLimits>,
    pub weekly_summary: Option<BucketLimits>,
    pub default: BucketLimits,
}

impl Default for LimitTable {
    fn default() -> Self {
        let limits = |short_term, long_term, weak_stocks| {
            Some(BucketLimits {
                short_term,
                long_term,
                weak_stocks,
            })
        };
        Self {
            morning_scan: limits(3, 2, 2),
            mid_morning_scan: limits(3, 2, 1),
            mid_day_scan: limits(3, 3, 2),
            afternoon_scan: limits(3, 3, 2),
            weekly_summary: limits(2, 4, 3),
            default: BucketLimits {
                short_term: 3,
                long_term: 3,
                weak_stocks: 2,
            },
        }
    }
}

impl LimitTable {
    pub fn configured(&self, slot: TimeSlot) -> Option<BucketLimits> {
        match slot {
            TimeSlot::MorningScan => self.morning_scan,
            TimeSlot::MidMorningScan => self.mid_morning_scan,
            TimeSlot::MidDayScan => self.mid_day_scan,
            TimeSlot::AfternoonScan => self.afternoon_scan,
            TimeSlot::WeeklySummary => self.weekly_summary,
        }
    }

    pub fn for_slot(&self, slot: TimeSlot) -> BucketLimits {
        self.configured(slot).unwrap_or_else(|| {
            tracing::warn!(time_slot = %slot, "no limits configured for time slot; using defaults");
            self.default
        })
    }

    /// Same limits for every slot.
    pub fn uniform(limits: BucketLimits) -> Self {
        Self {
            morning_scan: Some(limits),
            mid_morning_scan: Some(limits),
            mid_day_scan: Some(limits),
            afternoon_scan: Some(limits),
            weekly_summary: Some(limits),
            default: limits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_slot_falls_back_to_default() {
        let table: LimitTable = serde_json::from_value(serde_json::json!({
            "morning_scan": {"short_term": 1, "long_term": 1, "weak_stocks": 1},
            "weekly_summary": null,
            "default": {"short_term": 5, "long_term": 7, "weak_stocks": 3}
        }))
        .unwrap();
        assert_eq!(table.for_slot(TimeSlot::MorningScan).short_term, 1);
        assert_eq!(table.for_slot(TimeSlot::WeeklySummary).long_term, 7);
        // Omitted slots keep the built-in table.
        assert_eq!(table.for_slot(TimeSlot::MidMorningScan).weak_stocks, 1);
    }

    #[test]
    fn unknown_slot_key_is_rejected_at_load() {
        let res = serde_json::from_value::<LimitTable>(serde_json::json!({
            "evening_scan": {"short_term": 1, "long_term": 1, "weak_stocks": 1}
        }));
        assert!(res.is_err());
    }
}
