use crate::scoring::Grade;
use crate::time::TimeSlot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output classification. A code lands in at most one bucket per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    ShortTerm,
    LongTerm,
    WeakStocks,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::ShortTerm, Bucket::LongTerm, Bucket::WeakStocks];

    pub fn title(self) -> &'static str {
        match self {
            Bucket::ShortTerm => "短線推薦",
            Bucket::LongTerm => "長線潛力",
            Bucket::WeakStocks => "極弱股",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Bucket::ShortTerm => "short_term",
            Bucket::LongTerm => "long_term",
            Bucket::WeakStocks => "weak_stocks",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub code: String,
    pub name: String,
    pub current_price: f64,
    pub bucket: Bucket,
    pub grade: Grade,
    pub weighted_total: f64,
    pub reason: String,
    pub target_price: Option<f64>,
    pub stop_loss: f64,
    pub trade_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub time_slot: TimeSlot,
    pub short_term: Vec<Recommendation>,
    pub long_term: Vec<Recommendation>,
    pub weak_stocks: Vec<Recommendation>,
}

impl RecommendationSet {
    pub fn empty(time_slot: TimeSlot) -> Self {
        Self {
            time_slot,
            short_term: Vec::new(),
            long_term: Vec::new(),
            weak_stocks: Vec::new(),
        }
    }

    pub fn bucket(&self, bucket: Bucket) -> &[Recommendation] {
        match bucket {
            Bucket::ShortTerm => &self.short_term,
            Bucket::LongTerm => &self.long_term,
            Bucket::WeakStocks => &self.weak_stocks,
        }
    }

    pub(crate) fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<Recommendation> {
        match bucket {
            Bucket::ShortTerm => &mut self.short_term,
            Bucket::LongTerm => &mut self.long_term,
            Bucket::WeakStocks => &mut self.weak_stocks,
        }
    }

    pub fn is_empty(&self) -> bool {
        Bucket::ALL.iter().all(|b| self.bucket(*b).is_empty())
    }

    pub fn len(&self) -> usize {
        Bucket::ALL.iter().map(|b| self.bucket(*b).len()).sum()
    }

    /// Bucket holding `code`, if any.
    pub fn find(&self, code: &str) -> Option<Bucket> {
        Bucket::ALL
            .into_iter()
            .find(|b| self.bucket(*b).iter().any(|r| r.code == code))
    }
}
