//! Partitions composite scores into the three buckets, ranks and truncates them, and prices
//! the survivors.

pub mod limits;
pub mod pricing;
pub mod rationale;

pub use limits::{BucketLimits, LimitTable};
pub use pricing::{BucketPricing, GradeMultipliers, PriceTable};

use crate::domain::recommendation::{Bucket, Recommendation, RecommendationSet};
use crate::scoring::CompositeScore;
use crate::time::TimeSlot;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClassifierThresholds {
    pub short_min_total: f64,
    pub short_min_technical: f64,
    pub long_min_total: f64,
    pub long_min_fundamental: f64,
    pub weak_max_total: f64,
    pub weak_max_change_percent: f64,
    pub weak_max_foreign_net_buy: i64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            short_min_total: 6.5,
            short_min_technical: 6.5,
            long_min_total: 6.0,
            long_min_fundamental: 6.5,
            weak_max_total: 1.5,
            weak_max_change_percent: -5.0,
            weak_max_foreign_net_buy: -10_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClassifierConfig {
    pub thresholds: ClassifierThresholds,
    pub limits: LimitTable,
    pub pricing: PriceTable,
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    fn is_short_term(&self, s: &CompositeScore) -> bool {
        let t = &self.config.thresholds;
        s.weighted_total >= t.short_min_total
            && s.technical.effective_value() >= t.short_min_technical
            && s.snapshot.change_percent > 0.0
    }

    fn is_long_term(&self, s: &CompositeScore) -> bool {
        let t = &self.config.thresholds;
        s.weighted_total >= t.long_min_total
            && s.fundamental.effective_value() >= t.long_min_fundamental
    }

    /// Any single red flag is enough.
    fn is_weak(&self, s: &CompositeScore) -> bool {
        let t = &self.config.thresholds;
        let change = s.snapshot.change_percent;
        let foreign_selling = s
            .snapshot
            .foreign_net_buy()
            .is_some_and(|f| f <= t.weak_max_foreign_net_buy);

        s.weighted_total <= t.weak_max_total
            || change <= t.weak_max_change_percent
            || (foreign_selling && change < 0.0)
    }

    /// Bucket for a single score after overlap resolution (weak > short_term > long_term).
    pub fn bucket_for(&self, score: &CompositeScore) -> Option<Bucket> {
        if self.is_weak(score) {
            Some(Bucket::WeakStocks)
        } else if self.is_short_term(score) {
            Some(Bucket::ShortTerm)
        } else if self.is_long_term(score) {
            Some(Bucket::LongTerm)
        } else {
            None
        }
    }

    pub fn classify(&self, scores: &[CompositeScore], time_slot: TimeSlot) -> RecommendationSet {
        let mut pools: [Vec<&CompositeScore>; 3] = [Vec::new(), Vec::new(), Vec::new()];

        for score in scores {
            if let Err(err) = score.snapshot.validate() {
                tracing::warn!(code = %score.snapshot.code, error = %err, "skipping malformed score");
                continue;
            }
            if !score.weighted_total.is_finite() {
                tracing::warn!(code = %score.snapshot.code, "skipping score with non-finite total");
                continue;
            }
            if let Some(bucket) = self.bucket_for(score) {
                pools[pool_index(bucket)].push(score);
            }
        }

        let limits = self.config.limits.for_slot(time_slot);
        let mut out = RecommendationSet::empty(time_slot);

        for bucket in Bucket::ALL {
            let pool = &mut pools[pool_index(bucket)];
            match bucket {
                Bucket::ShortTerm | Bucket::LongTerm => pool.sort_by(|a, b| rank_buy(a, b)),
                Bucket::WeakStocks => pool.sort_by(|a, b| rank_weak(a, b)),
            }

            let limit = limits.get(bucket);
            let recs = out.bucket_mut(bucket);
            for score in pool.iter().take(limit) {
                recs.push(self.recommend(score, bucket));
            }
        }

        tracing::info!(
            %time_slot,
            input = scores.len(),
            short_term = out.short_term.len(),
            long_term = out.long_term.len(),
            weak_stocks = out.weak_stocks.len(),
            "classified composite scores"
        );

        out
    }

    fn recommend(&self, score: &CompositeScore, bucket: Bucket) -> Recommendation {
        let snapshot = &score.snapshot;
        let (target_price, stop_loss) =
            self.config
                .pricing
                .price(bucket, score.grade, snapshot.current_price);

        Recommendation {
            code: snapshot.code.clone(),
            name: snapshot.name.clone(),
            current_price: snapshot.current_price,
            bucket,
            grade: score.grade,
            weighted_total: score.weighted_total,
            reason: rationale::build_reason(score, bucket),
            target_price,
            stop_loss,
            trade_value: snapshot.trade_value,
        }
    }
}

fn pool_index(bucket: Bucket) -> usize {
    match bucket {
        Bucket::ShortTerm => 0,
        Bucket::LongTerm => 1,
        Bucket::WeakStocks => 2,
    }
}

/// Highest total first; higher trade value breaks ties, then code for a total order.
fn rank_buy(a: &CompositeScore, b: &CompositeScore) -> Ordering {
    b.weighted_total
        .total_cmp(&a.weighted_total)
        .then_with(|| b.snapshot.trade_value.total_cmp(&a.snapshot.trade_value))
        .then_with(|| a.snapshot.code.cmp(&b.snapshot.code))
}

/// Lowest total first; the steeper drop breaks ties, then code.
fn rank_weak(a: &CompositeScore, b: &CompositeScore) -> Ordering {
    a.weighted_total
        .total_cmp(&b.weighted_total)
        .then_with(|| a.snapshot.change_percent.total_cmp(&b.snapshot.change_percent))
        .then_with(|| a.snapshot.code.cmp(&b.snapshot.code))
}
