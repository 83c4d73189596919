use crate::domain::recommendation::Bucket;
use crate::scoring::Grade;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GradeMultipliers {
    pub a_plus: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl GradeMultipliers {
    pub fn get(&self, grade: Grade) -> f64 {
        match grade {
            Grade::APlus => self.a_plus,
            Grade::A => self.a,
            Grade::B => self.b,
            Grade::C => self.c,
            Grade::D => self.d,
        }
    }

    /// A better grade never maps to a smaller multiplier.
    pub fn is_monotonic(&self) -> bool {
        self.a_plus >= self.a && self.a >= self.b && self.b >= self.c && self.c >= self.d
    }

    fn all_positive(&self) -> bool {
        [self.a_plus, self.a, self.b, self.c, self.d]
            .iter()
            .all(|m| m.is_finite() && *m > 0.0)
    }
}

/// Target and stop tables are independent. Buckets without a target table produce no target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketPricing {
    pub target: Option<GradeMultipliers>,
    pub stop: GradeMultipliers,
}

impl BucketPricing {
    pub fn is_valid(&self) -> bool {
        let target_ok = self
            .target
            .map_or(true, |t| t.is_monotonic() && t.all_positive());
        target_ok && self.stop.is_monotonic() && self.stop.all_positive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PriceTable {
    pub short_term: BucketPricing,
    pub long_term: BucketPricing,
    pub weak_stocks: BucketPricing,
}

impl Default for PriceTable {
    fn default() -> Self {
        let m = |a_plus, a, b, c, d| GradeMultipliers { a_plus, a, b, c, d };
        Self {
            short_term: BucketPricing {
                target: Some(m(1.10, 1.08, 1.06, 1.04, 1.02)),
                stop: m(0.96, 0.95, 0.95, 0.94, 0.93),
            },
            long_term: BucketPricing {
                target: Some(m(1.25, 1.18, 1.12, 1.08, 1.05)),
                stop: m(0.92, 0.91, 0.90, 0.90, 0.88),
            },
            weak_stocks: BucketPricing {
                target: None,
                stop: m(0.99, 0.98, 0.98, 0.97, 0.97),
            },
        }
    }
}

impl PriceTable {
    pub fn for_bucket(&self, bucket: Bucket) -> &BucketPricing {
        match bucket {
            Bucket::ShortTerm => &self.short_term,
            Bucket::LongTerm => &self.long_term,
            Bucket::WeakStocks => &self.weak_stocks,
        }
    }

    /// Returns `(target_price, stop_loss)` rounded to two decimals.
    pub fn price(&self, bucket: Bucket, grade: Grade, current_price: f64) -> (Option<f64>, f64) {
        let pricing = self.for_bucket(bucket);
        let target = pricing
            .target
            .map(|t| round2(current_price * t.get(grade)));
        let stop = round2(current_price * pricing.stop.get(grade));
        (target, stop)
    }

    pub fn is_valid(&self) -> bool {
        Bucket::ALL
            .into_iter()
            .all(|b| self.for_bucket(b).is_valid())
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
