use crate::domain::recommendation::Bucket;
use crate::scoring::{CompositeScore, Fired};

const MAX_PHRASES: usize = 3;
const SEPARATOR: &str = "；";

pub fn generic_reason(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::ShortTerm => "綜合指標顯示短線投資機會",
        Bucket::LongTerm => "基本面穩健，適合長期觀察",
        Bucket::WeakStocks => "綜合評分偏弱，留意下檔風險",
    }
}

/// Up to three phrases from the rules that pushed the stock into `bucket`, strongest first.
/// Buy buckets cite positive contributions, the weak bucket cites negative ones.
pub fn build_reason(score: &CompositeScore, bucket: Bucket) -> String {
    let wants_negative = bucket == Bucket::WeakStocks;
    let mut fired: Vec<&Fired> = score
        .fired()
        .filter(|f| {
            if wants_negative {
                f.contribution < 0.0
            } else {
                f.contribution > 0.0
            }
        })
        .collect();

    // Stable sort keeps scorer order for equal magnitudes.
    fired.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));

    let phrases: Vec<&str> = fired
        .into_iter()
        .take(MAX_PHRASES)
        .map(|f| f.signal.phrase())
        .collect();

    if phrases.is_empty() {
        generic_reason(bucket).to_string()
    } else {
        phrases.join(SEPARATOR)
    }
}
