use crate::domain::snapshot::StockSnapshot;
use crate::scoring::{RuleSet, ScoreKind, Signal, SubScore};

pub fn score(snapshot: &StockSnapshot) -> SubScore {
    let Some(flow) = &snapshot.institutional else {
        return SubScore::unavailable(ScoreKind::Institutional);
    };

    let foreign = flow.foreign_net_buy;
    let trust = flow.trust_net_buy;
    let dealer = flow.dealer_net_buy;
    let total = flow.total();

    let mut rules = RuleSet::new();
    rules
        .tiered(&[
            (foreign > 20_000, Signal::HeavyForeignBuying, 2.0),
            (foreign > 5_000, Signal::ForeignBuying, 1.0),
            (-20_000 > foreign, Signal::HeavyForeignSelling, -2.0),
            (-5_000 > foreign, Signal::ForeignSelling, -1.0),
        ])
        .tiered(&[
            (trust > 10_000, Signal::HeavyTrustBuying, 1.5),
            (trust > 1_000, Signal::TrustBuying, 0.5),
            (-10_000 > trust, Signal::HeavyTrustSelling, -1.5),
        ])
        .tiered(&[
            (dealer > 10_000, Signal::DealerBuying, 0.5),
            (-10_000 > dealer, Signal::DealerSelling, -0.5),
        ])
        .tiered(&[
            (total > 50_000, Signal::InstitutionsAccumulating, 1.0),
            (-50_000 > total, Signal::InstitutionsDistributing, -1.0),
        ]);

    rules.finish(ScoreKind::Institutional)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::fixtures::snapshot;
    use crate::domain::snapshot::InstitutionalFlow;

    fn with_flow(foreign: i64, trust: i64, dealer: i64) -> StockSnapshot {
        let mut s = snapshot("2603", 180.0, 2.0);
        s.institutional = Some(InstitutionalFlow {
            foreign_net_buy: foreign,
            trust_net_buy: trust,
            dealer_net_buy: dealer,
        });
        s
    }

    #[test]
    fn heavy_accumulation() {
        let s = score(&with_flow(40_000, 12_000, 11_000));
        // 5.0 + 2.0 + 1.5 + 0.5 + 1.0
        assert_eq!(s.value, 10.0);
        assert_eq!(s.signals.len(), 4);
    }

    #[test]
    fn heavy_distribution() {
        let s = score(&with_flow(-40_000, -12_000, -11_000));
        assert_eq!(s.value, 0.0);
        assert_eq!(s.signals[0].signal, Signal::HeavyForeignSelling);
    }

    #[test]
    fn flat_flow_stays_at_baseline() {
        let s = score(&with_flow(0, 0, 0));
        assert!(s.available);
        assert_eq!(s.value, SubScore::BASELINE);
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let s = score(&with_flow(i64::MAX, i64::MAX, i64::MAX));
        assert!((0.0..=10.0).contains(&s.value));
        let s = score(&with_flow(i64::MIN, i64::MIN, i64::MIN));
        assert!((0.0..=10.0).contains(&s.value));
    }
}
