use crate::domain::snapshot::StockSnapshot;
use crate::scoring::{RuleSet, ScoreKind, Signal, SubScore};

pub fn score(snapshot: &StockSnapshot) -> SubScore {
    let Some(f) = &snapshot.fundamental else {
        return SubScore::unavailable(ScoreKind::Fundamental);
    };

    let mut rules = RuleSet::new();
    rules
        .tiered(&[
            (f.dividend_yield > 5.0, Signal::HighDividendYield, 2.5),
            (f.dividend_yield > 3.0, Signal::SteadyDividendYield, 1.5),
        ])
        .tiered(&[
            (f.eps_growth > 20.0, Signal::StrongEpsGrowth, 2.0),
            (f.eps_growth > 8.0, Signal::EpsGrowth, 1.0),
            (0.0 > f.eps_growth, Signal::EpsDecline, -2.0),
        ])
        .tiered(&[
            (
                f.pe_ratio > 0.0 && 15.0 > f.pe_ratio,
                Signal::AttractiveValuation,
                1.0,
            ),
            (f.pe_ratio > 35.0, Signal::RichValuation, -1.5),
        ])
        .tiered(&[
            (f.roe > 20.0, Signal::ExcellentRoe, 2.0),
            (f.roe > 15.0, Signal::GoodRoe, 1.5),
            (5.0 > f.roe, Signal::WeakRoe, -1.0),
        ]);

    rules.finish(ScoreKind::Fundamental)
}
