//! Sub-scorers and the weighted composite.
//!
//! Every sub-scorer starts from [`SubScore::BASELINE`], applies fixed increments for each
//! threshold rule that fires and clamps the result to `[0, 10]`. Thresholds are compared with
//! strict `>` only; a "below" rule is written `threshold > value`.

pub mod composite;
pub mod fundamental;
pub mod institutional;
pub mod technical;

pub use composite::{
    AnalysisType, CompositeScore, CompositeScorer, Grade, GradeBreakpoints, ScoredBatch,
    ScoringConfig, Weights,
};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    Technical,
    Fundamental,
    Institutional,
}

impl ScoreKind {
    pub const ALL: [ScoreKind; 3] = [
        ScoreKind::Technical,
        ScoreKind::Fundamental,
        ScoreKind::Institutional,
    ];
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScoreKind::Technical => "technical",
            ScoreKind::Fundamental => "fundamental",
            ScoreKind::Institutional => "institutional",
        };
        f.write_str(s)
    }
}

/// A threshold rule that can fire inside a sub-scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    PriceAboveMa5,
    PriceAboveMa20,
    MaGoldenCross,
    MacdBullish,
    MacdGoldenCross,
    RsiOversold,
    RsiHealthy,
    RsiOverbought,
    MacdDeathCross,
    MaDeathCross,

    HighDividendYield,
    SteadyDividendYield,
    StrongEpsGrowth,
    EpsGrowth,
    EpsDecline,
    AttractiveValuation,
    RichValuation,
    ExcellentRoe,
    GoodRoe,
    WeakRoe,

    HeavyForeignBuying,
    ForeignBuying,
    HeavyForeignSelling,
    ForeignSelling,
    HeavyTrustBuying,
    TrustBuying,
    HeavyTrustSelling,
    DealerBuying,
    DealerSelling,
    InstitutionsAccumulating,
    InstitutionsDistributing,
}

impl Signal {
    /// Phrase used when this rule ends up in a recommendation reason.
    pub fn phrase(self) -> &'static str {
        match self {
            Signal::PriceAboveMa5 => "站上5日均線",
            Signal::PriceAboveMa20 => "站穩20日均線",
            Signal::MaGoldenCross => "均線黃金交叉",
            Signal::MacdBullish => "MACD位於訊號線之上",
            Signal::MacdGoldenCross => "MACD出現黃金交叉",
            Signal::RsiOversold => "RSI超賣，醞釀反彈",
            Signal::RsiHealthy => "RSI位於健康區間",
            Signal::RsiOverbought => "RSI超買，追高風險升高",
            Signal::MacdDeathCross => "MACD出現死亡交叉",
            Signal::MaDeathCross => "均線死亡交叉",
            Signal::HighDividendYield => "高殖利率，現金流回報佳",
            Signal::SteadyDividendYield => "殖利率穩定配息",
            Signal::StrongEpsGrowth => "EPS高速成長，獲利大幅提升",
            Signal::EpsGrowth => "EPS穩健成長",
            Signal::EpsDecline => "EPS衰退，獲利能力下降",
            Signal::AttractiveValuation => "本益比偏低，評價具吸引力",
            Signal::RichValuation => "本益比偏高",
            Signal::ExcellentRoe => "ROE優異，獲利能力強",
            Signal::GoodRoe => "ROE良好",
            Signal::WeakRoe => "ROE偏低",
            Signal::HeavyForeignBuying => "外資大幅買超，國際資金青睞",
            Signal::ForeignBuying => "外資買超支撐",
            Signal::HeavyForeignSelling => "外資大幅賣超",
            Signal::ForeignSelling => "外資賣超",
            Signal::HeavyTrustBuying => "投信大幅買超，法人看好",
            Signal::TrustBuying => "投信買超",
            Signal::HeavyTrustSelling => "投信大幅賣超",
            Signal::DealerBuying => "自營商買超",
            Signal::DealerSelling => "自營商賣超",
            Signal::InstitutionsAccumulating => "三大法人合計大幅買超，籌碼穩定",
            Signal::InstitutionsDistributing => "三大法人合計大幅賣超，籌碼鬆動",
        }
    }
}

/// A rule that fired, with its signed contribution to the sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fired {
    pub signal: Signal,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub kind: ScoreKind,
    /// Always within `[0, 10]`. Zero when unavailable.
    pub value: f64,
    pub signals: Vec<Fired>,
    pub available: bool,
}

impl SubScore {
    pub const BASELINE: f64 = 5.0;
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 10.0;

    pub fn unavailable(kind: ScoreKind) -> Self {
        Self {
            kind,
            value: 0.0,
            signals: Vec::new(),
            available: false,
        }
    }

    /// Value this sub-score contributes before weighting.
    pub fn effective_value(&self) -> f64 {
        if self.available {
            self.value
        } else {
            0.0
        }
    }
}

/// Accumulates fired rules for one sub-scorer.
#[derive(Debug, Default)]
pub(crate) struct RuleSet {
    fired: Vec<Fired>,
}

impl RuleSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn when(&mut self, cond: bool, signal: Signal, contribution: f64) -> &mut Self {
        if cond {
            self.fired.push(Fired {
                signal,
                contribution,
            });
        }
        self
    }

    /// Fires only the first satisfied tier of a rule family.
    pub(crate) fn tiered(&mut self, tiers: &[(bool, Signal, f64)]) -> &mut Self {
        if let Some(&(_, signal, contribution)) = tiers.iter().find(|(cond, _, _)| *cond) {
            self.fired.push(Fired {
                signal,
                contribution,
            });
        }
        self
    }

    pub(crate) fn finish(self, kind: ScoreKind) -> SubScore {
        let raw: f64 = SubScore::BASELINE + self.fired.iter().map(|f| f.contribution).sum::<f64>();
        SubScore {
            kind,
            value: raw.clamp(SubScore::MIN, SubScore::MAX),
            signals: self.fired,
            available: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiered_fires_only_highest_tier() {
        let mut rules = RuleSet::new();
        rules.tiered(&[
            (true, Signal::HighDividendYield, 2.5),
            (true, Signal::SteadyDividendYield, 1.5),
        ]);
        let s = rules.finish(ScoreKind::Fundamental);
        assert_eq!(s.signals.len(), 1);
        assert_eq!(s.signals[0].signal, Signal::HighDividendYield);
        assert_eq!(s.value, 7.5);
    }

    #[test]
    fn finish_clamps_to_bounds() {
        let mut rules = RuleSet::new();
        for _ in 0..10 {
            rules.when(true, Signal::EpsDecline, -2.0);
        }
        assert_eq!(rules.finish(ScoreKind::Fundamental).value, 0.0);
    }

    #[test]
    fn unavailable_contributes_nothing() {
        let s = SubScore::unavailable(ScoreKind::Technical);
        assert!(!s.available);
        assert_eq!(s.effective_value(), 0.0);
    }
}
