use crate::domain::snapshot::StockSnapshot;
use crate::scoring::{RuleSet, ScoreKind, Signal, SubScore};

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

pub fn score(snapshot: &StockSnapshot) -> SubScore {
    let Some(t) = &snapshot.technical else {
        return SubScore::unavailable(ScoreKind::Technical);
    };

    let mut rules = RuleSet::new();
    rules
        .when(t.price_above_ma5, Signal::PriceAboveMa5, 0.5)
        .when(t.price_above_ma20, Signal::PriceAboveMa20, 1.0)
        .when(t.ma5_above_ma20, Signal::MaGoldenCross, 1.0)
        .when(t.macd_above_signal, Signal::MacdBullish, 1.0)
        .when(t.macd_golden_cross, Signal::MacdGoldenCross, 1.5)
        .when(t.macd_death_cross, Signal::MacdDeathCross, -1.5)
        .when(t.ma_death_cross, Signal::MaDeathCross, -1.0);

    if let Some(rsi) = t.rsi {
        rules.tiered(&[
            (rsi > RSI_OVERBOUGHT, Signal::RsiOverbought, -1.0),
            (RSI_OVERSOLD > rsi, Signal::RsiOversold, 1.0),
            (rsi > RSI_OVERSOLD, Signal::RsiHealthy, 0.5),
        ]);
    }

    rules.finish(ScoreKind::Technical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::fixtures::snapshot;
    use crate::domain::snapshot::TechnicalSignals;

    fn with_signals(t: TechnicalSignals) -> StockSnapshot {
        let mut s = snapshot("2330", 600.0, 1.0);
        s.technical = Some(t);
        s
    }

    #[test]
    fn missing_signals_are_unavailable() {
        let s = score(&snapshot("2330", 600.0, 1.0));
        assert!(!s.available);
    }

    #[test]
    fn bullish_setup_scores_high() {
        let s = score(&with_signals(TechnicalSignals {
            price_above_ma5: true,
            price_above_ma20: true,
            ma5_above_ma20: true,
            macd_above_signal: true,
            macd_golden_cross: true,
            rsi: Some(55.0),
            ..Default::default()
        }));
        assert!(s.available);
        // 5.0 + 0.5 + 1.0 + 1.0 + 1.0 + 1.5 + 0.5, clamped.
        assert_eq!(s.value, 10.0);
        assert_eq!(s.signals.len(), 6);
    }

    #[test]
    fn rsi_thresholds_are_strict() {
        let at = |rsi| {
            score(&with_signals(TechnicalSignals {
                rsi: Some(rsi),
                ..Default::default()
            }))
        };

        // 30 is neither oversold nor above the oversold line.
        assert!(at(30.0).signals.is_empty());
        // 70 is not overbought, only healthy.
        let s = at(70.0);
        assert_eq!(s.signals.len(), 1);
        assert_eq!(s.signals[0].signal, Signal::RsiHealthy);
    }

    #[test]
    fn death_crosses_pull_below_baseline() {
        let s = score(&with_signals(TechnicalSignals {
            macd_death_cross: true,
            ma_death_cross: true,
            rsi: Some(80.0),
            ..Default::default()
        }));
        assert_eq!(s.value, 1.5);
    }
}
