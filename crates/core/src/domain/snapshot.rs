use serde::{Deserialize, Serialize};

/// One stock as seen by a single analysis pass. Supplied by the data feed and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub code: String,
    pub name: String,
    pub current_price: f64,
    pub change_percent: f64,
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub trade_value: f64,
    #[serde(default)]
    pub technical: Option<TechnicalSignals>,
    #[serde(default)]
    pub fundamental: Option<FundamentalMetrics>,
    #[serde(default)]
    pub institutional: Option<InstitutionalFlow>,
}

/// Precomputed technical flags. The engine does not derive these from price history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalSignals {
    pub price_above_ma5: bool,
    pub price_above_ma20: bool,
    pub ma5_above_ma20: bool,
    pub macd_above_signal: bool,
    pub macd_golden_cross: bool,
    pub macd_death_cross: bool,
    pub ma_death_cross: bool,
    pub rsi: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalMetrics {
    /// Percent, e.g. 4.5 for 4.5%.
    pub dividend_yield: f64,
    /// Year-over-year percent.
    pub eps_growth: f64,
    pub pe_ratio: f64,
    /// Percent.
    pub roe: f64,
}

/// Net buy/sell of the three institutional investor groups, in lots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstitutionalFlow {
    pub foreign_net_buy: i64,
    pub trust_net_buy: i64,
    pub dealer_net_buy: i64,
}

impl InstitutionalFlow {
    pub fn total(&self) -> i64 {
        self.foreign_net_buy
            .saturating_add(self.trust_net_buy)
            .saturating_add(self.dealer_net_buy)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnapshotError {
    #[error("stock code must be non-empty")]
    EmptyCode,

    #[error("stock name must be non-empty (code={0})")]
    EmptyName(String),

    #[error("invalid {field} for {code}: {value}")]
    InvalidNumber {
        code: String,
        field: &'static str,
        value: f64,
    },
}

impl StockSnapshot {
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let code = self.code.trim();
        if code.is_empty() {
            return Err(SnapshotError::EmptyCode);
        }
        if self.name.trim().is_empty() {
            return Err(SnapshotError::EmptyName(code.to_string()));
        }

        let invalid = |field: &'static str, value: f64| SnapshotError::InvalidNumber {
            code: code.to_string(),
            field,
            value,
        };

        if !self.current_price.is_finite() || self.current_price <= 0.0 {
            return Err(invalid("current_price", self.current_price));
        }
        if !self.change_percent.is_finite() {
            return Err(invalid("change_percent", self.change_percent));
        }
        if !self.trade_value.is_finite() || self.trade_value < 0.0 {
            return Err(invalid("trade_value", self.trade_value));
        }

        if let Some(rsi) = self.technical.as_ref().and_then(|t| t.rsi) {
            if !(0.0..=100.0).contains(&rsi) {
                return Err(invalid("rsi", rsi));
            }
        }

        if let Some(f) = &self.fundamental {
            for (field, value) in [
                ("dividend_yield", f.dividend_yield),
                ("eps_growth", f.eps_growth),
                ("pe_ratio", f.pe_ratio),
                ("roe", f.roe),
            ] {
                if !value.is_finite() {
                    return Err(invalid(field, value));
                }
            }
        }

        Ok(())
    }

    pub fn foreign_net_buy(&self) -> Option<i64> {
        self.institutional.as_ref().map(|i| i.foreign_net_buy)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn snapshot(code: &str, price: f64, change_percent: f64) -> StockSnapshot {
        StockSnapshot {
            code: code.to_string(),
            name: format!("Name {code}"),
            current_price: price,
            change_percent,
            volume: 1_000,
            trade_value: 1.0e9,
            technical: None,
            fundamental: None,
            institutional: None,
        }
    }
}
