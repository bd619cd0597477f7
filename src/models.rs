use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolved parameter values for one run, keyed by input name.
pub type ParameterSet = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Milliseconds since the Unix epoch.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Int,
    Float,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Int => "int",
            ParameterKind::Float => "float",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub default_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub step: f64,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: u32,
    pub entry_time: i64,
    pub exit_time: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub direction: Direction,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub bars: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityPoint {
    pub time: i64,
    pub equity: f64,
    pub drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    /// `YYYY-MM` of the trade exits aggregated into this bucket.
    pub month: String,
    #[serde(rename = "return")]
    pub return_pct: f64,
}

/// Four parallel per-bar signal vectors, one flag per bar each.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalSet {
    pub long_entry: Vec<bool>,
    pub long_exit: Vec<bool>,
    pub short_entry: Vec<bool>,
    pub short_exit: Vec<bool>,
}

impl SignalSet {
    pub fn flat(len: usize) -> Self {
        Self {
            long_entry: vec![false; len],
            long_exit: vec![false; len],
            short_entry: vec![false; len],
            short_exit: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.long_entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.long_entry.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.long_entry.iter().filter(|&&v| v).count()
            + self.short_entry.iter().filter(|&&v| v).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub id: String,
    pub strategy_name: String,
    pub symbol: String,
    pub timeframe: String,
    pub start_date: String,
    pub end_date: String,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    pub win_rate: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub avg_trade_duration: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub expectancy: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub monthly_returns: Vec<MonthlyReturn>,
    pub params: ParameterSet,
}

/// Rounds to a fixed number of decimal places for stable output.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_serializes_camel_case_with_return_field() {
        let monthly = MonthlyReturn {
            month: "2024-01".to_string(),
            return_pct: 1.5,
        };
        let json = serde_json::to_value(&monthly).unwrap();
        assert_eq!(json["return"], 1.5);

        let trade = Trade {
            id: 1,
            entry_time: 1,
            exit_time: 2,
            entry_price: 100.0,
            exit_price: 101.0,
            direction: Direction::Short,
            pnl: -10.0,
            pnl_pct: -1.0,
            bars: 1,
        };
        let json = serde_json::to_value(&trade).unwrap();
        assert_eq!(json["pnlPct"], -1.0);
        assert_eq!(json["direction"], "short");
    }

    #[test]
    fn round_to_clears_non_finite_values() {
        assert_eq!(round_to(f64::NAN, 2), 0.0);
        assert_eq!(round_to(f64::INFINITY, 2), 0.0);
        assert!((round_to(1.23456, 3) - 1.235).abs() < 1e-12);
    }
}
