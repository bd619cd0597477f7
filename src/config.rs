use anyhow::{anyhow, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::BacktestResult;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 10_000.0;
pub const DEFAULT_COMMISSION_PCT: f64 = 0.1;
pub const DEFAULT_MAX_COMBINATIONS: usize = 1_000;
pub const DEFAULT_TOP_RESULTS: usize = 20;

/// Per-run configuration. The date labels are carried through to the result for display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BacktestConfig {
    pub strategy_name: String,
    pub symbol: String,
    pub timeframe: String,
    pub start_date: String,
    pub end_date: String,
    pub initial_capital: f64,
    /// Percent charged on each side of a round trip.
    pub commission_pct: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            strategy_name: String::new(),
            symbol: "UNKNOWN".to_string(),
            timeframe: "1d".to_string(),
            start_date: String::new(),
            end_date: String::new(),
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            commission_pct: DEFAULT_COMMISSION_PCT,
        }
    }
}

impl BacktestConfig {
    /// Clamps commission to >= 0 and capital to >= 1 so percentage math stays finite.
    pub fn sanitized(&self) -> Self {
        let mut config = self.clone();
        if !config.commission_pct.is_finite() || config.commission_pct < 0.0 {
            warn!(
                "Commission {} is invalid; using 0",
                config.commission_pct
            );
            config.commission_pct = 0.0;
        }
        if !config.initial_capital.is_finite() || config.initial_capital < 1.0 {
            warn!(
                "Initial capital {} is invalid; using 1.0",
                config.initial_capital
            );
            config.initial_capital = 1.0;
        }
        config
    }
}

/// Metric used to rank sweep results. Scores are oriented so that higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepObjective {
    Sharpe,
    TotalReturn,
    ProfitFactor,
    WinRate,
    MaxDrawdown,
}

impl SweepObjective {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sharpe" | "sharpe_ratio" => Ok(Self::Sharpe),
            "total_return" | "return" => Ok(Self::TotalReturn),
            "profit_factor" => Ok(Self::ProfitFactor),
            "win_rate" => Ok(Self::WinRate),
            "max_drawdown" | "drawdown" => Ok(Self::MaxDrawdown),
            other => Err(anyhow!(
                "SWEEP_OBJECTIVE must be one of sharpe, total_return, profit_factor, win_rate, max_drawdown (value: {})",
                other
            )),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Sharpe => "Sharpe ratio",
            Self::TotalReturn => "total return",
            Self::ProfitFactor => "profit factor",
            Self::WinRate => "win rate",
            Self::MaxDrawdown => "max drawdown",
        }
    }

    pub fn score(self, result: &BacktestResult) -> f64 {
        let score = match self {
            Self::Sharpe => result.sharpe_ratio,
            Self::TotalReturn => result.total_return,
            Self::ProfitFactor => result.profit_factor,
            Self::WinRate => result.win_rate,
            Self::MaxDrawdown => -result.max_drawdown,
        };
        if score.is_finite() {
            score
        } else {
            f64::NEG_INFINITY
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    pub max_combinations: usize,
    pub objective: SweepObjective,
    pub top_results: usize,
    /// Worker threads for the sweep pool.
    pub threads: usize,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            max_combinations: DEFAULT_MAX_COMBINATIONS,
            objective: SweepObjective::Sharpe,
            top_results: DEFAULT_TOP_RESULTS,
            threads: num_cpus::get(),
        }
    }
}

impl SweepSettings {
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        let max_combinations = optional_setting_usize(
            settings,
            "SWEEP_MAX_COMBINATIONS",
            1,
            defaults.max_combinations,
        )?;
        let objective = match optional_setting(settings, "SWEEP_OBJECTIVE") {
            Some(raw) => SweepObjective::parse(raw)?,
            None => defaults.objective,
        };
        let top_results =
            optional_setting_usize(settings, "SWEEP_TOP_RESULTS", 1, defaults.top_results)?;
        let threads = optional_setting_usize(settings, "SWEEP_THREADS", 1, defaults.threads)?;

        Ok(Self {
            max_combinations,
            objective,
            top_results,
            threads,
        })
    }

    /// Reads `SWEEP_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        let settings: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("SWEEP_"))
            .collect();
        Self::from_settings_map(&settings)
    }
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn optional_setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    min: usize,
    default: usize,
) -> Result<usize> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if value.fract() != 0.0 {
        return Err(anyhow!(
            "Setting {} must be an integer (value: {})",
            key,
            raw
        ));
    }
    if value < min as f64 {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(value as usize)
}
