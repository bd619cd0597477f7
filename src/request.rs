use crate::config::BacktestConfig;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::models::{BacktestResult, Bar};
use crate::strategy::StrategyFamily;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MIN_BARS: usize = 10;
pub const MIN_SCRIPT_CHARS: usize = 10;

/// A backtest as submitted from outside the process, typically decoded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRequest {
    pub script: String,
    pub bars: Vec<Bar>,
    #[serde(default)]
    pub params: HashMap<String, f64>,
    #[serde(flatten)]
    pub config: BacktestConfig,
    /// Forces a signal family instead of inferring one from the script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<StrategyFamily>,
}

impl BacktestRequest {
    pub fn validate(&self) -> EngineResult<()> {
        if self.bars.len() < MIN_BARS {
            return Err(EngineError::invalid(format!(
                "at least {} bars are required (got {})",
                MIN_BARS,
                self.bars.len()
            )));
        }
        if self.script.trim().chars().count() < MIN_SCRIPT_CHARS {
            return Err(EngineError::invalid(
                "strategy script is too short to contain any declarations",
            ));
        }
        if !self.config.initial_capital.is_finite() || self.config.initial_capital <= 0.0 {
            return Err(EngineError::invalid(format!(
                "initial capital must be positive (got {})",
                self.config.initial_capital
            )));
        }
        if !self.config.commission_pct.is_finite() || self.config.commission_pct < 0.0 {
            return Err(EngineError::invalid(format!(
                "commission must be non-negative (got {})",
                self.config.commission_pct
            )));
        }
        if let Some((name, _)) = self.params.iter().find(|(_, v)| !v.is_finite()) {
            return Err(EngineError::invalid(format!(
                "parameter `{}` must be a finite number",
                name
            )));
        }
        Ok(())
    }

    pub fn engine(&self) -> Engine {
        self.family.map(Engine::with_family).unwrap_or_default()
    }

    pub fn execute(&self) -> EngineResult<BacktestResult> {
        self.validate()?;
        self.engine()
            .backtest(&self.bars, &self.script, &self.params, &self.config)
    }
}
