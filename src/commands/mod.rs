pub mod aggregate;
pub mod backtest;
pub mod inputs;
pub mod results;
pub mod suggest;
pub mod sweep;

use crate::config::BacktestConfig;
use crate::market_data::load_bars;
use crate::models::Bar;
use crate::store::{JsonFileStore, ResultRecord, StrategyRecord};
use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_STORE_DIR: &str = "data";
const STRATEGY_STORE_FILE: &str = "strategies.json";
const RESULT_STORE_FILE: &str = "results.json";

/// Inputs shared by every command that runs the engine.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Strategy script file
    #[arg(long, value_name = "PATH")]
    pub script: PathBuf,
    /// Bars as a JSON array or a .bin snapshot
    #[arg(long, value_name = "PATH")]
    pub bars: PathBuf,
    /// JSON object of parameter overrides
    #[arg(long, value_name = "PATH")]
    pub params: Option<PathBuf>,
    /// Individual overrides as name=value; applied after --params
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub set: Vec<String>,
    /// Display name; defaults to the name declared in the script
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, default_value = "UNKNOWN")]
    pub symbol: String,
    #[arg(long, default_value = "1d")]
    pub timeframe: String,
    #[arg(long, default_value = "")]
    pub start_date: String,
    #[arg(long, default_value = "")]
    pub end_date: String,
    #[arg(long, default_value_t = crate::config::DEFAULT_INITIAL_CAPITAL)]
    pub capital: f64,
    /// Commission percent per side
    #[arg(long, default_value_t = crate::config::DEFAULT_COMMISSION_PCT)]
    pub commission: f64,
}

impl RunArgs {
    pub fn read_script(&self) -> Result<String> {
        read_script(&self.script)
    }

    pub fn load_bars(&self) -> Result<Vec<Bar>> {
        load_bars(&self.bars)
    }

    pub fn overrides(&self) -> Result<HashMap<String, f64>> {
        let mut overrides: HashMap<String, f64> = match &self.params {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read parameters from {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Parameters in {} must be a JSON object of numbers", path.display()))?
            }
            None => HashMap::new(),
        };
        for assignment in &self.set {
            let (name, value) = parse_assignment(assignment)?;
            overrides.insert(name, value);
        }
        Ok(overrides)
    }

    pub fn config(&self) -> BacktestConfig {
        BacktestConfig {
            strategy_name: self.name.clone().unwrap_or_default(),
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            initial_capital: self.capital,
            commission_pct: self.commission,
        }
    }
}

/// Parses `name=value` into an override.
pub fn parse_assignment(raw: &str) -> Result<(String, f64)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Override `{}` must look like name=value", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("Override `{}` has an empty name", raw));
    }
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|_| anyhow!("Override `{}` must have a numeric value", raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Override `{}` must be finite", raw));
    }
    Ok((name.to_string(), value))
}

pub fn read_script(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read strategy script {}", path.display()))
}

pub fn strategy_store(dir: &Path) -> JsonFileStore<StrategyRecord> {
    JsonFileStore::new(dir.join(STRATEGY_STORE_FILE))
}

pub fn result_store(dir: &Path) -> JsonFileStore<ResultRecord> {
    JsonFileStore::new(dir.join(RESULT_STORE_FILE))
}

/// Writes `value` as pretty JSON to `output`, or to stdout when no path is given.
pub fn emit_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create output directory {}", parent.display())
                    })?;
                }
            }
            fs::write(path, json)
                .with_context(|| format!("Failed to write output to {}", path.display()))
        }
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_parse_name_and_value() {
        assert_eq!(
            parse_assignment(" fastLength = 8 ").unwrap(),
            ("fastLength".to_string(), 8.0)
        );
        assert!(parse_assignment("fastLength").is_err());
        assert!(parse_assignment("=3").is_err());
        assert!(parse_assignment("x=abc").is_err());
        assert!(parse_assignment("x=inf").is_err());
    }
}
