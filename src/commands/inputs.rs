use super::{emit_json, read_script};
use crate::inputs::StrategyScript;
use crate::models::{Parameter, ParameterSet};
use crate::param_utils::{
    resolve_period, FAST_LENGTH_KEYS, MA_LENGTH_KEYS, RSI_LENGTH_KEYS, SIGNAL_LENGTH_KEYS,
    SLOW_LENGTH_KEYS,
};
use crate::strategy::StrategyFamily;
use anyhow::Result;
use log::info;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScriptSummary {
    name: String,
    description: String,
    family: StrategyFamily,
    indicators: Vec<&'static str>,
    has_long_entry: bool,
    has_short_entry: bool,
    periods: ResolvedPeriods,
    inputs: Vec<Parameter>,
}

/// Periods the signal families would use with the script's defaults.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolvedPeriods {
    fast: usize,
    slow: usize,
    signal: usize,
    rsi: usize,
    ma_length: usize,
}

impl ResolvedPeriods {
    fn from_params(params: &ParameterSet) -> Self {
        Self {
            fast: resolve_period(params, FAST_LENGTH_KEYS, 12),
            slow: resolve_period(params, SLOW_LENGTH_KEYS, 26),
            signal: resolve_period(params, SIGNAL_LENGTH_KEYS, 9),
            rsi: resolve_period(params, RSI_LENGTH_KEYS, 14),
            ma_length: resolve_period(params, MA_LENGTH_KEYS, 20),
        }
    }
}

pub fn run(script_path: &Path) -> Result<()> {
    let source = read_script(script_path)?;
    let script = StrategyScript::parse(&source);
    let defaults: ParameterSet = script
        .inputs
        .iter()
        .map(|p| (p.name.clone(), p.default_value))
        .collect();
    let family = StrategyFamily::detect(&script, &defaults);
    info!(
        "{}: {} ({} signals)",
        script.name,
        script.description(),
        family.label()
    );
    for input in &script.inputs {
        info!(
            "  {} ({}) = {} in [{}, {}]",
            input.name,
            input.kind.as_str(),
            input.default_value,
            input.min_value,
            input.max_value
        );
    }

    emit_json(
        &ScriptSummary {
            name: script.name.clone(),
            description: script.description(),
            family,
            indicators: script.indicator_labels(),
            has_long_entry: script.has_long_entry,
            has_short_entry: script.has_short_entry,
            periods: ResolvedPeriods::from_params(&defaults),
            inputs: script.inputs,
        },
        None,
    )
}
