use crate::models::{Parameter, ParameterKind, ParameterSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const FAST_LENGTH_KEYS: &[&str] = &["fastLength", "fast", "fastPeriod"];
pub const SLOW_LENGTH_KEYS: &[&str] = &["slowLength", "slow", "slowPeriod"];
pub const SIGNAL_LENGTH_KEYS: &[&str] = &["signalLength", "signal"];
pub const RSI_LENGTH_KEYS: &[&str] = &["rsiLength", "rsiPeriod", "length"];
pub const RSI_OVERBOUGHT_KEYS: &[&str] = &["rsiOverbought", "overbought"];
pub const RSI_OVERSOLD_KEYS: &[&str] = &["rsiOversold", "oversold"];
pub const STOP_LOSS_KEYS: &[&str] = &["stopLossPct", "stopLoss"];
/// Generic moving-average length. Resolved for reporting; no signal family reads it.
pub const MA_LENGTH_KEYS: &[&str] = &["maLength", "length", "period"];

/// Upper bound for any resolved indicator period.
pub const MAX_PERIOD: usize = 100_000;
/// Upper bound for the number of values one sweep axis may take.
pub const MAX_AXIS_VALUES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// Resolves a concept through an ordered alias list; the first finite value wins.
pub fn resolve_param(params: &ParameterSet, keys: &[&str], default: f64) -> f64 {
    keys.iter()
        .find_map(|key| params.get(*key).copied().filter(|v| v.is_finite()))
        .unwrap_or(default)
}

/// Resolves a period-like concept, rounded and clamped to `1..=MAX_PERIOD`.
pub fn resolve_period(params: &ParameterSet, keys: &[&str], default: usize) -> usize {
    let raw = resolve_param(params, keys, default as f64);
    raw.round().clamp(1.0, MAX_PERIOD as f64) as usize
}

/// Builds the parameter set for a run: extracted defaults overlaid with caller overrides.
pub fn merge_with_defaults(inputs: &[Parameter], overrides: &HashMap<String, f64>) -> ParameterSet {
    let mut merged: ParameterSet = inputs
        .iter()
        .map(|p| (p.name.clone(), p.default_value))
        .collect();
    for (key, value) in overrides {
        if value.is_finite() {
            merged.insert(key.clone(), *value);
        } else {
            log::warn!("Ignoring non-finite override for `{}`", key);
        }
    }
    merged
}

/// Suggests a sweep range from the parameter's name, falling back to its declared bounds.
pub fn suggest_range(parameter: &Parameter) -> ParameterRange {
    let name = parameter.name.to_lowercase();
    let def = parameter.default_value;
    let contains_any = |needles: &[&str]| needles.iter().any(|n| name.contains(n));

    if contains_any(&["length", "period", "lookback", "window", "bars"]) {
        return ParameterRange {
            min: (def * 0.3).floor().max(2.0),
            max: (def * 2.5).ceil(),
            step: (def * 0.1).floor().max(1.0),
        };
    }
    if contains_any(&["pct", "percent", "threshold", "level"]) {
        return ParameterRange {
            min: (def * 0.3).floor().max(1.0),
            max: (def * 2.0).ceil(),
            step: (def * 0.1).floor().max(1.0),
        };
    }
    if contains_any(&["mult", "factor", "ratio", "atr"]) {
        return ParameterRange {
            min: (def * 0.3).max(0.5),
            max: def * 3.0,
            step: 0.1,
        };
    }
    if name.contains("fast") {
        return ParameterRange {
            min: (def * 0.4).floor().max(2.0),
            max: (def * 2.0).ceil(),
            step: 1.0,
        };
    }
    if name.contains("slow") {
        return ParameterRange {
            min: (def * 0.4).floor().max(5.0),
            max: (def * 2.0).ceil(),
            step: 2.0,
        };
    }

    ParameterRange {
        min: parameter.min_value,
        max: parameter.max_value,
        step: parameter.step,
    }
}

/// Values visited by a sweep over `range`, inclusive of both ends where the step lands.
pub fn range_values(range: &ParameterRange, kind: ParameterKind) -> Vec<f64> {
    if !range.min.is_finite() || !range.max.is_finite() || range.max < range.min {
        return Vec::new();
    }
    if !range.step.is_finite() || range.step <= 0.0 {
        return vec![range.min];
    }

    let steps = ((range.max - range.min) / range.step + 1e-9).floor();
    let count = if steps >= MAX_AXIS_VALUES as f64 {
        log::warn!(
            "Range {}..{} step {} has more than {} values; truncating",
            range.min,
            range.max,
            range.step,
            MAX_AXIS_VALUES
        );
        MAX_AXIS_VALUES
    } else {
        steps as usize + 1
    };
    (0..count)
        .map(|i| {
            let value = range.min + i as f64 * range.step;
            match kind {
                ParameterKind::Int => value.round(),
                ParameterKind::Float => (value * 1e9).round() / 1e9,
            }
        })
        .fold(Vec::with_capacity(count), |mut acc, value| {
            if acc.last() != Some(&value) {
                acc.push(value);
            }
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, default_value: f64) -> Parameter {
        Parameter {
            name: name.to_string(),
            kind: ParameterKind::Int,
            default_value,
            min_value: 1.0,
            max_value: 99.0,
            step: 3.0,
            title: name.to_string(),
        }
    }

    #[test]
    fn alias_chain_prefers_earlier_keys() {
        let mut params = ParameterSet::new();
        assert_eq!(resolve_param(&params, FAST_LENGTH_KEYS, 12.0), 12.0);
        params.insert("fastPeriod".to_string(), 8.0);
        assert_eq!(resolve_param(&params, FAST_LENGTH_KEYS, 12.0), 8.0);
        params.insert("fast".to_string(), 5.0);
        assert_eq!(resolve_param(&params, FAST_LENGTH_KEYS, 12.0), 5.0);
        params.insert("fastLength".to_string(), 3.0);
        assert_eq!(resolve_param(&params, FAST_LENGTH_KEYS, 12.0), 3.0);
    }

    #[test]
    fn periods_round_and_floor_at_one() {
        let mut params = ParameterSet::new();
        params.insert("slow".to_string(), 25.6);
        assert_eq!(resolve_period(&params, SLOW_LENGTH_KEYS, 26), 26);
        params.insert("slowLength".to_string(), 0.0);
        assert_eq!(resolve_period(&params, SLOW_LENGTH_KEYS, 26), 1);
        params.insert("slowLength".to_string(), 1e20);
        assert_eq!(resolve_period(&params, SLOW_LENGTH_KEYS, 26), MAX_PERIOD);
    }

    #[test]
    fn ma_length_falls_back_to_generic_names() {
        let mut params = ParameterSet::new();
        assert_eq!(resolve_period(&params, MA_LENGTH_KEYS, 20), 20);
        params.insert("period".to_string(), 30.0);
        assert_eq!(resolve_period(&params, MA_LENGTH_KEYS, 20), 30);
    }

    #[test]
    fn overrides_replace_defaults() {
        let inputs = vec![param("rsiLength", 14.0), param("oversold", 30.0)];
        let mut overrides = HashMap::new();
        overrides.insert("rsiLength".to_string(), 21.0);
        overrides.insert("extra".to_string(), 1.0);
        overrides.insert("bad".to_string(), f64::NAN);
        let merged = merge_with_defaults(&inputs, &overrides);
        assert_eq!(merged.get("rsiLength"), Some(&21.0));
        assert_eq!(merged.get("oversold"), Some(&30.0));
        assert_eq!(merged.get("extra"), Some(&1.0));
        assert!(!merged.contains_key("bad"));
    }

    #[test]
    fn suggested_ranges_follow_name_heuristics() {
        let range = suggest_range(&param("rsiLength", 14.0));
        assert_eq!(range, ParameterRange { min: 4.0, max: 35.0, step: 1.0 });

        let range = suggest_range(&param("fastEma", 10.0));
        assert_eq!(range, ParameterRange { min: 4.0, max: 20.0, step: 1.0 });

        let range = suggest_range(&param("threshold", 30.0));
        assert_eq!(range, ParameterRange { min: 9.0, max: 60.0, step: 3.0 });

        let range = suggest_range(&param("other", 30.0));
        assert_eq!(range, ParameterRange { min: 1.0, max: 99.0, step: 3.0 });
    }

    #[test]
    fn range_values_are_inclusive() {
        let range = ParameterRange { min: 10.0, max: 20.0, step: 5.0 };
        assert_eq!(range_values(&range, ParameterKind::Int), vec![10.0, 15.0, 20.0]);

        let range = ParameterRange { min: 0.5, max: 1.0, step: 0.1 };
        let values = range_values(&range, ParameterKind::Float);
        assert_eq!(values.len(), 6);
        assert!((values[5] - 1.0).abs() < 1e-9);

        let range = ParameterRange { min: 2.0, max: 1.0, step: 1.0 };
        assert!(range_values(&range, ParameterKind::Int).is_empty());
    }

    #[test]
    fn dense_ranges_are_truncated_per_axis() {
        let range = ParameterRange { min: 0.0, max: 1_000_000.0, step: 0.0001 };
        let values = range_values(&range, ParameterKind::Float);
        assert_eq!(values.len(), MAX_AXIS_VALUES);
        assert_eq!(values[0], 0.0);
        assert!((values[1] - 0.0001).abs() < 1e-12);
    }

}
