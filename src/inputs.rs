//! Scans strategy scripts for tunable numeric inputs and surface features.
//!
//! Three declaration forms are recognised:
//!
//! ```text
//! fastLength = input.int(12, title="Fast", minval=2, maxval=50, step=1)
//! stopLossPct = input.float(2.5, "Stop %")
//! legacyLength = input(20)
//! ```
//!
//! Extraction never fails. Declarations whose default is not a numeric literal are skipped.

use crate::models::{Parameter, ParameterKind};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const DEFAULT_STRATEGY_NAME: &str = "Custom Strategy";

struct ScriptPatterns {
    int_input: Regex,
    float_input: Regex,
    legacy_input: Regex,
    strategy_name: Regex,
    sma: Regex,
    ema: Regex,
    rsi: Regex,
    macd: Regex,
    bollinger: Regex,
    atr: Regex,
    long_entry: Regex,
    short_entry: Regex,
}

fn patterns() -> &'static ScriptPatterns {
    static PATTERNS: OnceLock<ScriptPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let build = |pattern: &str| Regex::new(pattern).expect("static script pattern");
        ScriptPatterns {
            int_input: build(r"\b([A-Za-z_]\w*)\s*=\s*input\.int\s*\("),
            float_input: build(r"\b([A-Za-z_]\w*)\s*=\s*input\.float\s*\("),
            legacy_input: build(r"\b([A-Za-z_]\w*)\s*=\s*input\s*\("),
            strategy_name: build(r#"strategy\s*\(\s*["']([^"']+)["']"#),
            sma: build(r"ta\.sma|sma\("),
            ema: build(r"ta\.ema|ema\("),
            rsi: build(r"ta\.rsi|rsi\("),
            macd: build(r"ta\.macd|macd\("),
            bollinger: build(r"(?i)ta\.bb|bb\(|bollinger"),
            atr: build(r"ta\.atr|atr\("),
            long_entry: build(r"strategy\.entry[^\n]*long|strategy\.long"),
            short_entry: build(r#"strategy\.entry[^\n]*["']short["']|strategy\.short"#),
        }
    })
}

/// Extracts tunable inputs in declaration order: typed int, typed float, then legacy.
pub fn extract(source: &str) -> Vec<Parameter> {
    let patterns = patterns();
    let mut seen = HashSet::new();
    let mut parameters = Vec::new();

    let forms = [
        (&patterns.int_input, Some(ParameterKind::Int)),
        (&patterns.float_input, Some(ParameterKind::Float)),
        (&patterns.legacy_input, None),
    ];

    for (pattern, kind) in forms {
        for captures in pattern.captures_iter(source) {
            let (Some(name), Some(whole)) = (captures.get(1), captures.get(0)) else {
                continue;
            };
            let name = name.as_str();
            if seen.contains(name) {
                continue;
            }
            let Some(args) = call_arguments(&source[whole.end()..]) else {
                continue;
            };
            if let Some(parameter) = build_parameter(name, kind, &args) {
                seen.insert(name.to_string());
                parameters.push(parameter);
            }
        }
    }

    parameters
}

/// Surface features of a strategy script used for naming and family detection.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyScript {
    pub name: String,
    pub inputs: Vec<Parameter>,
    pub uses_sma: bool,
    pub uses_ema: bool,
    pub uses_rsi: bool,
    pub uses_macd: bool,
    pub uses_bollinger: bool,
    pub uses_atr: bool,
    pub has_long_entry: bool,
    pub has_short_entry: bool,
}

impl StrategyScript {
    pub fn parse(source: &str) -> Self {
        let patterns = patterns();
        let name = patterns
            .strategy_name
            .captures(source)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_STRATEGY_NAME.to_string());

        Self {
            name,
            inputs: extract(source),
            uses_sma: patterns.sma.is_match(source),
            uses_ema: patterns.ema.is_match(source),
            uses_rsi: patterns.rsi.is_match(source),
            uses_macd: patterns.macd.is_match(source),
            uses_bollinger: patterns.bollinger.is_match(source),
            uses_atr: patterns.atr.is_match(source),
            has_long_entry: patterns.long_entry.is_match(source),
            has_short_entry: patterns.short_entry.is_match(source),
        }
    }

    pub fn indicator_labels(&self) -> Vec<&'static str> {
        [
            (self.uses_sma, "SMA"),
            (self.uses_ema, "EMA"),
            (self.uses_rsi, "RSI"),
            (self.uses_macd, "MACD"),
            (self.uses_bollinger, "Bollinger Bands"),
            (self.uses_atr, "ATR"),
        ]
        .into_iter()
        .filter_map(|(used, label)| used.then_some(label))
        .collect()
    }

    pub fn description(&self) -> String {
        let direction = match (self.has_long_entry, self.has_short_entry) {
            (true, true) => "Long/short",
            (false, true) => "Short-only",
            _ => "Long-only",
        };
        let indicators = self.indicator_labels();
        let mut description = format!("{} strategy", direction);
        if !indicators.is_empty() {
            description.push_str(&format!(" using {}", indicators.join(", ")));
        }
        description.push_str(&format!("; {} tunable parameters", self.inputs.len()));
        description
    }
}

/// Returns the raw argument list of a call whose opening parenthesis was already consumed.
fn call_arguments(rest: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for ch in rest.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' | '[' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' if depth > 0 => {
                depth -= 1;
                current.push(ch);
            }
            ')' => {
                if !current.trim().is_empty() {
                    args.push(current.trim().to_string());
                }
                return Some(args);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    None
}

fn split_keyword(arg: &str) -> Option<(&str, &str)> {
    let (key, value) = arg.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key, value.trim()))
}

fn unquote(value: &str) -> Option<&str> {
    let value = value.trim();
    let first = value.chars().next()?;
    if (first == '"' || first == '\'') && value.len() >= 2 && value.ends_with(first) {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == '-')
    {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn build_parameter(name: &str, kind: Option<ParameterKind>, args: &[String]) -> Option<Parameter> {
    let mut default_value = None;
    let mut title = None;
    let mut min_value = None;
    let mut max_value = None;
    let mut step = None;
    let mut positional = 0usize;

    for arg in args {
        if let Some((key, value)) = split_keyword(arg) {
            match key {
                "defval" => default_value = default_value.or(parse_number(value)),
                "title" => title = unquote(value).map(str::to_string),
                "minval" => min_value = parse_number(value),
                "maxval" => max_value = parse_number(value),
                "step" => step = parse_number(value),
                _ => {}
            }
            continue;
        }

        match positional {
            0 => default_value = parse_number(arg),
            1 => {
                if title.is_none() {
                    title = unquote(arg).map(str::to_string);
                }
            }
            _ => {}
        }
        positional += 1;
    }

    let default_value = default_value?;
    let kind = kind.unwrap_or(if default_value.fract() == 0.0 {
        ParameterKind::Int
    } else {
        ParameterKind::Float
    });

    let (heuristic_min, heuristic_max, heuristic_step) = derived_bounds(kind, default_value);

    Some(Parameter {
        name: name.to_string(),
        kind,
        default_value,
        min_value: min_value.unwrap_or(heuristic_min),
        max_value: max_value.unwrap_or(heuristic_max),
        step: step.unwrap_or(heuristic_step),
        title: title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| name.to_string()),
    })
}

/// Bounds and step derived from a default when the script does not state them.
pub fn derived_bounds(kind: ParameterKind, default_value: f64) -> (f64, f64, f64) {
    match kind {
        ParameterKind::Int => (
            (default_value * 0.2).floor().max(1.0),
            (default_value * 3.0).ceil(),
            (default_value * 0.1).floor().max(1.0),
        ),
        ParameterKind::Float => (
            (default_value * 0.2).max(0.01),
            default_value * 3.0,
            default_value * 0.1,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSI_SCRIPT: &str = r#"
//@version=5
strategy("RSI Reversal", overlay=true)
rsiLength = input.int(14, title="RSI Length", minval=5, maxval=50)
rsiOverbought = input.int(70, "Overbought Level", minval=60, maxval=90)
stopLossPct = input.float(2.0, "Stop Loss %", minval=0.5, maxval=10.0, step=0.5)
legacy = input(20)
rsiValue = ta.rsi(close, rsiLength)
if ta.crossover(rsiValue, 30)
    strategy.entry("Long", strategy.long)
"#;

    #[test]
    fn extracts_explicit_metadata() {
        let params = extract(r#"rsiLength = input.int(14, title="RSI Length", minval=5, maxval=50)"#);
        assert_eq!(params.len(), 1);
        let p = &params[0];
        assert_eq!(p.name, "rsiLength");
        assert_eq!(p.kind, ParameterKind::Int);
        assert_eq!(p.default_value, 14.0);
        assert_eq!(p.min_value, 5.0);
        assert_eq!(p.max_value, 50.0);
        assert_eq!(p.title, "RSI Length");
        assert_eq!(p.step, 1.0);
    }

    #[test]
    fn derives_bounds_for_int_and_float() {
        let params = extract("len = input.int(20)\nmult = input.float(2.0)");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].min_value, 4.0);
        assert_eq!(params[0].max_value, 60.0);
        assert_eq!(params[0].step, 2.0);
        assert_eq!(params[0].title, "len");

        assert!((params[1].min_value - 0.4).abs() < 1e-12);
        assert!((params[1].max_value - 6.0).abs() < 1e-12);
        assert!((params[1].step - 0.2).abs() < 1e-12);
    }

    #[test]
    fn small_int_defaults_clamp_to_one() {
        let params = extract("n = input.int(3)");
        assert_eq!(params[0].min_value, 1.0);
        assert_eq!(params[0].step, 1.0);
        assert_eq!(params[0].max_value, 9.0);
    }

    #[test]
    fn orders_typed_int_then_float_then_legacy() {
        let source = "a = input(5)\nb = input.float(1.5)\nc = input.int(7)";
        let names: Vec<_> = extract(source).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn first_declaration_wins() {
        let source = "len = input.int(10, title=\"First\")\nlen = input.float(3.5, title=\"Second\")\nlen = input(99)";
        let params = extract(source);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].title, "First");
        assert_eq!(params[0].default_value, 10.0);
    }

    #[test]
    fn legacy_kind_follows_literal() {
        let params = extract("a = input(2.5)\nb = input(8)");
        assert_eq!(params[0].kind, ParameterKind::Float);
        assert_eq!(params[1].kind, ParameterKind::Int);
    }

    #[test]
    fn malformed_declarations_are_skipped() {
        assert!(extract("").is_empty());
        assert!(extract("src = input(close)").is_empty());
        assert!(extract("x = input.int(").is_empty());
        assert!(extract("flag = input.bool(true)").is_empty());
    }

    #[test]
    fn extraction_is_idempotent() {
        let first = extract(RSI_SCRIPT);
        let second = extract(RSI_SCRIPT);
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn parses_script_features() {
        let script = StrategyScript::parse(RSI_SCRIPT);
        assert_eq!(script.name, "RSI Reversal");
        assert!(script.uses_rsi);
        assert!(!script.uses_macd);
        assert!(script.has_long_entry);
        assert!(!script.has_short_entry);
        assert_eq!(
            script.description(),
            "Long-only strategy using RSI; 4 tunable parameters"
        );
    }

    #[test]
    fn detects_quoted_short_entries() {
        let script = StrategyScript::parse("strategy.entry(\"short\", strategy.short)");
        assert!(script.has_short_entry);
        let script = StrategyScript::parse("strategy.entry(\"Long\", strategy.long)");
        assert!(!script.has_short_entry);
        assert_eq!(script.name, DEFAULT_STRATEGY_NAME);
    }
}
