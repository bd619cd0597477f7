use crate::param_utils::ParameterRange;
use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What an advisor is asked about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceRequest {
    pub script: String,
    pub symbol: String,
    pub timeframe: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSuggestion {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub reason: String,
}

impl ParameterSuggestion {
    fn new(name: &str, min: f64, max: f64, step: f64, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
            step,
            reason: reason.to_string(),
        }
    }

    pub fn range(&self) -> ParameterRange {
        ParameterRange {
            min: self.min,
            max: self.max,
            step: self.step,
        }
    }

    fn is_usable(&self) -> bool {
        !self.name.trim().is_empty()
            && self.min.is_finite()
            && self.max.is_finite()
            && self.step.is_finite()
            && self.step > 0.0
            && self.max >= self.min
    }
}

/// Source of sweep range suggestions for a script. Implementations may call out to an
/// external service; the engine treats them as opaque.
pub trait ParameterAdvisor: Send + Sync {
    fn name(&self) -> &str;
    fn suggest(&self, request: &AdviceRequest) -> Result<Vec<ParameterSuggestion>>;
}

/// Offline advisor that keys suggestions off words in the script text.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAdvisor;

impl ParameterAdvisor for KeywordAdvisor {
    fn name(&self) -> &str {
        "keyword"
    }

    fn suggest(&self, request: &AdviceRequest) -> Result<Vec<ParameterSuggestion>> {
        let script = request.script.as_str();
        let mentions = |needles: &[&str]| needles.iter().any(|n| script.contains(n));
        let mut suggestions = Vec::new();

        if mentions(&["rsiLength", "RSI"]) {
            suggestions.push(ParameterSuggestion::new(
                "rsiLength",
                8.0,
                21.0,
                1.0,
                "RSI periods between 8 and 21 respond well on volatile markets",
            ));
            suggestions.push(ParameterSuggestion::new(
                "rsiOverbought",
                65.0,
                80.0,
                5.0,
                "Test overbought thresholds between 65 and 80",
            ));
            suggestions.push(ParameterSuggestion::new(
                "rsiOversold",
                20.0,
                35.0,
                5.0,
                "Test oversold thresholds between 20 and 35",
            ));
        }
        if mentions(&["emaPeriod", "ema"]) {
            suggestions.push(ParameterSuggestion::new(
                "emaPeriod",
                100.0,
                300.0,
                50.0,
                "Long EMA trend filters usually sit between 100 and 300 bars",
            ));
        }
        if mentions(&["stopLoss", "stop"]) {
            suggestions.push(ParameterSuggestion::new(
                "stopLossPct",
                1.0,
                5.0,
                0.5,
                "Stops between 1% and 5% avoid being shaken out by noise",
            ));
        }
        if mentions(&["takeProfit", "limit"]) {
            suggestions.push(ParameterSuggestion::new(
                "takeProfitPct",
                2.0,
                10.0,
                1.0,
                "Keep the profit target at least twice the stop distance",
            ));
        }

        Ok(suggestions)
    }
}

#[derive(Deserialize)]
struct SuggestionEnvelope {
    #[serde(default)]
    suggestions: Vec<ParameterSuggestion>,
}

/// Decodes a `{"suggestions": [...]}` payload, dropping entries with unusable ranges.
pub fn parse_suggestions(payload: &str) -> Result<Vec<ParameterSuggestion>> {
    let envelope: SuggestionEnvelope =
        serde_json::from_str(payload).context("Advisor response is not valid suggestion JSON")?;
    let (usable, rejected): (Vec<_>, Vec<_>) = envelope
        .suggestions
        .into_iter()
        .partition(ParameterSuggestion::is_usable);
    for suggestion in rejected {
        warn!("Discarding unusable suggestion for `{}`", suggestion.name);
    }
    Ok(usable)
}

/// Asks `primary` first and falls back to [`KeywordAdvisor`] if it fails.
pub fn suggest_with_fallback(
    primary: Option<&dyn ParameterAdvisor>,
    request: &AdviceRequest,
) -> Vec<ParameterSuggestion> {
    if let Some(advisor) = primary {
        match advisor.suggest(request) {
            Ok(suggestions) => return suggestions,
            Err(e) => warn!(
                "Advisor `{}` failed ({}); using keyword suggestions",
                advisor.name(),
                e
            ),
        }
    }
    KeywordAdvisor.suggest(request).unwrap_or_default()
}

/// Suggestion ranges keyed by parameter name, for overriding sweep dimensions.
pub fn suggestion_ranges(suggestions: &[ParameterSuggestion]) -> HashMap<String, ParameterRange> {
    suggestions
        .iter()
        .filter(|s| s.is_usable())
        .map(|s| (s.name.clone(), s.range()))
        .collect()
}
