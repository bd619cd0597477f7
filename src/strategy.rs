use crate::indicators::IndicatorCache;
use crate::inputs::StrategyScript;
use crate::models::ParameterSet;
use crate::param_utils::{resolve_period, FAST_LENGTH_KEYS, SLOW_LENGTH_KEYS};
use serde::{Deserialize, Serialize};

/// Signal flags produced for one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarSignal {
    pub long_entry: bool,
    pub long_exit: bool,
    pub short_entry: bool,
    pub short_exit: bool,
}

/// A signal rule for one strategy family. Implementations read indicator values at
/// `idx` and `idx - 1`; callers only pass `idx >= 1`.
pub trait SignalGenerator {
    fn family(&self) -> StrategyFamily;
    fn evaluate(&self, cache: &mut IndicatorCache<'_>, idx: usize) -> BarSignal;
}

#[path = "strategies/macd.rs"]
pub mod macd;

pub use macd::MacdHistogramStrategy;

#[path = "strategies/rsi.rs"]
pub mod rsi;

pub use rsi::RsiRecoveryStrategy;

#[path = "strategies/crossover.rs"]
pub mod crossover;

pub use crossover::{MovingAverageCrossStrategy, MovingAverageKind};

/// The closed set of signal shapes inferred from a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyFamily {
    Macd,
    Rsi,
    EmaCross,
    SmaCross,
    Fallback,
}

impl StrategyFamily {
    /// First-match-wins classification over the script's indicator keywords.
    ///
    /// Scripts referencing both RSI and MACD match neither single-indicator family and fall
    /// through to the moving-average branches.
    pub fn detect(script: &StrategyScript, params: &ParameterSet) -> Self {
        let fast = resolve_period(params, FAST_LENGTH_KEYS, 12);
        let slow = resolve_period(params, SLOW_LENGTH_KEYS, 26);

        if script.uses_macd && !script.uses_rsi {
            StrategyFamily::Macd
        } else if script.uses_rsi && !script.uses_macd {
            StrategyFamily::Rsi
        } else if script.uses_ema && (script.uses_sma || fast != slow) {
            StrategyFamily::EmaCross
        } else if script.uses_sma {
            StrategyFamily::SmaCross
        } else {
            StrategyFamily::Fallback
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "macd" => Some(Self::Macd),
            "rsi" => Some(Self::Rsi),
            "ema_cross" | "ema" => Some(Self::EmaCross),
            "sma_cross" | "sma" => Some(Self::SmaCross),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StrategyFamily::Macd => "MACD histogram cross",
            StrategyFamily::Rsi => "RSI recovery",
            StrategyFamily::EmaCross => "EMA crossover",
            StrategyFamily::SmaCross => "SMA crossover",
            StrategyFamily::Fallback => "SMA 20/50 crossover",
        }
    }
}

pub fn create_generator(
    family: StrategyFamily,
    params: &ParameterSet,
) -> Box<dyn SignalGenerator + Send + Sync> {
    match family {
        StrategyFamily::Macd => Box::new(MacdHistogramStrategy::new(params)),
        StrategyFamily::Rsi => Box::new(RsiRecoveryStrategy::new(params)),
        StrategyFamily::EmaCross => Box::new(MovingAverageCrossStrategy::from_parameters(
            MovingAverageKind::Exponential,
            params,
        )),
        StrategyFamily::SmaCross => Box::new(MovingAverageCrossStrategy::from_parameters(
            MovingAverageKind::Simple,
            params,
        )),
        StrategyFamily::Fallback => Box::new(MovingAverageCrossStrategy::fallback()),
    }
}
