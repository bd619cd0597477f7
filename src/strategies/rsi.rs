use crate::indicators::IndicatorCache;
use crate::models::ParameterSet;
use crate::param_utils::{
    resolve_param, resolve_period, RSI_LENGTH_KEYS, RSI_OVERBOUGHT_KEYS, RSI_OVERSOLD_KEYS,
};

use super::{BarSignal, SignalGenerator, StrategyFamily};

pub struct RsiRecoveryStrategy {
    period: usize,
    oversold_level: f64,
    overbought_level: f64,
}

impl RsiRecoveryStrategy {
    pub fn new(parameters: &ParameterSet) -> Self {
        Self {
            period: resolve_period(parameters, RSI_LENGTH_KEYS, 14),
            oversold_level: resolve_param(parameters, RSI_OVERSOLD_KEYS, 30.0),
            overbought_level: resolve_param(parameters, RSI_OVERBOUGHT_KEYS, 70.0),
        }
    }
}

impl SignalGenerator for RsiRecoveryStrategy {
    fn family(&self) -> StrategyFamily {
        StrategyFamily::Rsi
    }

    fn evaluate(&self, cache: &mut IndicatorCache<'_>, idx: usize) -> BarSignal {
        let current_rsi = cache.rsi(self.period, idx);
        let previous_rsi = cache.rsi(self.period, idx - 1);

        BarSignal {
            // Recovery out of oversold
            long_entry: previous_rsi < self.oversold_level && current_rsi >= self.oversold_level,
            long_exit: current_rsi > self.overbought_level,
            // Rollover out of overbought
            short_entry: previous_rsi > self.overbought_level
                && current_rsi <= self.overbought_level,
            short_exit: current_rsi < self.oversold_level,
        }
    }
}
