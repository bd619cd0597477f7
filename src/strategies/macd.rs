use crate::indicators::IndicatorCache;
use crate::models::ParameterSet;
use crate::param_utils::{
    resolve_period, FAST_LENGTH_KEYS, SIGNAL_LENGTH_KEYS, SLOW_LENGTH_KEYS,
};

use super::{BarSignal, SignalGenerator, StrategyFamily};

/// Enters on histogram zero crossings; exits while the histogram sits on the wrong side.
pub struct MacdHistogramStrategy {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl MacdHistogramStrategy {
    pub fn new(parameters: &ParameterSet) -> Self {
        Self {
            fast_period: resolve_period(parameters, FAST_LENGTH_KEYS, 12),
            slow_period: resolve_period(parameters, SLOW_LENGTH_KEYS, 26),
            signal_period: resolve_period(parameters, SIGNAL_LENGTH_KEYS, 9),
        }
    }
}

impl SignalGenerator for MacdHistogramStrategy {
    fn family(&self) -> StrategyFamily {
        StrategyFamily::Macd
    }

    fn evaluate(&self, cache: &mut IndicatorCache<'_>, idx: usize) -> BarSignal {
        let current = cache
            .macd(self.fast_period, self.slow_period, self.signal_period, idx)
            .histogram;
        let previous = cache
            .macd(self.fast_period, self.slow_period, self.signal_period, idx - 1)
            .histogram;

        BarSignal {
            long_entry: previous < 0.0 && current > 0.0,
            short_entry: previous > 0.0 && current < 0.0,
            long_exit: current < 0.0,
            short_exit: current > 0.0,
        }
    }
}
