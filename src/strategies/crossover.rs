use crate::indicators::IndicatorCache;
use crate::models::ParameterSet;
use crate::param_utils::{resolve_period, FAST_LENGTH_KEYS, SLOW_LENGTH_KEYS};

use super::{BarSignal, SignalGenerator, StrategyFamily};

const FALLBACK_FAST_PERIOD: usize = 20;
const FALLBACK_SLOW_PERIOD: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovingAverageKind {
    Simple,
    Exponential,
}

/// Fast/slow moving average crossover. Entries are edge-triggered, exits are level checks.
pub struct MovingAverageCrossStrategy {
    kind: MovingAverageKind,
    fast_period: usize,
    slow_period: usize,
    family: StrategyFamily,
}

impl MovingAverageCrossStrategy {
    pub fn from_parameters(kind: MovingAverageKind, parameters: &ParameterSet) -> Self {
        let family = match kind {
            MovingAverageKind::Simple => StrategyFamily::SmaCross,
            MovingAverageKind::Exponential => StrategyFamily::EmaCross,
        };
        Self {
            kind,
            fast_period: resolve_period(parameters, FAST_LENGTH_KEYS, 12),
            slow_period: resolve_period(parameters, SLOW_LENGTH_KEYS, 26),
            family,
        }
    }

    /// Fixed SMA 20/50 crossover used when no indicator keywords are recognised.
    pub fn fallback() -> Self {
        Self {
            kind: MovingAverageKind::Simple,
            fast_period: FALLBACK_FAST_PERIOD,
            slow_period: FALLBACK_SLOW_PERIOD,
            family: StrategyFamily::Fallback,
        }
    }

    fn average(&self, cache: &mut IndicatorCache<'_>, period: usize, idx: usize) -> f64 {
        match self.kind {
            MovingAverageKind::Simple => cache.sma(period, idx),
            MovingAverageKind::Exponential => cache.ema(period, idx),
        }
    }
}

pub fn crossed_above(previous_a: f64, previous_b: f64, a: f64, b: f64) -> bool {
    previous_a < previous_b && a > b
}

pub fn crossed_below(previous_a: f64, previous_b: f64, a: f64, b: f64) -> bool {
    previous_a > previous_b && a < b
}

impl SignalGenerator for MovingAverageCrossStrategy {
    fn family(&self) -> StrategyFamily {
        self.family
    }

    fn evaluate(&self, cache: &mut IndicatorCache<'_>, idx: usize) -> BarSignal {
        let fast = self.average(cache, self.fast_period, idx);
        let slow = self.average(cache, self.slow_period, idx);
        let previous_fast = self.average(cache, self.fast_period, idx - 1);
        let previous_slow = self.average(cache, self.slow_period, idx - 1);

        BarSignal {
            long_entry: crossed_above(previous_fast, previous_slow, fast, slow),
            short_entry: crossed_below(previous_fast, previous_slow, fast, slow),
            long_exit: fast < slow,
            short_exit: fast > slow,
        }
    }
}
