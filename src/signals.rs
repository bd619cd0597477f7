use log::debug;

use crate::indicators::IndicatorCache;
use crate::inputs::StrategyScript;
use crate::models::{Bar, ParameterSet, SignalSet};
use crate::param_utils::{resolve_period, SLOW_LENGTH_KEYS};
use crate::strategy::{create_generator, StrategyFamily};

/// Bars every family waits for before emitting anything.
pub const MIN_WARM_UP_BARS: usize = 50;

/// First index at which signals may fire: `max(slow length, 50)`.
pub fn warm_up_index(params: &ParameterSet) -> usize {
    resolve_period(params, SLOW_LENGTH_KEYS, 26).max(MIN_WARM_UP_BARS)
}

/// Classifies `source` and produces the four signal vectors for `bars`.
///
/// This is a keyword classifier, not an interpreter: the script only selects one of
/// five fixed signal shapes and supplies their parameters.
pub fn detect(bars: &[Bar], source: &str, params: &ParameterSet) -> SignalSet {
    let script = StrategyScript::parse(source);
    let family = StrategyFamily::detect(&script, params);
    let mut cache = IndicatorCache::new(bars);
    generate_signals(&mut cache, family, params)
}

/// Evaluates one family over every bar past the warm-up window.
pub fn generate_signals(
    cache: &mut IndicatorCache<'_>,
    family: StrategyFamily,
    params: &ParameterSet,
) -> SignalSet {
    let len = cache.len();
    let mut signals = SignalSet::flat(len);
    let warm_up = warm_up_index(params);

    if len <= warm_up {
        debug!(
            "{} bars do not cover the {}-bar warm-up window; no signals",
            len, warm_up
        );
        return signals;
    }

    let generator = create_generator(family, params);
    for idx in warm_up..len {
        let bar_signal = generator.evaluate(cache, idx);
        signals.long_entry[idx] = bar_signal.long_entry;
        signals.long_exit[idx] = bar_signal.long_exit;
        signals.short_entry[idx] = bar_signal.short_entry;
        signals.short_exit[idx] = bar_signal.short_exit;
    }

    debug!(
        "{} signals: {} entries over {} bars ({} cached series)",
        generator.family().label(),
        signals.entry_count(),
        len,
        cache.cached_series()
    );
    signals
}
