use crate::models::Bar;
use std::collections::HashMap;

/// Trailing mean of `period` prices; indices before the first full window carry the raw price.
pub fn calculate_sma(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }
    let period = period.max(1);
    if period == 1 || prices.len() < period {
        return prices.to_vec();
    }

    let mut sma_values = Vec::with_capacity(prices.len());
    sma_values.extend_from_slice(&prices[..period - 1]);

    let mut window_sum: f64 = prices[..period].iter().sum();
    sma_values.push(window_sum / period as f64);
    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        sma_values.push(window_sum / period as f64);
    }

    sma_values
}

pub fn calculate_ema(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }

    let multiplier = 2.0 / (period.max(1) as f64 + 1.0);
    let mut ema_values = Vec::with_capacity(prices.len());
    ema_values.push(prices[0]);

    for i in 1..prices.len() {
        let ema = (prices[i] * multiplier) + (ema_values[i - 1] * (1.0 - multiplier));
        ema_values.push(ema);
    }

    ema_values
}

fn rsi_from_avgs(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Wilder RSI. Indices before the seed (the first `period` differences) read 50.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }
    if period == 0 || prices.len() <= period {
        return vec![50.0; prices.len()];
    }

    let mut rsi_values = vec![50.0; prices.len()];
    let mut sum_gain = 0.0f64;
    let mut sum_loss = 0.0f64;
    for i in 1..=period {
        let delta = prices[i] - prices[i - 1];
        if delta >= 0.0 {
            sum_gain += delta;
        } else {
            sum_loss += -delta;
        }
    }

    let mut avg_gain = sum_gain / period as f64;
    let mut avg_loss = sum_loss / period as f64;
    rsi_values[period] = rsi_from_avgs(avg_gain, avg_loss);

    for i in (period + 1)..prices.len() {
        let delta = prices[i] - prices[i - 1];
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { -delta } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        rsi_values[i] = rsi_from_avgs(avg_gain, avg_loss);
    }

    rsi_values
}

/// Average true range aligned to bar indices. Index 0 reads 0; the first `period` true
/// ranges use a running mean, later bars use Wilder smoothing.
pub fn calculate_atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let n = bars.len();
    let period = period.max(1);
    let mut atr = vec![0.0; n];
    let mut tr_sum = 0.0f64;

    for i in 1..n {
        let bar = &bars[i];
        let prev_close = bars[i - 1].close;
        let tr = (bar.high - bar.low)
            .max((bar.high - prev_close).abs())
            .max((bar.low - prev_close).abs());

        if i <= period {
            tr_sum += tr;
            atr[i] = tr_sum / i as f64;
        } else {
            atr[i] = (atr[i - 1] * (period as f64 - 1.0) + tr) / period as f64;
        }
    }

    atr
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum IndicatorKey {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    MacdLine(usize, usize),
    MacdSignal(usize, usize, usize),
}

/// Memoized indicator series for a single bar series.
///
/// A cache is built at the start of one backtest and dropped with it. Every series is
/// computed once per distinct indicator and period, then served by index.
pub struct IndicatorCache<'a> {
    bars: &'a [Bar],
    closes: Vec<f64>,
    series: HashMap<IndicatorKey, Vec<f64>>,
}

impl<'a> IndicatorCache<'a> {
    pub fn new(bars: &'a [Bar]) -> Self {
        Self {
            bars,
            closes: bars.iter().map(|b| b.close).collect(),
            series: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    /// Number of distinct series computed so far.
    pub fn cached_series(&self) -> usize {
        self.series.len()
    }

    pub fn sma(&mut self, period: usize, idx: usize) -> f64 {
        Self::value_at(self.ensure(IndicatorKey::Sma(period)), idx)
    }

    pub fn ema(&mut self, period: usize, idx: usize) -> f64 {
        Self::value_at(self.ensure(IndicatorKey::Ema(period)), idx)
    }

    pub fn rsi(&mut self, period: usize, idx: usize) -> f64 {
        Self::value_at(self.ensure(IndicatorKey::Rsi(period)), idx)
    }

    pub fn atr(&mut self, period: usize, idx: usize) -> f64 {
        Self::value_at(self.ensure(IndicatorKey::Atr(period)), idx)
    }

    pub fn macd(&mut self, fast: usize, slow: usize, signal: usize, idx: usize) -> MacdPoint {
        let macd_line = Self::value_at(self.ensure(IndicatorKey::MacdLine(fast, slow)), idx);
        let signal_line =
            Self::value_at(self.ensure(IndicatorKey::MacdSignal(fast, slow, signal)), idx);
        MacdPoint {
            macd_line,
            signal_line,
            histogram: macd_line - signal_line,
        }
    }

    // Indices past the end of the series read 0.0 so callers never index out of range.
    fn value_at(series: &[f64], idx: usize) -> f64 {
        series.get(idx).copied().unwrap_or(0.0)
    }

    fn ensure(&mut self, key: IndicatorKey) -> &[f64] {
        if !self.series.contains_key(&key) {
            let values = self.compute(key);
            self.series.insert(key, values);
        }
        &self.series[&key]
    }

    fn compute(&mut self, key: IndicatorKey) -> Vec<f64> {
        match key {
            IndicatorKey::Sma(period) => calculate_sma(&self.closes, period),
            IndicatorKey::Ema(period) => calculate_ema(&self.closes, period),
            IndicatorKey::Rsi(period) => calculate_rsi(&self.closes, period),
            IndicatorKey::Atr(period) => calculate_atr(self.bars, period),
            IndicatorKey::MacdLine(fast, slow) => {
                let fast_ema = self.ensure(IndicatorKey::Ema(fast)).to_vec();
                let slow_ema = self.ensure(IndicatorKey::Ema(slow));
                fast_ema
                    .iter()
                    .zip(slow_ema.iter())
                    .map(|(f, s)| f - s)
                    .collect()
            }
            IndicatorKey::MacdSignal(fast, slow, signal) => {
                let line = self.ensure(IndicatorKey::MacdLine(fast, slow)).to_vec();
                calculate_ema(&line, signal)
            }
        }
    }
}
