use crate::config::BacktestConfig;
use crate::error::{EngineError, EngineResult};
use crate::indicators::IndicatorCache;
use crate::inputs::StrategyScript;
use crate::market_data::validate_bars;
use crate::models::*;
use crate::param_utils::{merge_with_defaults, resolve_param, STOP_LOSS_KEYS};
use crate::performance::PerformanceCalculator;
use crate::signals::generate_signals;
use crate::strategy::StrategyFamily;
use chrono::{TimeZone, Utc};
use log::debug;
use std::collections::HashMap;
use uuid::Uuid;

const EQUITY_TOLERANCE: f64 = 0.01;

/// Execution rules that come from the script rather than the run configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationRules {
    /// Short entries are only taken when the script declares them.
    pub allow_short: bool,
    /// Percentage stop measured from the entry price; disabled when <= 0.
    pub stop_loss_pct: f64,
}

impl Default for SimulationRules {
    fn default() -> Self {
        Self {
            allow_short: false,
            stop_loss_pct: 0.0,
        }
    }
}

/// The single open position. Entry price already includes commission.
#[derive(Debug, Clone, Copy)]
struct Position {
    direction: Direction,
    entry_index: usize,
    entry_price: f64,
    size: f64,
}

impl Position {
    fn stop_breached(&self, bar: &Bar, stop_loss_pct: f64) -> bool {
        if stop_loss_pct <= 0.0 {
            return false;
        }
        match self.direction {
            Direction::Long => bar.low < self.entry_price * (1.0 - stop_loss_pct / 100.0),
            Direction::Short => bar.high > self.entry_price * (1.0 + stop_loss_pct / 100.0),
        }
    }

    fn exit_signal(&self, signals: &SignalSet, idx: usize) -> bool {
        match self.direction {
            Direction::Long => signals.long_exit[idx],
            Direction::Short => signals.short_exit[idx],
        }
    }

    fn close(&self, id: u32, bars: &[Bar], exit_index: usize, commission_rate: f64) -> Trade {
        let exit_bar = &bars[exit_index];
        let exit_price = exit_bar.close;
        let move_pct = match self.direction {
            Direction::Long => (exit_price - self.entry_price) / self.entry_price * 100.0,
            Direction::Short => (self.entry_price - exit_price) / self.entry_price * 100.0,
        };
        let pnl_pct = move_pct - commission_rate * 200.0;
        let pnl = self.size * pnl_pct / 100.0;

        Trade {
            id,
            entry_time: bars[self.entry_index].time,
            exit_time: exit_bar.time,
            entry_price: self.entry_price,
            exit_price,
            direction: self.direction,
            pnl: round_to(pnl, 2),
            pnl_pct: round_to(pnl_pct, 2),
            bars: exit_index - self.entry_index,
        }
    }
}

/// Ledger and curve produced by the bar loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub final_equity: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
}

/// Runs scripts against bar series. Holds no per-run state, so one engine can be shared
/// across threads.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    family_override: Option<StrategyFamily>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips keyword classification and always uses `family`.
    pub fn with_family(family: StrategyFamily) -> Self {
        Self {
            family_override: Some(family),
        }
    }

    pub fn family_override(&self) -> Option<StrategyFamily> {
        self.family_override
    }

    /// Runs `source` over `bars`, overlaying `overrides` on the script's input defaults.
    pub fn backtest(
        &self,
        bars: &[Bar],
        source: &str,
        overrides: &HashMap<String, f64>,
        config: &BacktestConfig,
    ) -> EngineResult<BacktestResult> {
        let script = StrategyScript::parse(source);
        let params = merge_with_defaults(&script.inputs, overrides);
        self.backtest_script(bars, source, &script, &params, config)
    }

    /// Same as [`Engine::backtest`] for callers that already parsed the script and resolved
    /// the full parameter set, as the sweep does for every combination.
    pub fn backtest_script(
        &self,
        bars: &[Bar],
        source: &str,
        script: &StrategyScript,
        params: &ParameterSet,
        config: &BacktestConfig,
    ) -> EngineResult<BacktestResult> {
        validate_bars(bars)?;
        let (first_bar, last_bar) = match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(EngineError::invalid("bar series is empty")),
        };
        let config = config.sanitized();

        let family = self
            .family_override
            .unwrap_or_else(|| StrategyFamily::detect(script, params));
        let signals = {
            let mut cache = IndicatorCache::new(bars);
            generate_signals(&mut cache, family, params)
        };

        let rules = SimulationRules {
            allow_short: script.has_short_entry,
            stop_loss_pct: resolve_param(params, STOP_LOSS_KEYS, 0.0),
        };
        let outcome = Self::simulate(bars, &signals, &rules, &config)?;

        let performance = PerformanceCalculator::calculate_performance(
            &outcome.trades,
            config.initial_capital,
            outcome.final_equity,
            first_bar.time,
            last_bar.time,
            &outcome.equity_curve,
        );

        let strategy_name = if config.strategy_name.trim().is_empty() {
            script.name.clone()
        } else {
            config.strategy_name.clone()
        };
        let start_date = if config.start_date.is_empty() {
            format_bar_date(first_bar.time)
        } else {
            config.start_date.clone()
        };
        let end_date = if config.end_date.is_empty() {
            format_bar_date(last_bar.time)
        } else {
            config.end_date.clone()
        };

        debug!(
            "{} on {} {}: {} family, {} trades, final equity {:.2}",
            strategy_name,
            config.symbol,
            config.timeframe,
            family.label(),
            outcome.trades.len(),
            outcome.final_equity
        );

        let result = BacktestResult {
            id: result_id(source, bars, params, &config),
            strategy_name,
            symbol: config.symbol.clone(),
            timeframe: config.timeframe.clone(),
            start_date,
            end_date,
            initial_capital: config.initial_capital,
            final_equity: round_to(outcome.final_equity, 2),
            total_return: performance.total_return,
            annualized_return: performance.annualized_return,
            sharpe_ratio: performance.sharpe_ratio,
            sortino_ratio: performance.sortino_ratio,
            max_drawdown: round_to(outcome.max_drawdown, 2),
            max_drawdown_duration: outcome.max_drawdown_duration,
            win_rate: performance.win_rate,
            total_trades: outcome.trades.len(),
            winning_trades: performance.winning_trades,
            losing_trades: performance.losing_trades,
            profit_factor: performance.profit_factor,
            avg_win: performance.avg_win,
            avg_loss: performance.avg_loss,
            avg_trade_duration: performance.avg_trade_duration,
            best_trade: performance.best_trade,
            worst_trade: performance.worst_trade,
            expectancy: performance.expectancy,
            equity_curve: outcome.equity_curve,
            trades: outcome.trades,
            monthly_returns: performance.monthly_returns,
            params: params.clone(),
        };

        Self::validate_result(&result, bars.len())?;
        Ok(result)
    }

    /// The bar loop. Per bar: exit check, then entry when flat, then equity bookkeeping.
    ///
    /// An open position is closed on the last bar, and no entry is taken there.
    pub fn simulate(
        bars: &[Bar],
        signals: &SignalSet,
        rules: &SimulationRules,
        config: &BacktestConfig,
    ) -> EngineResult<SimulationOutcome> {
        if signals.len() != bars.len()
            || signals.long_exit.len() != bars.len()
            || signals.short_entry.len() != bars.len()
            || signals.short_exit.len() != bars.len()
        {
            return Err(EngineError::invariant(format!(
                "signal vectors do not match {} bars",
                bars.len()
            )));
        }

        let commission_rate = config.commission_pct.max(0.0) / 100.0;
        let mut equity = config.initial_capital;
        let mut peak = equity;
        let mut peak_index = 0usize;
        let mut max_drawdown = 0.0f64;
        let mut max_drawdown_duration = 0usize;

        let mut position: Option<Position> = None;
        let mut trades: Vec<Trade> = Vec::new();
        let mut equity_curve = Vec::with_capacity(bars.len());
        let last_index = bars.len().saturating_sub(1);

        for (i, bar) in bars.iter().enumerate() {
            if let Some(open) = position {
                let should_exit = open.exit_signal(signals, i)
                    || open.stop_breached(bar, rules.stop_loss_pct)
                    || i == last_index;
                if should_exit {
                    let trade = open.close(trades.len() as u32 + 1, bars, i, commission_rate);
                    equity += trade.pnl;
                    trades.push(trade);
                    position = None;
                }
            }

            if position.is_none() && i < last_index {
                if signals.long_entry[i] {
                    position = Some(Position {
                        direction: Direction::Long,
                        entry_index: i,
                        entry_price: bar.close * (1.0 + commission_rate),
                        size: equity,
                    });
                } else if rules.allow_short && signals.short_entry[i] {
                    position = Some(Position {
                        direction: Direction::Short,
                        entry_index: i,
                        entry_price: bar.close * (1.0 - commission_rate),
                        size: equity,
                    });
                }
            }

            if equity > peak {
                peak = equity;
                peak_index = i;
            }
            let drawdown = if peak > 0.0 {
                ((peak - equity) / peak * 100.0).clamp(0.0, 100.0)
            } else {
                0.0
            };
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
                max_drawdown_duration = i - peak_index;
            }

            equity_curve.push(EquityPoint {
                time: bar.time,
                equity: round_to(equity, 2),
                drawdown: round_to(drawdown, 2),
            });
        }

        Ok(SimulationOutcome {
            trades,
            equity_curve,
            final_equity: equity,
            max_drawdown,
            max_drawdown_duration,
        })
    }

    fn validate_result(result: &BacktestResult, bar_count: usize) -> EngineResult<()> {
        if result.equity_curve.len() != bar_count {
            return Err(EngineError::invariant(format!(
                "equity curve has {} points for {} bars",
                result.equity_curve.len(),
                bar_count
            )));
        }

        for (index, trade) in result.trades.iter().enumerate() {
            if trade.id as usize != index + 1 {
                return Err(EngineError::invariant(format!(
                    "trade at position {} has id {}",
                    index, trade.id
                )));
            }
            if trade.entry_time >= trade.exit_time {
                return Err(EngineError::invariant(format!(
                    "trade {} exits at {} before entering at {}",
                    trade.id, trade.exit_time, trade.entry_time
                )));
            }
            if !trade.pnl.is_finite() || !trade.pnl_pct.is_finite() {
                return Err(EngineError::invariant(format!(
                    "trade {} has non-finite pnl",
                    trade.id
                )));
            }
        }
        for pair in result.trades.windows(2) {
            if pair[1].entry_time < pair[0].exit_time {
                return Err(EngineError::invariant(format!(
                    "trade {} overlaps trade {}",
                    pair[1].id, pair[0].id
                )));
            }
        }

        let realized: f64 = result.trades.iter().map(|t| t.pnl).sum();
        let expected = result.initial_capital + realized;
        if (result.final_equity - expected).abs() > EQUITY_TOLERANCE {
            return Err(EngineError::invariant(format!(
                "final equity {:.2} does not match capital plus realized pnl {:.2}",
                result.final_equity, expected
            )));
        }

        if result.winning_trades + result.losing_trades != result.total_trades {
            return Err(EngineError::invariant(
                "winning and losing trades do not partition the ledger",
            ));
        }

        if let Some(point) = result
            .equity_curve
            .iter()
            .find(|p| !(0.0..=100.0).contains(&p.drawdown) || !p.equity.is_finite())
        {
            return Err(EngineError::invariant(format!(
                "equity point at {} is out of range (equity {}, drawdown {})",
                point.time, point.equity, point.drawdown
            )));
        }

        Ok(())
    }
}

/// Convenience entry point: one run with a fresh default engine.
pub fn run(
    bars: &[Bar],
    source: &str,
    overrides: &HashMap<String, f64>,
    config: &BacktestConfig,
) -> EngineResult<BacktestResult> {
    Engine::new().backtest(bars, source, overrides, config)
}

/// Stable identifier derived from everything that determines the result, so repeated runs
/// with identical inputs produce identical ids.
fn result_id(source: &str, bars: &[Bar], params: &ParameterSet, config: &BacktestConfig) -> String {
    let mut fingerprint = String::with_capacity(source.len() + 128);
    fingerprint.push_str(source);
    fingerprint.push('\u{1f}');
    fingerprint.push_str(&config.symbol);
    fingerprint.push('\u{1f}');
    fingerprint.push_str(&config.timeframe);
    for (key, value) in params {
        fingerprint.push_str(&format!("\u{1f}{}={:016x}", key, value.to_bits()));
    }
    fingerprint.push_str(&format!(
        "\u{1f}{:016x}\u{1f}{:016x}\u{1f}{}",
        config.initial_capital.to_bits(),
        config.commission_pct.to_bits(),
        bars.len()
    ));
    if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
        fingerprint.push_str(&format!("\u{1f}{}\u{1f}{}", first.time, last.time));
    }
    Uuid::new_v5(&Uuid::NAMESPACE_OID, fingerprint.as_bytes()).to_string()
}

fn format_bar_date(time: i64) -> String {
    Utc.timestamp_millis_opt(time)
        .single()
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400_000;
    const JAN_1_2024: i64 = 1_704_067_200_000;

    fn generate_bars(prices: &[f64]) -> Vec<Bar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| Bar {
                time: JAN_1_2024 + i as i64 * DAY,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: 10_000.0,
            })
            .collect()
    }

    fn test_config(commission_pct: f64) -> BacktestConfig {
        BacktestConfig {
            strategy_name: "Test".to_string(),
            symbol: "TEST".to_string(),
            timeframe: "1d".to_string(),
            initial_capital: 10_000.0,
            commission_pct,
            ..BacktestConfig::default()
        }
    }

    fn signals_with(len: usize, long_entries: &[usize], long_exits: &[usize]) -> SignalSet {
        let mut signals = SignalSet::flat(len);
        for &i in long_entries {
            signals.long_entry[i] = true;
        }
        for &i in long_exits {
            signals.long_exit[i] = true;
        }
        signals
    }

    #[test]
    fn test_long_round_trip_pnl() {
        let bars = generate_bars(&[100.0, 100.0, 110.0, 110.0]);
        let signals = signals_with(4, &[0], &[2]);
        let outcome =
            Engine::simulate(&bars, &signals, &SimulationRules::default(), &test_config(0.1))
                .unwrap();

        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert_eq!(trade.id, 1);
        assert_eq!(trade.bars, 2);
        assert!((trade.entry_price - 100.1).abs() < 1e-9);
        assert_eq!(trade.exit_price, 110.0);
        let expected_pct = (110.0 - 100.1) / 100.1 * 100.0 - 0.2;
        assert!((trade.pnl_pct - round_to(expected_pct, 2)).abs() < 1e-9);
        assert!((trade.pnl - round_to(10_000.0 * expected_pct / 100.0, 2)).abs() < 1e-9);
        assert!((outcome.final_equity - (10_000.0 + trade.pnl)).abs() < 1e-9);
        assert_eq!(outcome.equity_curve.len(), 4);
    }

    #[test]
    fn test_stop_loss_exits_before_signal() {
        let mut bars = generate_bars(&[100.0, 100.0, 100.0, 100.0, 100.0]);
        let stop_price = 100.0 * 0.98;
        bars[1].low = 99.0;
        bars[2].low = stop_price - 0.5;
        bars[2].close = stop_price;

        let signals = signals_with(5, &[0], &[]);
        let rules = SimulationRules {
            allow_short: false,
            stop_loss_pct: 2.0,
        };
        let outcome = Engine::simulate(&bars, &signals, &rules, &test_config(0.0)).unwrap();

        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert_eq!(trade.exit_time, bars[2].time);
        assert_eq!(trade.exit_price, stop_price);
        assert!((trade.pnl_pct + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_loss_includes_round_trip_commission() {
        let commission = 0.1;
        let entry_price = 100.0 * (1.0 + commission / 100.0);
        let stop_price = entry_price * 0.98;
        let mut bars = generate_bars(&[100.0, 100.0, 100.0, 100.0]);
        bars[1].low = stop_price - 0.01;
        bars[1].close = stop_price;

        let signals = signals_with(4, &[0], &[]);
        let rules = SimulationRules {
            allow_short: false,
            stop_loss_pct: 2.0,
        };
        let outcome = Engine::simulate(&bars, &signals, &rules, &test_config(commission)).unwrap();

        let trade = &outcome.trades[0];
        assert_eq!(trade.exit_time, bars[1].time);
        assert!((trade.pnl_pct - (-2.0 - 2.0 * commission)).abs() < 1e-9);
    }

    #[test]
    fn test_short_entries_require_permission() {
        let bars = generate_bars(&[100.0, 100.0, 90.0, 90.0]);
        let mut signals = SignalSet::flat(4);
        signals.short_entry[0] = true;
        signals.short_exit[2] = true;

        let outcome =
            Engine::simulate(&bars, &signals, &SimulationRules::default(), &test_config(0.0))
                .unwrap();
        assert!(outcome.trades.is_empty());

        let rules = SimulationRules {
            allow_short: true,
            stop_loss_pct: 0.0,
        };
        let outcome = Engine::simulate(&bars, &signals, &rules, &test_config(0.0)).unwrap();
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].direction, Direction::Short);
        assert!((outcome.trades[0].pnl_pct - 10.0).abs() < 1e-9);
        assert!((outcome.trades[0].pnl - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_preferred_over_short_on_same_bar() {
        let bars = generate_bars(&[100.0, 101.0, 102.0]);
        let mut signals = SignalSet::flat(3);
        signals.long_entry[0] = true;
        signals.short_entry[0] = true;
        let rules = SimulationRules {
            allow_short: true,
            stop_loss_pct: 0.0,
        };
        let outcome = Engine::simulate(&bars, &signals, &rules, &test_config(0.0)).unwrap();
        assert_eq!(outcome.trades[0].direction, Direction::Long);
    }

    #[test]
    fn test_exit_then_reentry_on_same_bar() {
        let bars = generate_bars(&[100.0, 105.0, 110.0, 120.0]);
        let signals = signals_with(4, &[0, 1], &[1]);
        let outcome =
            Engine::simulate(&bars, &signals, &SimulationRules::default(), &test_config(0.0))
                .unwrap();

        assert_eq!(outcome.trades.len(), 2);
        assert_eq!(outcome.trades[0].exit_time, bars[1].time);
        assert_eq!(outcome.trades[1].entry_time, bars[1].time);
        assert_eq!(outcome.trades[1].exit_time, bars[3].time);
        assert_eq!(outcome.trades[1].id, 2);
    }

    #[test]
    fn test_open_position_closed_on_last_bar() {
        let bars = generate_bars(&[100.0, 101.0, 102.0, 103.0]);
        let signals = signals_with(4, &[1], &[]);
        let outcome =
            Engine::simulate(&bars, &signals, &SimulationRules::default(), &test_config(0.0))
                .unwrap();

        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert_eq!(trade.exit_time, bars[3].time);
        assert_eq!(trade.exit_price, 103.0);
        assert_eq!(trade.bars, 2);
        // The forced close is reflected in the last equity point.
        let last = outcome.equity_curve.last().unwrap();
        assert!((last.equity - round_to(outcome.final_equity, 2)).abs() < 1e-9);
    }

    #[test]
    fn test_no_entry_on_last_bar() {
        let bars = generate_bars(&[100.0, 101.0, 102.0]);
        let signals = signals_with(3, &[2], &[]);
        let outcome =
            Engine::simulate(&bars, &signals, &SimulationRules::default(), &test_config(0.0))
                .unwrap();
        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.final_equity, 10_000.0);
    }

    #[test]
    fn test_drawdown_tracks_depth_and_duration() {
        // Win, then two losses, then a recovery trade.
        let bars = generate_bars(&[100.0, 110.0, 110.0, 99.0, 99.0, 94.05, 94.05, 120.0]);
        let signals = signals_with(8, &[0, 2, 4, 6], &[1, 3, 5]);
        let outcome =
            Engine::simulate(&bars, &signals, &SimulationRules::default(), &test_config(0.0))
                .unwrap();

        assert_eq!(outcome.trades.len(), 4);
        // Peak 11_000 at bar 1; equity 9_405 at bar 5.
        let expected = (11_000.0 - 9_405.0) / 11_000.0 * 100.0;
        assert!((outcome.max_drawdown - expected).abs() < 1e-9);
        assert_eq!(outcome.max_drawdown_duration, 4);
        let curve_max = outcome
            .equity_curve
            .iter()
            .map(|p| p.drawdown)
            .fold(0.0, f64::max);
        assert!((round_to(outcome.max_drawdown, 2) - curve_max).abs() < 1e-9);
        assert_eq!(outcome.equity_curve.last().unwrap().drawdown, 0.0);
    }

    #[test]
    fn test_mismatched_signals_are_an_invariant_error() {
        let bars = generate_bars(&[100.0, 101.0]);
        let err = Engine::simulate(
            &bars,
            &SignalSet::flat(3),
            &SimulationRules::default(),
            &test_config(0.0),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Invariant(_)));
    }

    #[test]
    fn test_backtest_rejects_bad_bars() {
        let engine = Engine::new();
        let err = engine
            .backtest(&[], "plot(close)", &HashMap::new(), &test_config(0.1))
            .unwrap_err();
        assert!(err.is_invalid_input());

        let mut bars = generate_bars(&[100.0; 20]);
        bars[5].time = bars[4].time;
        let err = engine
            .backtest(&bars, "plot(close)", &HashMap::new(), &test_config(0.1))
            .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_backtest_fills_labels_and_params() {
        let bars = generate_bars(&[100.0; 60]);
        let source = "strategy(\"Flat Test\")\nlen = input.int(10, title=\"Length\")";
        let config = BacktestConfig {
            strategy_name: String::new(),
            ..test_config(0.1)
        };
        let result = Engine::new()
            .backtest(&bars, source, &HashMap::new(), &config)
            .unwrap();

        assert_eq!(result.strategy_name, "Flat Test");
        assert_eq!(result.start_date, "2024-01-01");
        assert_eq!(result.end_date, "2024-02-29");
        assert_eq!(result.params.get("len"), Some(&10.0));
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.final_equity, 10_000.0);
        assert_eq!(result.equity_curve.len(), 60);
    }

    #[test]
    fn test_result_id_is_stable_and_input_sensitive() {
        let bars = generate_bars(&[100.0; 30]);
        let config = test_config(0.1);
        let mut params = ParameterSet::new();
        params.insert("fast".to_string(), 12.0);

        let first = result_id("src", &bars, &params, &config);
        assert_eq!(first, result_id("src", &bars, &params, &config));

        params.insert("fast".to_string(), 13.0);
        assert_ne!(first, result_id("src", &bars, &params, &config));
    }

    #[test]
    fn test_oversized_periods_still_produce_a_result() {
        let closes: Vec<f64> = (0..120)
            .map(|i| 100.0 + 10.0 * (i as f64 / 7.0).sin())
            .collect();
        let bars = generate_bars(&closes);
        let mut overrides = HashMap::new();
        overrides.insert("rsiLength".to_string(), 1e20);

        let result = Engine::new()
            .backtest(&bars, "r = ta.rsi(close, rsiLength)", &overrides, &test_config(0.1))
            .unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.equity_curve.len(), bars.len());

        let source = "rsiLength = input.int(99999999999999999999)\nr = ta.rsi(close, rsiLength)";
        let result = Engine::new()
            .backtest(&bars, source, &HashMap::new(), &test_config(0.1))
            .unwrap();
        assert!(result.trades.is_empty());

        let mut overrides = HashMap::new();
        overrides.insert("slow".to_string(), 1e20);
        let result = Engine::with_family(StrategyFamily::Macd)
            .backtest(&bars, "plot(close)", &overrides, &test_config(0.1))
            .unwrap();
        assert!(result.trades.is_empty());
    }

    #[test]
    fn test_family_override_is_used() {
        let closes: Vec<f64> = (0..200)
            .map(|i| 100.0 + 10.0 * (i as f64 / 9.0).sin())
            .collect();
        let bars = generate_bars(&closes);
        let source = "plot(close) // nothing recognisable";

        let detected = Engine::new()
            .backtest(&bars, source, &HashMap::new(), &test_config(0.0))
            .unwrap();
        let forced = Engine::with_family(StrategyFamily::Macd)
            .backtest(&bars, source, &HashMap::new(), &test_config(0.0))
            .unwrap();

        assert_eq!(Engine::with_family(StrategyFamily::Macd).family_override(), Some(StrategyFamily::Macd));
        assert!(forced.total_trades > 0);
        assert_ne!(detected.trades, forced.trades);
    }
}
