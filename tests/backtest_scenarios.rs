use pinelab::config::{BacktestConfig, SweepObjective, SweepSettings};
use pinelab::engine::Engine;
use pinelab::models::{Bar, Direction, ParameterKind};
use pinelab::optimizer::Optimizer;
use pinelab::request::BacktestRequest;
use std::collections::HashMap;

const DAY: i64 = 86_400_000;
const JAN_1_2024: i64 = 1_704_067_200_000;

const MACD_LONG_SHORT: &str = r#"//@version=5
strategy("MACD Cross")
fast = input.int(12, title="Fast")
slow = input.int(26, title="Slow")
signal = input.int(9, title="Signal")
[macdLine, signalLine, hist] = ta.macd(close, fast, slow, signal)
if ta.crossover(hist, 0)
    strategy.entry("Long", strategy.long)
if ta.crossunder(hist, 0)
    strategy.entry("Short", strategy.short)
"#;

const MACD_LONG_ONLY: &str = r#"strategy("MACD Long")
fast = input.int(12)
slow = input.int(26)
signal = input.int(9)
stopLossPct = input.float(2.0, title="Stop %")
[m, s, h] = ta.macd(close, fast, slow, signal)
if ta.crossover(h, 0)
    strategy.entry("Long", strategy.long)
"#;

const RSI_SCRIPT: &str = r#"strategy("RSI Reversal")
rsiLength = input.int(14, title="RSI Length", minval=5, maxval=50)
r = ta.rsi(close, rsiLength)
strategy.entry("L", strategy.long)
"#;

const EMA_SCRIPT: &str = r#"strategy("EMA Cross")
fastLength = input.int(9)
slowLength = input.int(21)
f = ta.ema(close, fastLength)
s = ta.ema(close, slowLength)
strategy.entry("L", strategy.long)
strategy.entry("S", strategy.short)
"#;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn generate_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            time: JAN_1_2024 + i as i64 * DAY,
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1_000.0,
        })
        .collect()
}

fn up_then_down(len: usize) -> Vec<f64> {
    let top = len / 2;
    (0..len)
        .map(|i| {
            if i <= top {
                100.0 + i as f64
            } else {
                100.0 + top as f64 - (i - top) as f64
            }
        })
        .collect()
}

/// Down for 100 bars, up for 100, then down again.
fn valley_then_peak() -> Vec<f64> {
    (0..300)
        .map(|i| match i {
            0..=99 => 250.0 - i as f64,
            100..=199 => 151.0 + (i - 100) as f64,
            _ => 250.0 - (i - 200) as f64,
        })
        .collect()
}

fn oscillating(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let t = i as f64;
            100.0 + 12.0 * (t / 11.0).sin() + 5.0 * (t / 3.7).cos() + t * 0.05
        })
        .collect()
}

fn config() -> BacktestConfig {
    BacktestConfig {
        symbol: "BTCUSDT".to_string(),
        timeframe: "1d".to_string(),
        ..BacktestConfig::default()
    }
}

#[test]
fn runs_are_deterministic() {
    init_logging();
    let bars = generate_bars(&oscillating(400));
    let engine = Engine::new();
    for source in [MACD_LONG_SHORT, RSI_SCRIPT, EMA_SCRIPT, "plot(close) // no keywords"] {
        let first = engine
            .backtest(&bars, source, &HashMap::new(), &config())
            .unwrap();
        let second = engine
            .backtest(&bars, source, &HashMap::new(), &config())
            .unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn accounting_invariants_hold() {
    init_logging();
    let bars = generate_bars(&oscillating(500));
    let engine = Engine::new();

    for source in [MACD_LONG_SHORT, MACD_LONG_ONLY, RSI_SCRIPT, EMA_SCRIPT] {
        let result = engine
            .backtest(&bars, source, &HashMap::new(), &config())
            .unwrap();

        let realized: f64 = result.trades.iter().map(|t| t.pnl).sum();
        assert!((result.final_equity - (result.initial_capital + realized)).abs() <= 0.01);

        assert_eq!(result.winning_trades + result.losing_trades, result.total_trades);
        let expected_win_rate = if result.total_trades > 0 {
            result.winning_trades as f64 / result.total_trades as f64 * 100.0
        } else {
            0.0
        };
        assert!((result.win_rate - expected_win_rate).abs() < 0.01);

        let curve_max = result
            .equity_curve
            .iter()
            .map(|p| p.drawdown)
            .fold(0.0, f64::max);
        assert_eq!(result.max_drawdown, curve_max);
        assert!(result
            .equity_curve
            .iter()
            .all(|p| (0.0..=100.0).contains(&p.drawdown)));
        assert_eq!(result.equity_curve.len(), bars.len());

        for (i, trade) in result.trades.iter().enumerate() {
            assert_eq!(trade.id as usize, i + 1);
            assert!(trade.entry_time < trade.exit_time);
        }
        for pair in result.trades.windows(2) {
            assert!(pair[1].entry_time >= pair[0].exit_time);
        }

        for value in [
            result.sharpe_ratio,
            result.sortino_ratio,
            result.annualized_return,
            result.profit_factor,
            result.expectancy,
        ] {
            assert!(value.is_finite());
        }
    }
}

#[test]
fn long_only_scripts_never_short() {
    let bars = generate_bars(&oscillating(500));
    let result = Engine::new()
        .backtest(&bars, MACD_LONG_ONLY, &HashMap::new(), &config())
        .unwrap();
    assert!(result.total_trades > 0);
    assert!(result.trades.iter().all(|t| t.direction == Direction::Long));
}

#[test]
fn constant_prices_produce_no_trades() {
    let bars: Vec<Bar> = (0..100)
        .map(|i| Bar {
            time: JAN_1_2024 + i * DAY,
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
            volume: 1.0,
        })
        .collect();

    for source in [MACD_LONG_SHORT, RSI_SCRIPT, EMA_SCRIPT, "plot(close) // no keywords"] {
        let result = Engine::new()
            .backtest(&bars, source, &HashMap::new(), &config())
            .unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.final_equity, result.initial_capital);
        assert_eq!(result.max_drawdown, 0.0);
        assert_eq!(result.sharpe_ratio, 0.0);
        assert_eq!(result.profit_factor, 0.0);
        assert!(result.equity_curve.iter().all(|p| p.equity == 10_000.0));
    }
}

#[test]
fn series_shorter_than_warm_up_stay_flat() {
    let bars = generate_bars(&up_then_down(40));
    let result = Engine::new()
        .backtest(&bars, MACD_LONG_SHORT, &HashMap::new(), &config())
        .unwrap();
    assert!(result.trades.is_empty());
    assert_eq!(result.equity_curve.len(), 40);
}

#[test]
fn macd_trend_reversal_is_traded() {
    init_logging();
    let bars = generate_bars(&up_then_down(300));
    let mut overrides = HashMap::new();
    overrides.insert("fast".to_string(), 12.0);
    overrides.insert("slow".to_string(), 26.0);
    overrides.insert("signal".to_string(), 9.0);

    let result = Engine::new()
        .backtest(&bars, MACD_LONG_SHORT, &overrides, &config())
        .unwrap();

    assert!(!result.trades.is_empty());
    let trade = &result.trades[0];
    assert_eq!(trade.direction, Direction::Short);
    assert!(trade.entry_time > bars[150].time);
    assert!(trade.pnl > 0.0);
}

#[test]
fn macd_enters_long_after_the_upturn_and_exits_after_the_top() {
    let bars = generate_bars(&valley_then_peak());
    let result = Engine::new()
        .backtest(&bars, MACD_LONG_SHORT, &HashMap::new(), &config())
        .unwrap();

    assert!(result.trades.len() >= 2);
    let long = &result.trades[0];
    assert_eq!(long.direction, Direction::Long);
    assert!(long.entry_time >= bars[100].time);
    assert!(long.entry_time < bars[120].time);
    assert!(long.exit_time >= bars[200].time);
    assert!(long.pnl > 0.0);

    // The exit bar's crossing opens the short immediately.
    let short = &result.trades[1];
    assert_eq!(short.direction, Direction::Short);
    assert_eq!(short.entry_time, long.exit_time);
}

#[test]
fn open_position_is_closed_at_the_last_bar() {
    let closes: Vec<f64> = valley_then_peak().into_iter().take(200).collect();
    let bars = generate_bars(&closes);
    let mut overrides = HashMap::new();
    overrides.insert("stopLossPct".to_string(), 0.0);

    let result = Engine::new()
        .backtest(&bars, MACD_LONG_ONLY, &overrides, &config())
        .unwrap();

    let last_bar = bars.last().unwrap();
    let last_trade = result.trades.last().unwrap();
    assert_eq!(last_trade.direction, Direction::Long);
    assert_eq!(last_trade.exit_time, last_bar.time);
    assert_eq!(last_trade.exit_price, last_bar.close);
}

#[test]
fn stop_loss_exits_on_the_breaching_bar() {
    let mut bars = generate_bars(&valley_then_peak());
    // A long lower wick far below any plausible stop level while the trend is still up.
    bars[130].low = 90.0;

    let result = Engine::new()
        .backtest(&bars, MACD_LONG_ONLY, &HashMap::new(), &config())
        .unwrap();

    assert_eq!(result.params.get("stopLossPct"), Some(&2.0));
    let stopped = &result.trades[0];
    assert!(stopped.entry_time < bars[130].time);
    assert_eq!(stopped.exit_time, bars[130].time);
    assert_eq!(stopped.exit_price, bars[130].close);
}

#[test]
fn extracted_inputs_round_trip() {
    let inputs = pinelab::extract(
        r#"rsiLength = input.int(14, title="RSI Length", minval=5, maxval=50)"#,
    );
    assert_eq!(inputs.len(), 1);
    let input = &inputs[0];
    assert_eq!(input.name, "rsiLength");
    assert_eq!(input.kind, ParameterKind::Int);
    assert_eq!(input.default_value, 14.0);
    assert_eq!(input.min_value, 5.0);
    assert_eq!(input.max_value, 50.0);
    assert_eq!(input.title, "RSI Length");

    assert_eq!(pinelab::extract(RSI_SCRIPT), pinelab::extract(RSI_SCRIPT));
}

#[test]
fn result_json_uses_camel_case_fields() {
    let bars = generate_bars(&oscillating(200));
    let result = Engine::new()
        .backtest(&bars, MACD_LONG_SHORT, &HashMap::new(), &config())
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();

    for key in [
        "strategyName",
        "finalEquity",
        "maxDrawdownDuration",
        "equityCurve",
        "monthlyReturns",
        "avgTradeDuration",
    ] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
    if let Some(first) = json["monthlyReturns"].as_array().and_then(|m| m.first()) {
        assert!(first.get("return").is_some());
    }
}

#[test]
fn request_boundary_validates_and_runs() {
    let bars = generate_bars(&oscillating(120));
    let request = BacktestRequest {
        script: EMA_SCRIPT.to_string(),
        bars: bars[..5].to_vec(),
        params: HashMap::new(),
        config: config(),
        family: None,
    };
    assert!(request.execute().unwrap_err().is_invalid_input());

    let request = BacktestRequest {
        bars,
        ..request
    };
    let result = request.execute().unwrap();
    assert_eq!(result.strategy_name, "EMA Cross");
}

#[test]
fn sweep_ranks_by_objective() {
    init_logging();
    let bars = generate_bars(&oscillating(400));
    let settings = SweepSettings {
        max_combinations: 12,
        objective: SweepObjective::TotalReturn,
        top_results: 5,
        threads: 2,
    };
    let optimizer = Optimizer::new(Engine::new(), settings).without_progress_bar();
    let report = optimizer
        .sweep(&bars, EMA_SCRIPT, &HashMap::new(), &config())
        .unwrap();

    assert_eq!(report.evaluated + report.failed, 12);
    assert!(report.total_combinations > 12);
    assert_eq!(report.entries.len(), 5);
    for pair in report.entries.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert_eq!(report.entries[0].rank, 1);
    assert_eq!(report.entries[0].score, report.entries[0].result.total_return);

    let status = optimizer.status().snapshot();
    assert_eq!(status.completed_combinations, 12);
    assert_eq!(status.phase, "Completed");
}

#[test]
fn engine_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Engine>();
}
