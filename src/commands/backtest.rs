use super::{emit_json, result_store, strategy_store, RunArgs};
use crate::engine::Engine;
use crate::store::{mark_backtested, RecordStore, ResultRecord, StrategyRecord};
use crate::strategy::StrategyFamily;
use anyhow::{anyhow, Result};
use log::{debug, info};
use std::path::Path;

pub fn run(
    args: &RunArgs,
    family: Option<&str>,
    store_dir: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let source = args.read_script()?;
    let bars = args.load_bars()?;
    let overrides = args.overrides()?;
    let config = args.config();

    let engine = match family {
        Some(raw) => Engine::with_family(
            StrategyFamily::parse(raw).ok_or_else(|| anyhow!("Unknown strategy family `{}`", raw))?,
        ),
        None => Engine::new(),
    };

    info!(
        "Backtesting {} over {} bars of {} {}",
        args.script.display(),
        bars.len(),
        config.symbol,
        config.timeframe
    );
    let result = engine.backtest(&bars, &source, &overrides, &config)?;
    info!(
        "{}: return {:.2}%, max drawdown {:.2}%, Sharpe {:.3}, {} trades ({:.2}% winners)",
        result.strategy_name,
        result.total_return,
        result.max_drawdown,
        result.sharpe_ratio,
        result.total_trades,
        result.win_rate
    );

    for trade in &result.trades {
        debug!(
            "#{} {} {:.4} -> {:.4} over {} bars: {:.2} ({:.2}%)",
            trade.id,
            trade.direction.as_str(),
            trade.entry_price,
            trade.exit_price,
            trade.bars,
            trade.pnl,
            trade.pnl_pct
        );
    }

    if let Some(dir) = store_dir {
        let strategies = strategy_store(dir);
        let strategy_id = strategies.save(StrategyRecord::from_script(
            Some(result.strategy_name.as_str()),
            &source,
        ))?;
        let results = result_store(dir);
        let record_id = results.save(ResultRecord::from_result(&result, Some(strategy_id.clone())))?;
        mark_backtested(&strategies, &strategy_id)?;
        info!("Stored result {} under strategy {}", record_id, strategy_id);
    }

    emit_json(&result, output)
}
