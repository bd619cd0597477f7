use super::{emit_json, RunArgs};
use crate::advisor::{suggest_with_fallback, suggestion_ranges, AdviceRequest};
use crate::config::{SweepObjective, SweepSettings};
use crate::engine::Engine;
use crate::optimizer::Optimizer;
use anyhow::Result;
use log::info;
use std::collections::HashMap;
use std::path::Path;

pub struct SweepOptions<'a> {
    pub objective: Option<&'a str>,
    pub max_combinations: Option<usize>,
    pub top: Option<usize>,
    /// Use advisor ranges instead of name heuristics where available.
    pub advise: bool,
    pub output: Option<&'a Path>,
}

pub fn run(args: &RunArgs, options: SweepOptions<'_>) -> Result<()> {
    let mut settings = SweepSettings::from_env()?;
    if let Some(raw) = options.objective {
        settings.objective = SweepObjective::parse(raw)?;
    }
    if let Some(max) = options.max_combinations {
        settings.max_combinations = max.max(1);
    }
    if let Some(top) = options.top {
        settings.top_results = top.max(1);
    }

    let source = args.read_script()?;
    let bars = args.load_bars()?;
    let overrides = args.overrides()?;
    let config = args.config();

    let ranges = if options.advise {
        let suggestions = suggest_with_fallback(
            None,
            &AdviceRequest {
                script: source.clone(),
                symbol: config.symbol.clone(),
                timeframe: config.timeframe.clone(),
            },
        );
        info!("Using {} advised ranges", suggestions.len());
        suggestion_ranges(&suggestions)
    } else {
        HashMap::new()
    };

    let optimizer = Optimizer::new(Engine::new(), settings).with_ranges(ranges);
    let report = optimizer.sweep(&bars, &source, &overrides, &config)?;
    info!(
        "Evaluated {} of {} combinations ({} failed)",
        report.evaluated, report.total_combinations, report.failed
    );

    for entry in &report.entries {
        info!(
            "#{} score {:.3}: return {:.2}%, drawdown {:.2}%, {} trades, params {:?}",
            entry.rank,
            entry.score,
            entry.result.total_return,
            entry.result.max_drawdown,
            entry.result.total_trades,
            entry.params
        );
    }

    emit_json(&report, options.output)
}
