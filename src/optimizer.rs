use crate::config::{BacktestConfig, SweepObjective, SweepSettings};
use crate::engine::Engine;
use crate::inputs::StrategyScript;
use crate::market_data::validate_bars;
use crate::models::{BacktestResult, Bar, Parameter, ParameterKind, ParameterSet};
use crate::optimizer_status::OptimizerStatus;
use crate::param_utils::{merge_with_defaults, range_values, suggest_range, ParameterRange};
use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

/// One swept input and the range it is stepped through.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepDimension {
    pub name: String,
    pub kind: ParameterKind,
    pub range: ParameterRange,
}

impl SweepDimension {
    pub fn from_parameter(parameter: &Parameter) -> Self {
        Self {
            name: parameter.name.clone(),
            kind: parameter.kind,
            range: suggest_range(parameter),
        }
    }

    pub fn values(&self) -> Vec<f64> {
        range_values(&self.range, self.kind)
    }
}

pub fn sweep_dimensions(inputs: &[Parameter]) -> Vec<SweepDimension> {
    inputs.iter().map(SweepDimension::from_parameter).collect()
}

/// Number of combinations the full cartesian product would contain, saturating.
pub fn grid_size(dimensions: &[SweepDimension]) -> usize {
    dimensions
        .iter()
        .map(|d| d.values().len())
        .filter(|&count| count > 0)
        .fold(1usize, |acc, count| acc.saturating_mul(count))
}

/// Cartesian product of the dimension values in declaration order, the last dimension
/// varying fastest, truncated to `max_combinations`. Dimensions without any valid value are
/// left out and keep their default.
pub fn build_grid(dimensions: &[SweepDimension], max_combinations: usize) -> Vec<ParameterSet> {
    let axes: Vec<(&str, Vec<f64>)> = dimensions
        .iter()
        .map(|d| (d.name.as_str(), d.values()))
        .filter(|(_, values)| !values.is_empty())
        .collect();

    let mut grid = Vec::new();
    if max_combinations == 0 {
        return grid;
    }

    let mut cursor = vec![0usize; axes.len()];
    loop {
        let combination: ParameterSet = axes
            .iter()
            .zip(&cursor)
            .map(|((name, values), &i)| (name.to_string(), values[i]))
            .collect();
        grid.push(combination);
        if grid.len() >= max_combinations {
            break;
        }

        // Odometer increment from the last axis.
        let mut axis = axes.len();
        loop {
            if axis == 0 {
                return grid;
            }
            axis -= 1;
            cursor[axis] += 1;
            if cursor[axis] < axes[axis].1.len() {
                break;
            }
            cursor[axis] = 0;
        }
    }
    grid
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepEntry {
    pub rank: usize,
    pub score: f64,
    pub params: ParameterSet,
    pub result: BacktestResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub objective: SweepObjective,
    pub dimensions: Vec<SweepDimension>,
    pub total_combinations: usize,
    pub evaluated: usize,
    pub failed: usize,
    pub entries: Vec<SweepEntry>,
}

/// Runs the engine once per grid combination in parallel and ranks the results.
pub struct Optimizer {
    engine: Engine,
    settings: SweepSettings,
    status: OptimizerStatus,
    range_overrides: HashMap<String, ParameterRange>,
    show_progress: bool,
}

impl Optimizer {
    pub fn new(engine: Engine, settings: SweepSettings) -> Self {
        Self {
            engine,
            settings,
            status: OptimizerStatus::new(),
            range_overrides: HashMap::new(),
            show_progress: true,
        }
    }

    pub fn with_status(mut self, status: OptimizerStatus) -> Self {
        self.status = status;
        self
    }

    /// Replaces the suggested range of any input named in `ranges`.
    pub fn with_ranges(mut self, ranges: HashMap<String, ParameterRange>) -> Self {
        self.range_overrides = ranges;
        self
    }

    pub fn without_progress_bar(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn status(&self) -> &OptimizerStatus {
        &self.status
    }

    pub fn settings(&self) -> &SweepSettings {
        &self.settings
    }

    pub fn sweep(
        &self,
        bars: &[Bar],
        source: &str,
        overrides: &HashMap<String, f64>,
        config: &BacktestConfig,
    ) -> Result<SweepReport> {
        validate_bars(bars)?;
        let script = StrategyScript::parse(source);
        let mut dimensions = sweep_dimensions(&script.inputs);
        for dimension in dimensions.iter_mut() {
            if let Some(range) = self.range_overrides.get(&dimension.name) {
                dimension.range = *range;
            }
        }
        let base_params = merge_with_defaults(&script.inputs, overrides);

        let total_combinations = grid_size(&dimensions);
        let grid = build_grid(&dimensions, self.settings.max_combinations);
        if grid.len() < total_combinations {
            warn!(
                "Parameter grid has {} combinations; evaluating the first {}",
                total_combinations,
                grid.len()
            );
        }

        info!(
            "Sweeping {} combinations of {} over {} bars, ranked by {}",
            grid.len(),
            script.name,
            bars.len(),
            self.settings.objective.label()
        );
        if let Some(family) = self.engine.family_override() {
            info!("Signal family forced to {}", family.label());
        }
        self.status.set_phase(format!("Sweeping {}", script.name));
        self.status.begin(grid.len());

        let num_workers = self.settings.threads.clamp(1, grid.len().max(1));
        info!("Using {} worker threads", num_workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .build()
            .map_err(|e| anyhow!("Failed to build sweep thread pool: {}", e))?;

        let pb = if self.show_progress {
            ProgressBar::new(grid.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .map_err(|e| anyhow!("Invalid progress template: {}", e))?
                .progress_chars("#>-"),
        );

        let objective = self.settings.objective;
        let start_time = Instant::now();
        let outcomes: Vec<Option<(f64, ParameterSet, BacktestResult)>> = pool.install(|| {
            grid.par_iter()
                .map(|combination| {
                    let mut params = base_params.clone();
                    params.extend(combination.iter().map(|(k, v)| (k.clone(), *v)));

                    let outcome = match self
                        .engine
                        .backtest_script(bars, source, &script, &params, config)
                    {
                        Ok(result) => {
                            let score = objective.score(&result);
                            Some((score, params, result))
                        }
                        Err(e) => {
                            warn!("Combination {:?} failed: {}", combination, e);
                            None
                        }
                    };
                    self.status.record(outcome.as_ref().map(|(score, _, _)| *score));
                    pb.inc(1);
                    outcome
                })
                .collect()
        });

        let failed = outcomes.iter().filter(|o| o.is_none()).count();
        if failed > 0 {
            pb.finish_with_message("Sweep completed with errors");
            warn!("Sweep completed with {} failed combinations", failed);
        } else {
            pb.finish_with_message("Sweep completed");
        }

        let mut ranked: Vec<(f64, ParameterSet, BacktestResult)> =
            outcomes.into_iter().flatten().collect();
        ranked.sort_by(|a, b| compare_ranked(&a.0, &a.1, &b.0, &b.1));

        let evaluated = ranked.len();
        let entries: Vec<SweepEntry> = ranked
            .into_iter()
            .take(self.settings.top_results)
            .enumerate()
            .map(|(i, (score, params, result))| SweepEntry {
                rank: i + 1,
                score,
                params,
                result,
            })
            .collect();

        if let Some(best) = entries.first() {
            info!(
                "Best {}: {:.3} (return {:.2}%, {} trades) in {:.1}s",
                objective.label(),
                best.score,
                best.result.total_return,
                best.result.total_trades,
                start_time.elapsed().as_secs_f64()
            );
        }
        self.status.set_phase("Completed");

        Ok(SweepReport {
            objective,
            dimensions,
            total_combinations,
            evaluated,
            failed,
            entries,
        })
    }
}

/// Higher scores first; ties broken by the parameter values so ranking is deterministic.
fn compare_ranked(
    score_a: &f64,
    params_a: &ParameterSet,
    score_b: &f64,
    params_b: &ParameterSet,
) -> Ordering {
    score_b
        .partial_cmp(score_a)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            params_a
                .values()
                .zip(params_b.values())
                .map(|(a, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        })
}
