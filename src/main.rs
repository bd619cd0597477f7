use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use pinelab::commands::{self, aggregate, backtest, inputs, results, suggest, sweep, RunArgs};
use pinelab::store::RecordFilter;
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pinelab")]
#[command(about = "Backtest script-defined trading strategies against historical bars")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the tunable inputs and detected signal family of a script
    Inputs {
        /// Strategy script file
        script: PathBuf,
    },
    /// Run one backtest and print the result as JSON
    Backtest {
        #[command(flatten)]
        run: RunArgs,
        /// Force a signal family (macd, rsi, ema_cross, sma_cross, fallback)
        #[arg(long)]
        family: Option<String>,
        /// Save the strategy and result into this store directory
        #[arg(long, value_name = "DIR")]
        store: Option<PathBuf>,
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Sweep the script's inputs over a parameter grid and rank the runs
    Sweep {
        #[command(flatten)]
        run: RunArgs,
        /// sharpe, total_return, profit_factor, win_rate or max_drawdown (overrides SWEEP_OBJECTIVE)
        #[arg(long)]
        objective: Option<String>,
        /// Overrides SWEEP_MAX_COMBINATIONS
        #[arg(long)]
        max_combinations: Option<usize>,
        /// Overrides SWEEP_TOP_RESULTS
        #[arg(long)]
        top: Option<usize>,
        /// Take ranges from the parameter advisor where it has one
        #[arg(long)]
        advise: bool,
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Inspect stored backtest results
    Results {
        #[command(subcommand)]
        action: ResultsAction,
        /// Store directory (defaults to PINELAB_STORE_DIR or ./data)
        #[arg(long, value_name = "DIR", global = true)]
        store: Option<PathBuf>,
    },
    /// Suggest sweep ranges for a script
    Suggest {
        script: PathBuf,
        #[arg(long, default_value = "UNKNOWN")]
        symbol: String,
        #[arg(long, default_value = "1h")]
        timeframe: String,
    },
    /// Aggregate [timestamp, price] samples into OHLCV bars
    Aggregate {
        #[arg(long, value_name = "PATH")]
        prices: PathBuf,
        /// 1m, 5m, 15m, 30m, 1h, 4h, 1d or 1w
        #[arg(long, default_value = "1h")]
        timeframe: String,
        #[arg(long, default_value = "UNKNOWN")]
        symbol: String,
        /// JSON file, or a .bin snapshot
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ResultsAction {
    /// List stored results, newest first
    List {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print one stored result in full
    Show { id: String },
    /// Delete one stored result
    Delete { id: String },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let Cli { command } = Cli::parse();

    info!("Starting pinelab. Backtests are not financial advice.");

    match command {
        Commands::Inputs { script } => inputs::run(&script)?,
        Commands::Backtest {
            run,
            family,
            store,
            output,
        } => {
            backtest::run(
                &run,
                family.as_deref(),
                store.as_deref(),
                output.as_deref(),
            )?;
        }
        Commands::Sweep {
            run,
            objective,
            max_combinations,
            top,
            advise,
            output,
        } => {
            sweep::run(
                &run,
                sweep::SweepOptions {
                    objective: objective.as_deref(),
                    max_combinations,
                    top,
                    advise,
                    output: output.as_deref(),
                },
            )?;
        }
        Commands::Results { action, store } => {
            let store_dir = resolve_store_dir(store);
            match action {
                ResultsAction::List {
                    symbol,
                    name,
                    limit,
                } => results::list(
                    &store_dir,
                    &RecordFilter {
                        name_contains: name,
                        symbol,
                        strategy_id: None,
                        limit,
                    },
                )?,
                ResultsAction::Show { id } => results::show(&store_dir, &id)?,
                ResultsAction::Delete { id } => results::delete(&store_dir, &id)?,
            }
        }
        Commands::Suggest {
            script,
            symbol,
            timeframe,
        } => suggest::run(&script, &symbol, &timeframe)?,
        Commands::Aggregate {
            prices,
            timeframe,
            symbol,
            output,
        } => aggregate::run(&prices, &timeframe, &symbol, output.as_deref())?,
    }

    Ok(())
}

fn resolve_store_dir(cli_value: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_value {
        return path;
    }

    env::var("PINELAB_STORE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(commands::DEFAULT_STORE_DIR))
}
