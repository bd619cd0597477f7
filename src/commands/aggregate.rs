use super::emit_json;
use crate::market_data::{aggregate_prices, load_prices, save_snapshot, Timeframe};
use anyhow::Result;
use log::info;
use std::path::Path;

/// Buckets raw price samples into bars. Outputs ending in `.bin` are written as snapshots.
pub fn run(prices_path: &Path, timeframe: &str, symbol: &str, output: Option<&Path>) -> Result<()> {
    let samples = load_prices(prices_path)?;
    let timeframe = Timeframe::parse(timeframe);
    let bars = aggregate_prices(&samples, timeframe);
    info!(
        "Aggregated {} samples into {} {} bars",
        samples.len(),
        bars.len(),
        timeframe.as_str()
    );

    match output {
        Some(path) if path.extension().and_then(|e| e.to_str()) == Some("bin") => {
            save_snapshot(path, symbol, timeframe.as_str(), &bars)?;
            info!("Wrote bar snapshot to {}", path.display());
            Ok(())
        }
        other => emit_json(&bars, other),
    }
}
