use super::{emit_json, result_store};
use crate::store::{RecordFilter, RecordStore};
use anyhow::{anyhow, Result};
use log::info;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultRow {
    id: String,
    strategy_name: String,
    symbol: String,
    timeframe: String,
    total_return: f64,
    sharpe_ratio: f64,
    max_drawdown: f64,
    win_rate: f64,
    total_trades: usize,
    created_at: i64,
}

pub fn list(store_dir: &Path, filter: &RecordFilter) -> Result<()> {
    let rows: Vec<ResultRow> = result_store(store_dir)
        .list(filter)?
        .into_iter()
        .map(|r| ResultRow {
            id: r.id,
            strategy_name: r.strategy_name,
            symbol: r.symbol,
            timeframe: r.timeframe,
            total_return: r.total_return,
            sharpe_ratio: r.sharpe_ratio,
            max_drawdown: r.max_drawdown,
            win_rate: r.win_rate,
            total_trades: r.total_trades,
            created_at: r.created_at,
        })
        .collect();
    info!("{} stored results", rows.len());
    emit_json(&rows, None)
}

pub fn show(store_dir: &Path, id: &str) -> Result<()> {
    let record = result_store(store_dir)
        .get(id)?
        .ok_or_else(|| anyhow!("No stored result with id {}", id))?;
    emit_json(&record, None)
}

pub fn delete(store_dir: &Path, id: &str) -> Result<()> {
    if result_store(store_dir).delete(id)? {
        info!("Deleted result {}", id);
        Ok(())
    } else {
        Err(anyhow!("No stored result with id {}", id))
    }
}
