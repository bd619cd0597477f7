use crate::inputs::StrategyScript;
use crate::models::{BacktestResult, Parameter, ParameterSet};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

pub const MAX_STRATEGY_RECORDS: usize = 50;
pub const MAX_RESULT_RECORDS: usize = 200;

/// Narrows `list` output. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub name_contains: Option<String>,
    pub symbol: Option<String>,
    pub strategy_id: Option<String>,
    pub limit: Option<usize>,
}

pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync {
    /// Records kept per store; the oldest are dropped past this.
    const CAPACITY: usize;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn matches(&self, filter: &RecordFilter) -> bool;

    /// Whether saving `self` should overwrite `existing` instead of adding a new record.
    fn replaces(&self, existing: &Self) -> bool {
        self.id() == existing.id()
    }

    /// Carries identity fields over when `self` overwrites `existing`.
    fn inherit(&mut self, existing: &Self) {
        self.set_id(existing.id().to_string());
    }
}

/// Persistence for saved strategies and results. Lists are newest first.
pub trait RecordStore<R: Record>: Send + Sync {
    fn save(&self, record: R) -> Result<String>;
    fn get(&self, id: &str) -> Result<Option<R>>;
    fn list(&self, filter: &RecordFilter) -> Result<Vec<R>>;
    fn delete(&self, id: &str) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyRecord {
    pub id: String,
    pub name: String,
    pub script: String,
    pub inputs: Vec<Parameter>,
    pub description: String,
    pub created_at: i64,
    pub last_backtest: Option<i64>,
    pub backtest_count: u32,
}

impl StrategyRecord {
    /// Builds a record from script text; `name` overrides the name declared in the script.
    pub fn from_script(name: Option<&str>, script: &str) -> Self {
        let parsed = StrategyScript::parse(script);
        Self {
            id: String::new(),
            name: name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| parsed.name.clone()),
            script: script.to_string(),
            description: parsed.description(),
            inputs: parsed.inputs,
            created_at: Utc::now().timestamp_millis(),
            last_backtest: None,
            backtest_count: 0,
        }
    }
}

impl Record for StrategyRecord {
    const CAPACITY: usize = MAX_STRATEGY_RECORDS;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn matches(&self, filter: &RecordFilter) -> bool {
        filter
            .name_contains
            .as_ref()
            .map_or(true, |needle| {
                self.name.to_lowercase().contains(&needle.to_lowercase())
            })
    }

    /// Strategies are unique by name.
    fn replaces(&self, existing: &Self) -> bool {
        (!self.id.is_empty() && self.id == existing.id) || self.name == existing.name
    }

    fn inherit(&mut self, existing: &Self) {
        self.id = existing.id.clone();
        self.created_at = existing.created_at;
        self.last_backtest = self.last_backtest.or(existing.last_backtest);
        self.backtest_count = self.backtest_count.max(existing.backtest_count);
    }
}

/// Summary of a run plus the full result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: String,
    pub strategy_id: Option<String>,
    pub strategy_name: String,
    pub symbol: String,
    pub timeframe: String,
    pub start_date: String,
    pub end_date: String,
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub profit_factor: f64,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub params: ParameterSet,
    pub created_at: i64,
    pub full_result: Option<BacktestResult>,
}

impl ResultRecord {
    pub fn from_result(result: &BacktestResult, strategy_id: Option<String>) -> Self {
        Self {
            id: result.id.clone(),
            strategy_id,
            strategy_name: result.strategy_name.clone(),
            symbol: result.symbol.clone(),
            timeframe: result.timeframe.clone(),
            start_date: result.start_date.clone(),
            end_date: result.end_date.clone(),
            total_return: result.total_return,
            sharpe_ratio: result.sharpe_ratio,
            max_drawdown: result.max_drawdown,
            win_rate: result.win_rate,
            total_trades: result.total_trades,
            profit_factor: result.profit_factor,
            initial_capital: result.initial_capital,
            final_equity: result.final_equity,
            params: result.params.clone(),
            created_at: Utc::now().timestamp_millis(),
            full_result: Some(result.clone()),
        }
    }
}

impl Record for ResultRecord {
    const CAPACITY: usize = MAX_RESULT_RECORDS;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn matches(&self, filter: &RecordFilter) -> bool {
        let name_ok = filter.name_contains.as_ref().map_or(true, |needle| {
            self.strategy_name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        let symbol_ok = filter
            .symbol
            .as_ref()
            .map_or(true, |symbol| self.symbol.eq_ignore_ascii_case(symbol));
        let strategy_ok = filter
            .strategy_id
            .as_ref()
            .map_or(true, |id| self.strategy_id.as_deref() == Some(id.as_str()));
        name_ok && symbol_ok && strategy_ok
    }
}

/// Inserts newest-first, overwriting a record `record` replaces, and enforces capacity.
fn upsert<R: Record>(records: &mut Vec<R>, mut record: R) -> String {
    if let Some(pos) = records.iter().position(|existing| record.replaces(existing)) {
        let existing = records.remove(pos);
        record.inherit(&existing);
    } else if record.id().is_empty() {
        record.set_id(Uuid::new_v4().to_string());
    }

    let id = record.id().to_string();
    records.insert(0, record);
    if records.len() > R::CAPACITY {
        debug!("Dropping {} records past capacity", records.len() - R::CAPACITY);
        records.truncate(R::CAPACITY);
    }
    id
}

fn select<R: Record>(records: &[R], filter: &RecordFilter) -> Vec<R> {
    records
        .iter()
        .filter(|record| record.matches(filter))
        .take(filter.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

/// Process-local store.
pub struct MemoryStore<R: Record> {
    records: RwLock<Vec<R>>,
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl<R: Record> MemoryStore<R> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: Record> RecordStore<R> for MemoryStore<R> {
    fn save(&self, record: R) -> Result<String> {
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("Record store lock poisoned"))?;
        Ok(upsert(&mut records, record))
    }

    fn get(&self, id: &str) -> Result<Option<R>> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("Record store lock poisoned"))?;
        Ok(records.iter().find(|r| r.id() == id).cloned())
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<R>> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("Record store lock poisoned"))?;
        Ok(select(&records, filter))
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("Record store lock poisoned"))?;
        let before = records.len();
        records.retain(|r| r.id() != id);
        Ok(records.len() != before)
    }
}

/// Store backed by one JSON array file, rewritten on every change.
pub struct JsonFileStore<R: Record> {
    path: PathBuf,
    lock: Mutex<()>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> JsonFileStore<R> {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<R>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open record store {}", self.path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse record store {}", self.path.display()))
    }

    fn write_all(&self, records: &[R]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create store directory {}", parent.display())
                })?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let file = File::create(&tmp_path)
            .with_context(|| format!("Unable to create {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, records)
            .context("Failed to serialize records")?;
        writer
            .flush()
            .context("Failed to flush record store to disk")?;
        drop(writer);
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!("Failed to replace record store {}", self.path.display())
        })?;
        Ok(())
    }
}

impl<R: Record> RecordStore<R> for JsonFileStore<R> {
    fn save(&self, record: R) -> Result<String> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("Record store lock poisoned"))?;
        let mut records = self.read_all()?;
        let id = upsert(&mut records, record);
        self.write_all(&records)?;
        info!("Saved record {} to {}", id, self.path.display());
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<R>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("Record store lock poisoned"))?;
        Ok(self.read_all()?.into_iter().find(|r| r.id() == id))
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<R>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("Record store lock poisoned"))?;
        Ok(select(&self.read_all()?, filter))
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("Record store lock poisoned"))?;
        let mut records = self.read_all()?;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            return Ok(false);
        }
        self.write_all(&records)?;
        Ok(true)
    }
}

/// Bumps the strategy's backtest counter after one of its results was saved.
pub fn mark_backtested(
    strategies: &dyn RecordStore<StrategyRecord>,
    strategy_id: &str,
) -> Result<bool> {
    let Some(mut strategy) = strategies.get(strategy_id)? else {
        return Ok(false);
    };
    strategy.backtest_count += 1;
    strategy.last_backtest = Some(Utc::now().timestamp_millis());
    strategies.save(strategy)?;
    Ok(true)
}
