use crate::error::{EngineError, EngineResult};
use crate::models::Bar;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const BAR_SNAPSHOT_VERSION: u32 = 1;
/// Synthetic volume credited per aggregated price sample, as a fraction of the price.
const SAMPLE_VOLUME_RATIO: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
}

impl Timeframe {
    /// Unknown labels fall back to one hour.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1m" => Self::OneMinute,
            "5m" => Self::FiveMinutes,
            "15m" => Self::FifteenMinutes,
            "30m" => Self::ThirtyMinutes,
            "1h" => Self::OneHour,
            "4h" => Self::FourHours,
            "1d" => Self::OneDay,
            "1w" => Self::OneWeek,
            other => {
                warn!("Unknown timeframe `{}`; using 1h", other);
                Self::OneHour
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
            Self::OneWeek => "1w",
        }
    }

    pub fn duration_ms(self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            Self::OneMinute => MINUTE,
            Self::FiveMinutes => 5 * MINUTE,
            Self::FifteenMinutes => 15 * MINUTE,
            Self::ThirtyMinutes => 30 * MINUTE,
            Self::OneHour => 60 * MINUTE,
            Self::FourHours => 240 * MINUTE,
            Self::OneDay => 1_440 * MINUTE,
            Self::OneWeek => 10_080 * MINUTE,
        }
    }
}

/// A raw `[timestamp_ms, price]` observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample(pub i64, pub f64);

/// Rejects series the engine cannot simulate: out-of-order or duplicate timestamps and
/// non-finite or non-positive prices.
pub fn validate_bars(bars: &[Bar]) -> EngineResult<()> {
    if bars.is_empty() {
        return Err(EngineError::invalid("bar series is empty"));
    }

    for (index, bar) in bars.iter().enumerate() {
        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(EngineError::invalid(format!(
                "bar {} at {} has a non-positive or non-finite price",
                index, bar.time
            )));
        }
        if bar.high < bar.low {
            return Err(EngineError::invalid(format!(
                "bar {} at {} has high {} below low {}",
                index, bar.time, bar.high, bar.low
            )));
        }
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            return Err(EngineError::invalid(format!(
                "bar {} at {} has invalid volume {}",
                index, bar.time, bar.volume
            )));
        }
    }

    if let Some(pair) = bars.windows(2).find(|pair| pair[1].time <= pair[0].time) {
        return Err(EngineError::invalid(format!(
            "bar times must be strictly increasing ({} followed by {})",
            pair[0].time, pair[1].time
        )));
    }

    Ok(())
}

/// Buckets price samples into OHLCV bars aligned to the timeframe boundary.
pub fn aggregate_prices(samples: &[PriceSample], timeframe: Timeframe) -> Vec<Bar> {
    let mut ordered: Vec<PriceSample> = samples
        .iter()
        .copied()
        .filter(|sample| sample.1.is_finite() && sample.1 > 0.0)
        .collect();
    ordered.sort_by_key(|sample| sample.0);

    let bar_ms = timeframe.duration_ms();
    let mut bars: Vec<Bar> = Vec::new();

    for PriceSample(time, price) in ordered {
        let bucket_start = time.div_euclid(bar_ms) * bar_ms;
        match bars.last_mut() {
            Some(bar) if bar.time == bucket_start => {
                bar.high = bar.high.max(price);
                bar.low = bar.low.min(price);
                bar.close = price;
                bar.volume += price * SAMPLE_VOLUME_RATIO;
            }
            _ => bars.push(Bar {
                time: bucket_start,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: price * SAMPLE_VOLUME_RATIO,
            }),
        }
    }

    bars
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarSnapshot {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: String,
    pub bars: Vec<Bar>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BarDocument {
    Bars(Vec<Bar>),
    Wrapped { bars: Vec<Bar> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PriceDocument {
    Prices(Vec<PriceSample>),
    Wrapped { prices: Vec<PriceSample> },
}

fn is_snapshot_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("bin") | Some("snapshot")
    )
}

/// Loads bars from a JSON array (or `{"bars": [...]}`), or from a `.bin` snapshot.
pub fn load_bars<P: AsRef<Path>>(path: P) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    if is_snapshot_path(path) {
        return load_snapshot(path).map(|snapshot| snapshot.bars);
    }

    let file = File::open(path)
        .with_context(|| format!("Failed to open bar file at {}", path.display()))?;
    let document: BarDocument = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse bars from {}", path.display()))?;
    let bars = match document {
        BarDocument::Bars(bars) | BarDocument::Wrapped { bars } => bars,
    };
    info!("Loaded {} bars from {}", bars.len(), path.display());
    Ok(bars)
}

/// Loads `[timestamp_ms, price]` pairs from JSON (a bare array or `{"prices": [...]}`).
pub fn load_prices<P: AsRef<Path>>(path: P) -> Result<Vec<PriceSample>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open price file at {}", path.display()))?;
    let document: PriceDocument = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse prices from {}", path.display()))?;
    Ok(match document {
        PriceDocument::Prices(prices) | PriceDocument::Wrapped { prices } => prices,
    })
}

pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<BarSnapshot> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open bar snapshot at {}", path.display()))?;
    let reader = BufReader::new(file);
    let snapshot: BarSnapshot =
        bincode::deserialize_from(reader).context("Snapshot decode failed")?;

    if snapshot.version != BAR_SNAPSHOT_VERSION {
        return Err(anyhow!(
            "Bar snapshot version mismatch (found {}, expected {})",
            snapshot.version,
            BAR_SNAPSHOT_VERSION
        ));
    }

    info!(
        "Loaded {} {} {} bars from snapshot generated {}",
        snapshot.bars.len(),
        snapshot.symbol,
        snapshot.timeframe,
        snapshot.generated_at
    );
    Ok(snapshot)
}

pub fn save_snapshot<P: AsRef<Path>>(
    path: P,
    symbol: &str,
    timeframe: &str,
    bars: &[Bar],
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create snapshot directory {}", parent.display())
            })?;
        }
    }

    let file = File::create(path)
        .with_context(|| format!("Unable to create bar snapshot at {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let snapshot = BarSnapshot {
        version: BAR_SNAPSHOT_VERSION,
        generated_at: Utc::now(),
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        bars: bars.to_vec(),
    };
    bincode::serialize_into(&mut writer, &snapshot)
        .context("Failed to serialize bar snapshot")?;
    writer
        .flush()
        .context("Failed to flush bar snapshot to disk")?;
    Ok(())
}
