//! Market-data sources: the external collaborators that feed the pipeline.
//!
//! A source only has to provide the stored series for a key. Windowing to
//! the evaluation clock and snapshot construction are provided on top:
//! - `historical_bars` → the last `lookback` bars at or before `as_of`
//! - `indicator_snapshot` → indicators for the last such bar
//!
//! Sources are read before the pipeline runs; evaluation itself never
//! touches I/O.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fuselab_core::domain::{Bar, IndicatorSnapshot, SeriesKey, Timeframe};
use fuselab_core::indicators::{build_snapshot, SnapshotError, SnapshotOptions};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("no data for {key} at {path}")]
    NotFound { key: SeriesKey, path: PathBuf },

    #[error("no bars for {key}")]
    Empty { key: SeriesKey },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{key}: unparseable timestamp '{value}' on row {row}")]
    Timestamp {
        key: SeriesKey,
        row: usize,
        value: String,
    },

    #[error("{key}: bar {index} is void or inconsistent")]
    InvalidBar { key: SeriesKey, index: usize },

    #[error("{key}: bar {index} is not after its predecessor")]
    Unordered { key: SeriesKey, index: usize },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

pub trait MarketDataSource: Send + Sync {
    /// Complete stored series for `key`, oldest first.
    fn series(&self, key: &SeriesKey) -> Result<Vec<Bar>, DataError>;

    /// Timestamp of the last stored bar, `None` for an empty series.
    fn latest_timestamp(&self, key: &SeriesKey) -> Result<Option<NaiveDateTime>, DataError> {
        Ok(self.series(key)?.last().map(|b| b.timestamp))
    }

    fn historical_bars(
        &self,
        key: &SeriesKey,
        as_of: Option<NaiveDateTime>,
        lookback: usize,
    ) -> Result<Vec<Bar>, DataError> {
        let mut bars = until(self.series(key)?, as_of);
        let start = bars.len().saturating_sub(lookback);
        Ok(bars.split_off(start))
    }

    /// Intraday keys use the symbol's daily series for daily ATR and CPR
    /// when the source has one, else resampled intraday bars.
    fn indicator_snapshot(
        &self,
        key: &SeriesKey,
        as_of: Option<NaiveDateTime>,
        opts: &SnapshotOptions,
    ) -> Result<IndicatorSnapshot, DataError> {
        let bars = until(self.series(key)?, as_of);
        if bars.is_empty() {
            return Err(DataError::Empty { key: key.clone() });
        }
        let daily = if key.timeframe.is_intraday() {
            self.series(&SeriesKey::new(key.symbol.clone(), Timeframe::Daily))
                .ok()
                .map(|d| until(d, as_of))
        } else {
            None
        };
        Ok(build_snapshot(
            &key.symbol,
            key.timeframe,
            &bars,
            daily.as_deref(),
            opts,
        )?)
    }
}

fn until(mut bars: Vec<Bar>, as_of: Option<NaiveDateTime>) -> Vec<Bar> {
    if let Some(t) = as_of {
        bars.retain(|b| b.timestamp <= t);
    }
    bars
}

/// Reject void, inconsistent or out-of-order bars.
pub fn check_series(key: &SeriesKey, bars: &[Bar]) -> Result<(), DataError> {
    for (index, bar) in bars.iter().enumerate() {
        if bar.is_void() || !bar.is_sane() {
            return Err(DataError::InvalidBar {
                key: key.clone(),
                index,
            });
        }
        if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
            return Err(DataError::Unordered {
                key: key.clone(),
                index,
            });
        }
    }
    Ok(())
}

// ── CSV ──────────────────────────────────────────────────────────────

/// One CSV row: `timestamp,open,high,low,close,volume`.
#[derive(Debug, Serialize, Deserialize)]
struct CsvBar {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]` or ISO `T`-separated timestamps.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Read bars from a CSV file with a header row.
pub fn read_bars_csv(key: &SeriesKey, path: &Path) -> Result<Vec<Bar>, DataError> {
    let file = File::open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            DataError::NotFound {
                key: key.clone(),
                path: path.to_path_buf(),
            }
        } else {
            DataError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    let mut bars = Vec::new();
    for (row, result) in reader.deserialize::<CsvBar>().enumerate() {
        let raw = result.map_err(|source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let timestamp = parse_timestamp(&raw.timestamp).ok_or_else(|| DataError::Timestamp {
            key: key.clone(),
            row: row + 1,
            value: raw.timestamp.clone(),
        })?;
        bars.push(Bar {
            timestamp,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
        });
    }
    check_series(key, &bars)?;
    Ok(bars)
}

/// Write bars as CSV, creating parent directories. Atomic (.tmp + rename).
pub fn write_bars_csv(path: &Path, bars: &[Bar]) -> Result<(), DataError> {
    let io_err = |source| DataError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp_path = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp_path).map_err(|source| DataError::Csv {
            path: tmp_path.clone(),
            source,
        })?;
        for bar in bars {
            writer
                .serialize(CsvBar {
                    timestamp: bar.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                })
                .map_err(|source| DataError::Csv {
                    path: tmp_path.clone(),
                    source,
                })?;
        }
        writer.flush().map_err(io_err)?;
    }
    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        io_err(source)
    })
}

/// Bars under `{dir}/{SYMBOL}/{tf}.csv`.
#[derive(Debug, Clone)]
pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &SeriesKey) -> PathBuf {
        self.dir
            .join(&key.symbol)
            .join(format!("{}.csv", key.timeframe.code()))
    }
}

impl MarketDataSource for CsvSource {
    fn series(&self, key: &SeriesKey) -> Result<Vec<Bar>, DataError> {
        read_bars_csv(key, &self.path_for(key))
    }
}

// ── In-memory ────────────────────────────────────────────────────────

/// Series and optional snapshot overrides held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    bars: HashMap<SeriesKey, Vec<Bar>>,
    snapshots: HashMap<SeriesKey, IndicatorSnapshot>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: SeriesKey, bars: Vec<Bar>) {
        self.bars.insert(key, bars);
    }

    /// Serve `snapshot` for `key` instead of computing one from bars.
    pub fn insert_snapshot(&mut self, key: SeriesKey, snapshot: IndicatorSnapshot) {
        self.snapshots.insert(key, snapshot);
    }
}

impl MarketDataSource for MemorySource {
    fn series(&self, key: &SeriesKey) -> Result<Vec<Bar>, DataError> {
        self.bars
            .get(key)
            .cloned()
            .ok_or_else(|| DataError::Empty { key: key.clone() })
    }

    fn indicator_snapshot(
        &self,
        key: &SeriesKey,
        as_of: Option<NaiveDateTime>,
        opts: &SnapshotOptions,
    ) -> Result<IndicatorSnapshot, DataError> {
        if let Some(snapshot) = self.snapshots.get(key) {
            return Ok(snapshot.clone());
        }
        let bars = until(self.series(key)?, as_of);
        if bars.is_empty() {
            return Err(DataError::Empty { key: key.clone() });
        }
        let daily = if key.timeframe.is_intraday() {
            self.bars
                .get(&SeriesKey::new(key.symbol.clone(), Timeframe::Daily))
                .map(|d| until(d.clone(), as_of))
        } else {
            None
        };
        Ok(build_snapshot(&key.symbol, key.timeframe, &bars, daily.as_deref(), opts)?)
    }
}
