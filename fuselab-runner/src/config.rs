//! Scan configuration loaded from TOML.
//!
//! Every section is `#[serde(default)]`; a minimal file only names the data
//! directory and the pairs to scan:
//!
//! ```toml
//! data_dir = "data"
//! pairs = ["RELIANCE@1d", "INFY@15m"]
//!
//! [fusion.validity]
//! overextension_atr_mult = 1.5
//! ```

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fuselab_core::domain::{KeyParseError, SeriesKey};
use fuselab_core::indicators::SnapshotOptions;
use fuselab_core::FusionConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid scan config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid pair '{pair}': {source}")]
    InvalidPair { pair: String, source: KeyParseError },

    #[error("scan config lists no pairs")]
    NoPairs,

    #[error("threads must be at least 1")]
    ZeroThreads,
}

/// Where bars come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// `{data_dir}/{SYMBOL}/{tf}.csv`
    #[default]
    Csv,
    /// Seeded random walks; developer mode only.
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub bars: usize,
    pub start: NaiveDateTime,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            bars: 400,
            start: NaiveDate::from_ymd_opt(2020, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub data_dir: PathBuf,
    pub source: SourceKind,
    pub synthetic: SyntheticConfig,
    /// `SYMBOL@tf` strings.
    pub pairs: Vec<String>,
    /// Evaluation clock. Absent: each series is evaluated at its last bar.
    pub as_of: Option<NaiveDateTime>,
    pub parallel: bool,
    /// Worker threads for the parallel scan (rayon default when absent).
    pub threads: Option<usize>,
    /// Build Daily/Weekly/Monthly frames for the trend composite.
    pub higher_frames: bool,
    pub state_path: Option<PathBuf>,
    pub history_path: Option<PathBuf>,
    pub snapshot: SnapshotOptions,
    pub fusion: FusionConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            source: SourceKind::default(),
            synthetic: SyntheticConfig::default(),
            pairs: Vec::new(),
            as_of: None,
            parallel: true,
            threads: None,
            higher_frames: true,
            state_path: None,
            history_path: None,
            snapshot: SnapshotOptions::default(),
            fusion: FusionConfig::default(),
        }
    }
}

impl ScanConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pairs.is_empty() {
            return Err(ConfigError::NoPairs);
        }
        if self.threads == Some(0) {
            return Err(ConfigError::ZeroThreads);
        }
        self.keys().map(|_| ())
    }

    /// Parsed pairs, in file order.
    pub fn keys(&self) -> Result<Vec<SeriesKey>, ConfigError> {
        self.pairs
            .iter()
            .map(|pair| {
                pair.parse().map_err(|source| ConfigError::InvalidPair {
                    pair: pair.clone(),
                    source,
                })
            })
            .collect()
    }
}
