//! FuseLab Runner: batch scans over market data with persistent ladder state.
//!
//! This crate builds on `fuselab-core` to provide:
//! - Market-data sources (CSV directory, in-memory, seeded synthetic)
//! - A keyed ladder store with single-writer-per-key updates and JSON persistence
//! - The batch scanner (rayon fan-out, per-pair failure isolation)
//! - TOML scan configuration
//! - JSONL record history
//! - Logging initialization

pub mod config;
pub mod data_loader;
pub mod history;
pub mod ladder_store;
pub mod logging;
pub mod scan;
pub mod synthetic;

pub use config::{ConfigError, ScanConfig, SourceKind, SyntheticConfig};
pub use data_loader::{
    parse_timestamp, read_bars_csv, write_bars_csv, CsvSource, DataError, MarketDataSource, MemorySource,
};
pub use history::{HistoryEntry, RecordHistory};
pub use ladder_store::{LadderStore, StoreError};
pub use logging::init_logging;
pub use scan::{ScanError, ScanOptions, ScanOutcome, ScanReport, Scanner};
pub use synthetic::{generate_bars, SyntheticSource};

/// Build the market-data source a scan config names.
pub fn source_for(cfg: &ScanConfig) -> Box<dyn MarketDataSource> {
    match cfg.source {
        SourceKind::Csv => Box::new(CsvSource::new(cfg.data_dir.clone())),
        SourceKind::Synthetic => Box::new(SyntheticSource {
            seed: cfg.synthetic.seed,
            bars: cfg.synthetic.bars,
            start: cfg.synthetic.start,
        }),
    }
}

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn ladder_store_is_send_sync() {
        assert_send::<LadderStore>();
        assert_sync::<LadderStore>();
    }

    #[test]
    fn sources_are_send_sync() {
        assert_send::<CsvSource>();
        assert_sync::<CsvSource>();
        assert_send::<MemorySource>();
        assert_sync::<MemorySource>();
        assert_send::<SyntheticSource>();
        assert_sync::<SyntheticSource>();
    }

    #[test]
    fn scanner_is_sync() {
        assert_sync::<Scanner<'static>>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<ScanConfig>();
        assert_sync::<ScanConfig>();
        assert_send::<ScanOptions>();
        assert_sync::<ScanOptions>();
    }
}
