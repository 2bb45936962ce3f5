//! FuseLab CLI: scan, evaluate, synthetic data and ladder state commands.
//!
//! Commands:
//! - `scan`: evaluate every pair in a TOML scan config, commit ladder state
//! - `evaluate`: evaluate one series from a CSV bar file
//! - `synthetic`: write a seeded synthetic bar series as CSV
//! - `ladder show`: print persisted ladder state
//! - `ladder reset`: reset one key, or every key, to stage 0
//!
//! Records go to stdout; logs go to stderr (`RUST_LOG`, default `info`).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use tracing::info;

use fuselab_core::domain::{SeriesKey, Timeframe};
use fuselab_core::{OutputRecord, Pipeline};
use fuselab_runner::{
    generate_bars, init_logging, parse_timestamp, read_bars_csv, source_for, write_bars_csv,
    HistoryEntry, LadderStore, MemorySource, RecordHistory, ScanConfig, ScanOptions, ScanReport,
    Scanner,
};

#[derive(Parser)]
#[command(
    name = "fuselab",
    about = "FuseLab CLI: signal fusion and trade validity scanner"
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every pair listed in a scan config.
    Scan {
        /// Path to the TOML scan config.
        #[arg(long)]
        config: PathBuf,

        /// Evaluate pairs one at a time instead of in parallel.
        #[arg(long, default_value_t = false)]
        serial: bool,

        /// Evaluation clock (YYYY-MM-DD[ HH:MM[:SS]]); overrides the config.
        #[arg(long)]
        as_of: Option<String>,

        /// Print records as JSON lines instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Evaluate a single series from a CSV bar file.
    Evaluate {
        #[arg(long)]
        symbol: String,

        /// Timeframe code: 5m, 15m, 30m, 60m, 1d, 1w, 1mo.
        #[arg(long)]
        timeframe: Timeframe,

        /// CSV with timestamp,open,high,low,close,volume.
        #[arg(long)]
        bars: PathBuf,

        /// Daily bars for intraday series (daily ATR and CPR).
        #[arg(long)]
        daily: Option<PathBuf>,

        /// Ladder state file to read and commit.
        #[arg(long)]
        state: Option<PathBuf>,

        /// Scan config whose fusion and snapshot settings to use.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        as_of: Option<String>,
    },
    /// Write a seeded synthetic bar series as CSV.
    Synthetic {
        #[arg(long)]
        symbol: String,

        #[arg(long)]
        timeframe: Timeframe,

        /// Number of bars.
        #[arg(long, default_value_t = 400)]
        bars: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// First bar (YYYY-MM-DD). Defaults to 2020-01-01.
        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        out: PathBuf,
    },
    /// Inspect or reset persisted ladder state.
    Ladder {
        #[command(subcommand)]
        action: LadderAction,
    },
}

#[derive(Subcommand)]
enum LadderAction {
    /// Print ladder state as JSON.
    Show {
        #[arg(long)]
        state: PathBuf,

        /// Only this key (SYMBOL@tf).
        #[arg(long)]
        key: Option<SeriesKey>,
    },
    /// Reset ladder state to stage 0.
    Reset {
        #[arg(long)]
        state: PathBuf,

        /// Only this key (SYMBOL@tf); every key when absent.
        #[arg(long)]
        key: Option<SeriesKey>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json).context("failed to initialize logging")?;

    match cli.command {
        Commands::Scan {
            config,
            serial,
            as_of,
            json,
        } => run_scan(&config, serial, as_of.as_deref(), json),
        Commands::Evaluate {
            symbol,
            timeframe,
            bars,
            daily,
            state,
            config,
            as_of,
        } => run_evaluate(
            SeriesKey::new(symbol, timeframe),
            &bars,
            daily.as_deref(),
            state.as_deref(),
            config.as_deref(),
            as_of.as_deref(),
        ),
        Commands::Synthetic {
            symbol,
            timeframe,
            bars,
            seed,
            start,
            out,
        } => run_synthetic(SeriesKey::new(symbol, timeframe), bars, seed, start.as_deref(), &out),
        Commands::Ladder { action } => match action {
            LadderAction::Show { state, key } => run_ladder_show(&state, key.as_ref()),
            LadderAction::Reset { state, key } => run_ladder_reset(&state, key.as_ref()),
        },
    }
}

fn parse_as_of(value: Option<&str>) -> Result<Option<NaiveDateTime>> {
    value
        .map(|s| parse_timestamp(s).with_context(|| format!("invalid timestamp '{s}'")))
        .transpose()
}

fn open_store(path: Option<&Path>) -> Result<LadderStore> {
    match path {
        Some(p) => LadderStore::open(p).with_context(|| format!("failed to open ladder state {}", p.display())),
        None => Ok(LadderStore::in_memory()),
    }
}

fn run_scan(config_path: &Path, serial: bool, as_of: Option<&str>, json: bool) -> Result<()> {
    let mut cfg = ScanConfig::load(config_path)?;
    if serial {
        cfg.parallel = false;
    }
    if let Some(t) = parse_as_of(as_of)? {
        cfg.as_of = Some(t);
    }
    let keys = cfg.keys()?;

    let pipeline = Pipeline::new(cfg.fusion.clone());
    let source = source_for(&cfg);
    let store = open_store(cfg.state_path.as_deref())?;
    let report = Scanner::new(&pipeline, source.as_ref(), &store, ScanOptions::from(&cfg)).scan(&keys)?;

    if store.path().is_some() {
        store.save()?;
    }
    if let Some(path) = &cfg.history_path {
        let entries: Vec<HistoryEntry> = report
            .outcomes
            .iter()
            .map(|o| HistoryEntry::from(&o.evaluation))
            .collect();
        let written = RecordHistory::new(path)
            .append_all(&entries)
            .with_context(|| format!("failed to append history {}", path.display()))?;
        info!(path = %path.display(), written, "history appended");
    }

    if json {
        print_jsonl(&report)?;
    } else {
        print_table(&report);
    }
    Ok(())
}

fn run_evaluate(
    key: SeriesKey,
    bars_path: &Path,
    daily_path: Option<&Path>,
    state_path: Option<&Path>,
    config_path: Option<&Path>,
    as_of: Option<&str>,
) -> Result<()> {
    let cfg = match config_path {
        Some(p) => ScanConfig::load(p)?,
        None => ScanConfig::default(),
    };

    let mut source = MemorySource::new();
    source.insert(key.clone(), read_bars_csv(&key, bars_path)?);
    if let Some(p) = daily_path {
        if !key.timeframe.is_intraday() {
            bail!("--daily only applies to intraday timeframes");
        }
        let daily_key = SeriesKey::new(key.symbol.clone(), Timeframe::Daily);
        source.insert(daily_key.clone(), read_bars_csv(&daily_key, p)?);
    }

    let pipeline = Pipeline::new(cfg.fusion.clone());
    let store = open_store(state_path)?;
    let opts = ScanOptions {
        parallel: false,
        as_of: parse_as_of(as_of)?,
        ..ScanOptions::from(&cfg)
    };
    let outcome = Scanner::new(&pipeline, &source, &store, opts).scan_one(&key);
    if store.path().is_some() {
        store.save()?;
    }

    println!("{}", serde_json::to_string_pretty(&outcome.evaluation.record)?);
    println!("fingerprint: {}", outcome.evaluation.fingerprint);
    Ok(())
}

fn run_synthetic(key: SeriesKey, n: usize, seed: u64, start: Option<&str>, out: &Path) -> Result<()> {
    let start = match start {
        Some(s) => parse_timestamp(s).with_context(|| format!("invalid start '{s}'"))?,
        None => ScanConfig::default().synthetic.start,
    };
    let bars = generate_bars(&key, n, start, seed);
    write_bars_csv(out, &bars)?;
    println!("wrote {} synthetic bars for {key} to {}", bars.len(), out.display());
    Ok(())
}

fn run_ladder_show(state: &Path, key: Option<&SeriesKey>) -> Result<()> {
    let store = LadderStore::open(state)?;
    for err in store.recovered() {
        eprintln!("recovered: {err}");
    }
    match key {
        Some(k) => println!("{}", serde_json::to_string_pretty(&store.get(k))?),
        None => {
            let entries: std::collections::BTreeMap<String, _> = store
                .entries()
                .into_iter()
                .map(|(k, s)| (k.to_string(), s))
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}

fn run_ladder_reset(state: &Path, key: Option<&SeriesKey>) -> Result<()> {
    let store = LadderStore::open(state)?;
    match key {
        Some(k) => {
            store.reset(k);
            println!("reset {k}");
        }
        None => {
            store.reset_all();
            println!("reset {} keys", store.entries().len());
        }
    }
    store.save()?;
    Ok(())
}

fn print_jsonl(report: &ScanReport) -> Result<()> {
    for record in report.records() {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}

fn print_table(report: &ScanReport) {
    println!(
        "{:<18} {:<6} {:>6} {:<5} {:>5} {:<8} {:>5} {:<8} {}",
        "key", "action", "score", "struc", "conf", "trend", "stage", "validity", "reasons"
    );
    for outcome in &report.outcomes {
        let r: &OutputRecord = &outcome.evaluation.record;
        let structure = r.structure_type.map_or("-".to_string(), |s| s.code().to_string());
        let conf = r.structure_confidence.map_or("-".to_string(), |c| format!("{c:.2}"));
        let trend = r.trend_bias.map_or("-".to_string(), |b| b.to_string());
        let reasons: Vec<&str> = r.reason_codes();
        println!(
            "{:<18} {:<6} {:>6.2} {:<5} {:>5} {:<8} {:>5} {:<8} {}",
            outcome.key.to_string(),
            format!("{:?}", r.action).to_lowercase(),
            r.composite_score,
            structure,
            conf,
            trend,
            r.ladder_stage,
            format!("{:?}", r.validity_status).to_lowercase(),
            reasons.join(",")
        );
    }
    println!(
        "{} pairs, {} failed, {:.0} ms",
        report.outcomes.len(),
        report.failures(),
        report.elapsed.as_secs_f64() * 1000.0
    );
}
