//! Batch scanning: one evaluation per (symbol, timeframe) pair.
//!
//! Pairs fan out over rayon. Each pair runs under its ladder-store key lock:
//! read prior state → load data → evaluate → commit. A pair that fails in
//! any way becomes an Avoid record with the matching reason; nothing a
//! single pair does aborts the batch.
//!
//! Without a configured `as_of`, staleness is judged against a batch clock:
//! the latest last-bar timestamp among the scanned pairs of the same
//! timeframe. A series whose feed stopped is stale relative to its peers.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use fuselab_core::domain::{Bar, SeriesKey, Timeframe};
use fuselab_core::engines::{Action, LadderState};
use fuselab_core::indicators::{build_snapshot, resample, SnapshotOptions};
use fuselab_core::{
    Evaluation, EvaluationError, EvaluationInput, FrameData, HigherFrames, OutputRecord, Pipeline,
};

use crate::config::ScanConfig;
use crate::data_loader::MarketDataSource;
use crate::ladder_store::LadderStore;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to build scan thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    pub parallel: bool,
    pub threads: Option<usize>,
    pub as_of: Option<NaiveDateTime>,
    pub higher_frames: bool,
    pub snapshot: SnapshotOptions,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            threads: None,
            as_of: None,
            higher_frames: true,
            snapshot: SnapshotOptions::default(),
        }
    }
}

impl From<&ScanConfig> for ScanOptions {
    fn from(cfg: &ScanConfig) -> Self {
        Self {
            parallel: cfg.parallel,
            threads: cfg.threads,
            as_of: cfg.as_of,
            higher_frames: cfg.higher_frames,
            snapshot: cfg.snapshot.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub key: SeriesKey,
    pub evaluation: Evaluation,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    /// One outcome per distinct pair, in request order.
    pub outcomes: Vec<ScanOutcome>,
    pub elapsed: Duration,
}

impl ScanReport {
    pub fn records(&self) -> impl Iterator<Item = &OutputRecord> {
        self.outcomes.iter().map(|o| &o.evaluation.record)
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.evaluation.error.is_some())
            .count()
    }

    pub fn count(&self, action: Action) -> usize {
        self.records().filter(|r| r.action == action).count()
    }
}

pub struct Scanner<'a> {
    pipeline: &'a Pipeline,
    source: &'a dyn MarketDataSource,
    store: &'a LadderStore,
    opts: ScanOptions,
}

impl<'a> Scanner<'a> {
    pub fn new(
        pipeline: &'a Pipeline,
        source: &'a dyn MarketDataSource,
        store: &'a LadderStore,
        opts: ScanOptions,
    ) -> Self {
        Self {
            pipeline,
            source,
            store,
            opts,
        }
    }

    /// Evaluate every distinct pair. Repeated pairs are evaluated once.
    pub fn scan(&self, pairs: &[SeriesKey]) -> Result<ScanReport, ScanError> {
        let started = Instant::now();
        let mut seen = BTreeSet::new();
        let keys: Vec<&SeriesKey> = pairs
            .iter()
            .filter(|key| {
                let first = seen.insert(*key);
                if !first {
                    warn!(%key, "duplicate pair skipped");
                }
                first
            })
            .collect();

        let clock = self.batch_clock(&keys);
        let outcomes: Vec<ScanOutcome> = if self.opts.parallel {
            let run = || -> Vec<ScanOutcome> {
                keys.par_iter()
                    .map(|key| self.scan_at(key, clock.get(&key.timeframe).copied()))
                    .collect()
            };
            match self.opts.threads {
                Some(n) => rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()?
                    .install(run),
                None => run(),
            }
        } else {
            keys.iter()
                .map(|key| self.scan_at(key, clock.get(&key.timeframe).copied()))
                .collect()
        };

        let report = ScanReport {
            outcomes,
            elapsed: started.elapsed(),
        };
        info!(
            pairs = report.outcomes.len(),
            failures = report.failures(),
            buy = report.count(Action::Buy),
            add = report.count(Action::Add),
            avoid = report.count(Action::Avoid),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "scan complete"
        );
        Ok(report)
    }

    /// Evaluate one pair and commit its ladder state.
    ///
    /// Without `as_of` a lone pair is its own clock, so only the
    /// configured staleness bound against its last bar applies.
    pub fn scan_one(&self, key: &SeriesKey) -> ScanOutcome {
        self.scan_at(key, None)
    }

    /// Latest last-bar timestamp per timeframe across `keys`.
    ///
    /// Keys whose source fails or panics contribute nothing.
    fn batch_clock(&self, keys: &[&SeriesKey]) -> BTreeMap<Timeframe, NaiveDateTime> {
        let mut clock = BTreeMap::new();
        if self.opts.as_of.is_some() {
            return clock;
        }
        for key in keys {
            if let Some(ts) = self.latest_timestamp(key) {
                clock
                    .entry(key.timeframe)
                    .and_modify(|t: &mut NaiveDateTime| *t = (*t).max(ts))
                    .or_insert(ts);
            }
        }
        clock
    }

    fn latest_timestamp(&self, key: &SeriesKey) -> Option<NaiveDateTime> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.source.latest_timestamp(key))) {
            Ok(Ok(ts)) => ts,
            Ok(Err(e)) => {
                debug!(%key, error = %e, "no last bar for batch clock");
                None
            }
            Err(_) => None,
        }
    }

    fn scan_at(&self, key: &SeriesKey, clock: Option<NaiveDateTime>) -> ScanOutcome {
        let evaluation = self.store.update(key, |prior| {
            let run = AssertUnwindSafe(|| self.evaluate(key, clock, prior));
            let eval = match panic::catch_unwind(run) {
                Ok(eval) => eval,
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    let ts = self
                        .opts
                        .as_of
                        .or_else(|| self.latest_timestamp(key))
                        .or(clock)
                        .unwrap_or_default();
                    self.pipeline.unavailable(
                        &key.symbol,
                        key.timeframe,
                        ts,
                        EvaluationError::Fault(msg),
                        prior,
                    )
                }
            };
            (eval.ladder.clone(), eval)
        });
        if let Some(err) = &evaluation.error {
            warn!(%key, error = %err, "pair evaluated as avoid");
        }
        ScanOutcome {
            key: key.clone(),
            evaluation,
        }
    }

    fn evaluate(
        &self,
        key: &SeriesKey,
        clock: Option<NaiveDateTime>,
        prior: &LadderState,
    ) -> Evaluation {
        let as_of = self.opts.as_of;
        let fallback_ts = as_of.or(clock).unwrap_or_default();
        let unavailable = |ts: NaiveDateTime, err: EvaluationError| {
            self.pipeline
                .unavailable(&key.symbol, key.timeframe, ts, err, prior)
        };

        let need = self.pipeline.config().lookback.min_bars(key.timeframe);
        let bars = match self.source.historical_bars(key, as_of, need) {
            Ok(bars) => bars,
            Err(e) => {
                return unavailable(
                    fallback_ts,
                    EvaluationError::DataUnavailable {
                        detail: e.to_string(),
                    },
                )
            }
        };
        if bars.len() < need {
            let ts = bars.last().map_or(fallback_ts, |b| b.timestamp);
            return unavailable(
                ts,
                EvaluationError::MissingData {
                    timeframe: key.timeframe,
                    have: bars.len(),
                    need,
                },
            );
        }

        let snapshot = match self.source.indicator_snapshot(key, as_of, &self.opts.snapshot) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let ts = bars.last().map_or(fallback_ts, |b| b.timestamp);
                return unavailable(
                    ts,
                    EvaluationError::DataUnavailable {
                        detail: e.to_string(),
                    },
                );
            }
        };

        let higher = if self.opts.higher_frames {
            self.higher_frames(key, snapshot.timestamp)
        } else {
            HigherFrames::default()
        };
        let input = EvaluationInput {
            as_of: as_of.or(clock).unwrap_or(snapshot.timestamp),
            snapshot,
            bars,
            higher,
        };
        self.pipeline.evaluate(&input, prior)
    }

    /// Daily, Weekly and Monthly frames slower than `key`'s timeframe.
    ///
    /// Built by resampling the key's own series, except that an intraday key
    /// takes its daily frame from the source's completed daily sessions when
    /// it has them.
    fn higher_frames(&self, key: &SeriesKey, at: NaiveDateTime) -> HigherFrames {
        let mut frames = HigherFrames::default();
        let primary = match self.source.series(key) {
            Ok(bars) => bars.into_iter().filter(|b| b.timestamp <= at).collect::<Vec<_>>(),
            Err(e) => {
                debug!(%key, error = %e, "no series for higher frames");
                return frames;
            }
        };
        let slower = [Timeframe::Daily, Timeframe::Weekly, Timeframe::Monthly]
            .into_iter()
            .filter(|tf| tf.nominal_duration() > key.timeframe.nominal_duration());
        for tf in slower {
            let bars = if tf == Timeframe::Daily {
                self.source
                    .series(&SeriesKey::new(key.symbol.clone(), Timeframe::Daily))
                    .ok()
                    .map(|d| {
                        d.into_iter()
                            .filter(|b| b.timestamp.date() < at.date())
                            .collect::<Vec<_>>()
                    })
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| resample(&primary, tf))
            } else {
                resample(&primary, tf)
            };
            let frame = self.frame(key, tf, bars);
            match tf {
                Timeframe::Daily => frames.daily = frame,
                Timeframe::Weekly => frames.weekly = frame,
                _ => frames.monthly = frame,
            }
        }
        frames
    }

    fn frame(&self, key: &SeriesKey, tf: Timeframe, mut bars: Vec<Bar>) -> Option<FrameData> {
        let snapshot = match build_snapshot(&key.symbol, tf, &bars, None, &self.opts.snapshot) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(%key, timeframe = %tf, error = %e, "higher frame unavailable");
                return None;
            }
        };
        let keep = self.pipeline.config().lookback.min_bars(tf);
        let start = bars.len().saturating_sub(keep);
        Some(FrameData {
            snapshot,
            bars: bars.split_off(start),
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic during evaluation".to_string()
    }
}
