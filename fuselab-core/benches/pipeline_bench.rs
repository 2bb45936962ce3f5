//! Criterion benchmarks for FuseLab hot paths.
//!
//! Benchmarks:
//! 1. Indicator precompute (EMA, ATR, RSI, OBV over a full window)
//! 2. Snapshot build (all indicators for the last bar)
//! 3. Single evaluation (features, engines, gate, ladder, decision)
//! 4. Rolling evaluation (one evaluation per bar, ladder carried forward)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use fuselab_core::domain::{Bar, Timeframe};
use fuselab_core::engines::LadderState;
use fuselab_core::indicators::{build_snapshot, Atr, Ema, Indicator, Obv, Rsi, SnapshotOptions};
use fuselab_core::{EvaluationInput, HigherFrames, Pipeline};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    let base = chrono::NaiveDate::from_ymd_opt(2020, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + i as f64 * 0.05 + (i as f64 * 0.1).sin() * 10.0;
            let open = close - 0.3;
            Bar {
                timestamp: base + chrono::Duration::days(i as i64),
                open,
                high: close + 1.5,
                low: open - 1.5,
                close,
                volume: 1_000_000.0 + (i % 500) as f64 * 1000.0,
            }
        })
        .collect()
}

fn make_input(bars: &[Bar]) -> EvaluationInput {
    let snapshot = build_snapshot("BENCH", Timeframe::Daily, bars, None, &SnapshotOptions::default())
        .expect("bench bars build a snapshot");
    EvaluationInput {
        as_of: snapshot.timestamp,
        snapshot,
        bars: bars.to_vec(),
        higher: HigherFrames::default(),
    }
}

// ── 1. Indicator precompute ──────────────────────────────────────────

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicator_precompute");
    let indicators: Vec<Box<dyn Indicator>> = vec![
        Box::new(Ema::new(20)),
        Box::new(Ema::new(200)),
        Box::new(Atr::new(14)),
        Box::new(Rsi::new(14)),
        Box::new(Obv),
    ];
    for n in [250usize, 1000] {
        let bars = make_bars(n);
        group.bench_with_input(BenchmarkId::new("five_indicators", n), &bars, |b, bars| {
            b.iter(|| {
                for ind in &indicators {
                    black_box(ind.compute(black_box(bars)));
                }
            });
        });
    }
    group.finish();
}

// ── 2. Snapshot build ────────────────────────────────────────────────

fn bench_snapshot(c: &mut Criterion) {
    let bars = make_bars(250);
    let opts = SnapshotOptions::default();
    c.bench_function("build_snapshot_250", |b| {
        b.iter(|| build_snapshot("BENCH", Timeframe::Daily, black_box(&bars), None, &opts))
    });
}

// ── 3. Single evaluation ─────────────────────────────────────────────

fn bench_evaluate(c: &mut Criterion) {
    let pipeline = Pipeline::default();
    let input = make_input(&make_bars(250));
    let prior = LadderState::default();
    c.bench_function("evaluate_250", |b| {
        b.iter(|| pipeline.evaluate(black_box(&input), &prior))
    });
}

// ── 4. Rolling evaluation ────────────────────────────────────────────

fn bench_rolling(c: &mut Criterion) {
    let pipeline = Pipeline::default();
    let bars = make_bars(320);
    let inputs: Vec<EvaluationInput> = (220..=bars.len()).map(|end| make_input(&bars[..end])).collect();
    c.bench_function("rolling_100_bars", |b| {
        b.iter(|| {
            let mut state = LadderState::default();
            for input in &inputs {
                state = pipeline.evaluate(input, &state).ladder;
            }
            black_box(state)
        })
    });
}

criterion_group!(benches, bench_indicators, bench_snapshot, bench_evaluate, bench_rolling);
criterion_main!(benches);
