//! End-to-end scenarios through `Pipeline::evaluate`.
//!
//! A: gap-up momentum with volume that peaks and fades at the high.
//! B: price chopping strictly inside the CPR band.
//! C: price stretched above VWAP.
//! D: an active stage-2 ladder invalidated by a stop-loss breach.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;

use fuselab_core::domain::{Bar, CprLevels, IndicatorSnapshot, Timeframe, TradeDirection};
use fuselab_core::engines::{
    Action, Episode, Ladder, LadderState, StructureType, TargetLevel, ValidityReason,
    ValidityStatus,
};
use fuselab_core::features::Divergence;
use fuselab_core::indicators::{build_snapshot, SnapshotOptions};
use fuselab_core::{EvaluationInput, HigherFrames, OutputRecord, Pipeline};

fn day(i: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(i)
}

fn bar(i: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
    Bar {
        timestamp: day(i),
        open,
        high,
        low,
        close,
        volume,
    }
}

/// 220 daily bars of a steady, choppy uptrend from 7000.
fn base_bars() -> Vec<Bar> {
    let mut bars = Vec::new();
    let mut prev = 7000.0;
    for i in 0..220 {
        let close = 7000.0 + 5.3 * i as f64 - if i % 2 == 1 { 8.0 } else { 0.0 };
        let open = prev;
        bars.push(bar(i, open, open.max(close) + 10.0, open.min(close) - 10.0, close, 15_000.0));
        prev = close;
    }
    bars
}

fn evaluate_series(bars: &[Bar], from: usize) -> Vec<OutputRecord> {
    let pipeline = Pipeline::default();
    let opts = SnapshotOptions::default();
    let mut ladder = LadderState::default();
    let mut records = Vec::new();
    for t in from..bars.len() {
        let window = &bars[..=t];
        let snapshot = build_snapshot("NIFTY", Timeframe::Daily, window, None, &opts).unwrap();
        let input = EvaluationInput {
            as_of: snapshot.timestamp,
            snapshot,
            bars: window.to_vec(),
            higher: HigherFrames::default(),
        };
        let eval = pipeline.evaluate(&input, &ladder);
        assert!(eval.error.is_none(), "bar {t}: {:?}", eval.error);
        ladder = eval.ladder;
        records.push(eval.record);
    }
    records
}

#[test]
fn scenario_a_gap_up_momentum_fades_into_watch() {
    let mut bars = base_bars();
    let base_len = bars.len();

    // rally: gap open at 8172.5, fifteen up days, volume 18436 -> 25574
    let mut prev = 8172.5;
    for k in 0..15 {
        let close = 8185.0 + 25.0 * k as f64;
        let volume = 18_436.0 + (25_574.0 - 18_436.0) * k as f64 / 14.0;
        let high = if k == 14 { 8577.0 } else { close + 10.0 };
        bars.push(bar((base_len + k) as i64, prev, high, prev - 10.0, close, volume));
        prev = close;
    }
    // fade: marginal new closing highs on shrinking volume
    for (d, volume) in [24_000.0, 22_000.0, 20_000.0, 18_000.0, 16_000.0].into_iter().enumerate() {
        let close = 8540.0 + 5.0 * d as f64;
        bars.push(bar((base_len + 15 + d) as i64, prev, close + 10.0, prev - 10.0, close, volume));
        prev = close;
    }

    let records = evaluate_series(&bars, base_len);
    assert_eq!(records.len(), 20);

    // volume still rising: long-side structure
    for rec in &records[13..15] {
        let kind = rec.structure_type.unwrap();
        assert!(
            matches!(kind, StructureType::Sps | StructureType::Cps),
            "expected SPS/CPS during the advance, got {kind}"
        );
    }

    // volume fading at the high: divergence, never a fresh Buy
    for rec in &records[17..20] {
        assert_eq!(rec.obv_divergence, Some(Divergence::Bearish));
        assert_ne!(rec.validity_status, ValidityStatus::Buyable);
        assert_ne!(rec.action, Action::Buy);
    }
}

fn snapshot_at(close: f64) -> IndicatorSnapshot {
    IndicatorSnapshot {
        symbol: "NIFTY".into(),
        timeframe: Timeframe::Daily,
        timestamp: day(300),
        open: close - 0.3,
        high: close + 0.8,
        low: close - 0.6,
        close,
        volume: 12_000.0,
        ema20: 99.0,
        ema50: 97.0,
        ema200: 90.0,
        rsi14: 58.0,
        atr_daily: 2.0,
        atr_intraday: 2.0,
        atr_slope: 0.0,
        obv: 40_000.0,
        obv_slope: 0.3,
        vwap: 99.2,
        cpr: CprLevels {
            pivot: 98.5,
            tc: 98.7,
            bc: 98.3,
        },
        circuit: None,
        liquid: true,
    }
}

/// Gently alternating bars around 100 ending just before `day(300)`.
fn chop_bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = if i % 2 == 0 { 99.9 } else { 100.1 };
            bar(300 - n as i64 + i as i64 + 1, 100.0, 100.8, 99.4, close, 10_000.0)
        })
        .collect()
}

fn input(snapshot: IndicatorSnapshot) -> EvaluationInput {
    EvaluationInput {
        as_of: snapshot.timestamp,
        snapshot,
        bars: chop_bars(220),
        higher: HigherFrames::default(),
    }
}

#[test]
fn scenario_b_inside_cpr_chop_is_avoid() {
    let pipeline = Pipeline::default();
    let mut ladder = LadderState::default();
    for i in 0..10 {
        let close = if i % 2 == 0 { 99.8 } else { 100.2 };
        let mut snap = snapshot_at(close);
        snap.timestamp = day(300 + i);
        snap.cpr = CprLevels {
            pivot: 100.0,
            tc: 100.4,
            bc: 99.6,
        };
        snap.vwap = 100.0;
        let mut inp = input(snap);
        inp.as_of = inp.snapshot.timestamp;
        let eval = pipeline.evaluate(&inp, &ladder);
        assert_eq!(eval.record.validity_status, ValidityStatus::Avoid);
        assert!(eval.record.validity_reasons.contains(&ValidityReason::InsideCpr));
        assert_eq!(eval.record.action, Action::Avoid);
        ladder = eval.ladder;
    }
    assert_eq!(ladder, LadderState::default());
}

#[test]
fn scenario_c_overextension_is_avoid() {
    let mut snap = snapshot_at(100.0);
    snap.vwap = 100.0 - 2.2 * snap.atr_intraday;
    let eval = Pipeline::default().evaluate(&input(snap), &LadderState::default());
    assert_eq!(eval.record.action, Action::Avoid);
    assert!(eval.record.validity_reasons.contains(&ValidityReason::Overextended));
}

#[test]
fn scenario_d_stop_breach_resets_stage_two_ladder() {
    let stage_two = LadderState {
        stage: 2,
        hits: BTreeSet::from([TargetLevel::T1, TargetLevel::T2]),
        episode: Some(Episode {
            entry: 100.0,
            opened_at: day(290),
            direction: TradeDirection::Long,
            static_ladder: Ladder {
                targets: [101.0, 102.0, 103.0],
                stop_loss: 98.0,
            },
            dynamic_ladder: Ladder {
                targets: [100.7, 101.7, 102.7],
                stop_loss: 98.6,
            },
            ref_interval: Some(Timeframe::Daily),
            ref_ladder: None,
        }),
    };
    assert!(stage_two.validate().is_ok());

    let eval = Pipeline::default().evaluate(&input(snapshot_at(97.0)), &stage_two);
    assert!(eval.record.validity_reasons.contains(&ValidityReason::SlBreach));
    assert_eq!(eval.record.action, Action::Avoid);
    assert_eq!(eval.record.ladder_stage, 0);
    assert!(eval.record.ladder_hits.is_empty());
    assert_eq!(eval.ladder, LadderState::default());
}

#[test]
fn clean_setup_buys_and_opens_a_ladder() {
    let eval = Pipeline::default().evaluate(&input(snapshot_at(100.0)), &LadderState::default());
    // flat chop has no confirmed swings and no VWAP reclaim: 5 of 7 conditions
    assert_eq!(eval.record.structure_type, Some(StructureType::Cps));
    assert_eq!(eval.record.validity_status, ValidityStatus::Buyable);
    assert_eq!(eval.record.action, Action::Buy);
    assert!(eval.ladder.is_active());
    assert_eq!(eval.ladder.stage, 0);
    assert_eq!(eval.record.ladder_stage, 0);
}
