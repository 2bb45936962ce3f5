//! Window feature extraction.
//!
//! `bars` is the bounded history ending at the snapshot's bar (the snapshot
//! bar is `bars.last()`). Every feature degrades to its neutral value when
//! the window is too short.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::candles::{detect_patterns, CandlePattern, PatternGroup};
use super::swing::SwingSummary;
use crate::config::FusionConfig;
use crate::domain::{Bar, IndicatorSnapshot};

/// OBV direction from the normalized slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObvTrend {
    Rising,
    Falling,
    #[default]
    Flat,
}

impl ObvTrend {
    /// Slopes inside `[-band, band]` are flat.
    pub fn from_slope(slope: f64, band: f64) -> Self {
        if slope > band {
            Self::Rising
        } else if slope < -band {
            Self::Falling
        } else {
            Self::Flat
        }
    }
}

/// Price/volume divergence at the edge of the lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Divergence {
    #[default]
    None,
    /// New closing high without OBV or volume confirmation.
    Bearish,
    /// New closing low without OBV or volume confirmation.
    Bullish,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowFeatures {
    pub bar_count: usize,
    pub swings: SwingSummary,

    /// Mean volume of the averaging window, excluding the current bar.
    pub volume_avg: f64,
    pub volume_spike: bool,
    pub volume_contraction: bool,
    /// Consecutive bars (ending at the current one) with lower volume than the bar before.
    pub volume_declining_bars: usize,

    pub wide_range: bool,
    pub wide_range_down_in_pullback: bool,

    /// Consecutive same-direction closes ending at the previous bar.
    pub run_length: usize,
    pub run_up: bool,

    pub obv_trend: ObvTrend,
    pub obv_falling_bars: usize,
    pub obv_rising_bars: usize,

    pub vwap_reclaimed: bool,
    pub cpr_reclaimed: bool,

    /// Consecutive lower closes ending at the current bar.
    pub pullback_bars: usize,

    pub patterns: BTreeSet<CandlePattern>,
    pub divergence: Divergence,
}

impl WindowFeatures {
    pub fn extract(bars: &[Bar], snapshot: &IndicatorSnapshot, cfg: &FusionConfig) -> Self {
        let fc = &cfg.features;
        let n = bars.len();
        let obv_trend = ObvTrend::from_slope(snapshot.obv_slope, cfg.structure.obv_flat_band);
        let Some(cur) = bars.last() else {
            return Self {
                obv_trend,
                ..Self::default()
            };
        };

        let prior = &bars[..n - 1];
        let avg_window = &prior[prior.len().saturating_sub(fc.volume_avg_window)..];
        let volume_avg = mean(avg_window.iter().map(|b| b.volume));
        let recent = &bars[n.saturating_sub(5)..];
        let recent_avg = mean(recent.iter().map(|b| b.volume));
        let volume_spike = volume_avg > 0.0 && cur.volume >= fc.volume_spike_mult * volume_avg;
        let volume_contraction =
            volume_avg > 0.0 && recent_avg <= fc.volume_contraction_ratio * volume_avg;

        let wide_threshold = fc.wide_range_atr_mult * snapshot.atr_intraday;
        let is_wide = |b: &Bar| snapshot.atr_intraday > 0.0 && b.range() > wide_threshold;
        let pullback = &bars[n.saturating_sub(fc.pullback_window.max(1))..];

        let (run_length, run_up) = run_ending_at(prior);
        let closes_up = streak(bars, |prev, b| b.close > prev.close && b.volume > 0.0);
        let closes_down = streak(bars, |prev, b| b.close < prev.close && b.volume > 0.0);

        Self {
            bar_count: n,
            swings: SwingSummary::from_bars(bars, fc.fractal_span),
            volume_avg,
            volume_spike,
            volume_contraction,
            volume_declining_bars: streak(bars, |prev, b| b.volume < prev.volume),
            wide_range: is_wide(cur),
            wide_range_down_in_pullback: pullback.iter().any(|b| is_wide(b) && b.is_down()),
            run_length,
            run_up,
            obv_trend,
            obv_falling_bars: closes_down,
            obv_rising_bars: closes_up,
            vwap_reclaimed: reclaimed(bars, snapshot.vwap, fc.reclaim_lookback),
            cpr_reclaimed: reclaimed(bars, snapshot.cpr.tc, fc.reclaim_lookback),
            pullback_bars: streak(bars, |prev, b| b.close < prev.close),
            patterns: detect_patterns(bars, fc.doji_body_ratio),
            divergence: divergence(
                bars,
                fc.divergence_lookback,
                fc.divergence_volume_decline_bars,
            ),
        }
    }

    pub fn has_group(&self, group: PatternGroup) -> bool {
        self.patterns.iter().any(|p| p.group() == group)
    }

    pub fn extended_run(&self, min_bars: usize) -> bool {
        min_bars > 0 && self.run_length >= min_bars
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Number of consecutive bars ending at the last bar for which `pred(prev, bar)` holds.
fn streak(bars: &[Bar], pred: impl Fn(&Bar, &Bar) -> bool) -> usize {
    bars.windows(2).rev().take_while(|w| pred(&w[0], &w[1])).count()
}

/// Length and direction of the close-to-close run ending at the last bar of `bars`.
fn run_ending_at(bars: &[Bar]) -> (usize, bool) {
    let up = streak(bars, |prev, b| b.close > prev.close);
    if up > 0 {
        return (up, true);
    }
    (streak(bars, |prev, b| b.close < prev.close), false)
}

/// The current bar closes above `level` after trading below it within the lookback:
/// either a prior bar closed below, or the current bar's low dipped below.
fn reclaimed(bars: &[Bar], level: f64, lookback: usize) -> bool {
    let Some((cur, prior)) = bars.split_last() else {
        return false;
    };
    if !level.is_finite() || cur.close <= level {
        return false;
    }
    let window = &prior[prior.len().saturating_sub(lookback)..];
    cur.low < level || window.iter().any(|b| b.close < level)
}

fn divergence(bars: &[Bar], lookback: usize, volume_decline_bars: usize) -> Divergence {
    let window = &bars[bars.len().saturating_sub(lookback.max(2))..];
    let Some(cur) = window.last() else {
        return Divergence::None;
    };
    if window.len() < 3 {
        return Divergence::None;
    }

    // OBV relative to the window start; only its shape matters here.
    let mut obv = Vec::with_capacity(window.len());
    let mut acc = 0.0;
    obv.push(acc);
    for w in window.windows(2) {
        if w[1].close > w[0].close {
            acc += w[1].volume;
        } else if w[1].close < w[0].close {
            acc -= w[1].volume;
        }
        obv.push(acc);
    }
    let obv_now = acc;
    let obv_max = obv.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let obv_min = obv.iter().copied().fold(f64::INFINITY, f64::min);
    let volume_fading =
        volume_decline_bars > 0 && streak(window, |prev, b| b.volume < prev.volume) >= volume_decline_bars;

    let prior = &window[..window.len() - 1];
    let new_high = prior.iter().all(|b| cur.close >= b.close);
    let new_low = prior.iter().all(|b| cur.close <= b.close);

    if new_high && (obv_now < obv_max || volume_fading) {
        Divergence::Bearish
    } else if new_low && (obv_now > obv_min || volume_fading) {
        Divergence::Bullish
    } else {
        Divergence::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::test_support::snapshot;
    use crate::indicators::make_bars;

    fn with_volumes(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
        let mut bars = make_bars(closes);
        for (bar, &v) in bars.iter_mut().zip(volumes) {
            bar.volume = v;
        }
        bars
    }

    #[test]
    fn empty_window_is_neutral() {
        let f = WindowFeatures::extract(&[], &snapshot(), &FusionConfig::default());
        assert_eq!(f.bar_count, 0);
        assert_eq!(f.divergence, Divergence::None);
        // slope 0.3 over the 0.1 flat band
        assert_eq!(f.obv_trend, ObvTrend::Rising);
    }

    #[test]
    fn volume_spike_and_streaks() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64 * 0.1).collect();
        let mut volumes = vec![1000.0; 25];
        volumes[24] = 2500.0;
        let bars = with_volumes(&closes, &volumes);
        let f = WindowFeatures::extract(&bars, &snapshot(), &FusionConfig::default());
        assert!(f.volume_spike);
        assert!(!f.volume_contraction);
        assert_eq!(f.obv_rising_bars, 24);
        assert_eq!(f.pullback_bars, 0);
        assert_eq!(f.run_length, 23);
        assert!(f.run_up);
    }

    #[test]
    fn volume_contraction_detected() {
        let closes = vec![100.0; 25];
        let mut volumes = vec![1000.0; 25];
        for v in volumes.iter_mut().skip(20) {
            *v = 500.0;
        }
        let bars = with_volumes(&closes, &volumes);
        let f = WindowFeatures::extract(&bars, &snapshot(), &FusionConfig::default());
        assert!(f.volume_contraction);
        assert!(!f.volume_spike);
    }

    #[test]
    fn pullback_streak_counts_lower_closes() {
        let bars = make_bars(&[100.0, 101.0, 102.0, 101.5, 101.0]);
        let f = WindowFeatures::extract(&bars, &snapshot(), &FusionConfig::default());
        assert_eq!(f.pullback_bars, 2);
    }

    #[test]
    fn vwap_reclaim_after_close_below() {
        let mut snap = snapshot();
        snap.vwap = 100.0;
        let bars = make_bars(&[101.0, 99.5, 99.0, 100.5]);
        let f = WindowFeatures::extract(&bars, &snap, &FusionConfig::default());
        assert!(f.vwap_reclaimed);

        let above = make_bars(&[103.0, 103.5, 104.0, 104.5]);
        let f = WindowFeatures::extract(&above, &snap, &FusionConfig::default());
        assert!(!f.vwap_reclaimed);
    }

    #[test]
    fn bearish_divergence_on_fading_volume_at_high() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let mut volumes = vec![1000.0; 20];
        volumes[17] = 900.0;
        volumes[18] = 800.0;
        volumes[19] = 700.0;
        let bars = with_volumes(&closes, &volumes);
        let f = WindowFeatures::extract(&bars, &snapshot(), &FusionConfig::default());
        assert_eq!(f.divergence, Divergence::Bearish);
    }

    #[test]
    fn confirmed_high_has_no_divergence() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let bars = make_bars(&closes);
        let f = WindowFeatures::extract(&bars, &snapshot(), &FusionConfig::default());
        assert_eq!(f.divergence, Divergence::None);
    }

    #[test]
    fn wide_range_down_bar_in_pullback_window() {
        let mut bars = make_bars(&[100.0, 101.0, 102.0, 98.0, 98.5]);
        // atr_intraday 2.0, threshold 3.0; bar 3 range is 6.0
        bars[3].high = 102.5;
        bars[3].low = 97.0;
        let f = WindowFeatures::extract(&bars, &snapshot(), &FusionConfig::default());
        assert!(f.wide_range_down_in_pullback);
        assert!(!f.wide_range);
    }
}
