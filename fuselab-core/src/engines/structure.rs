//! StructureClassifier: SPS / CPS / MCS / RPS with a bounded confidence.
//!
//! Categories are tried in priority order SPS → CPS → MCS → RPS and the first
//! full match wins. When nothing matches, the lowest-confidence applicable
//! category is assigned (RPS if enough of its conditions hold, else MCS).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::StructureConfig;
use crate::domain::IndicatorSnapshot;
use crate::features::{ObvTrend, WindowFeatures};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    /// Strong Pullback Support.
    Sps,
    /// Clean Pullback Support.
    Cps,
    /// Moderate Compression Structure.
    Mcs,
    /// Reversal Pullback Structure.
    Rps,
}

impl StructureType {
    /// Confidence band the raw score is mapped into.
    pub fn confidence_range(self) -> (f64, f64) {
        match self {
            Self::Sps => (0.80, 1.00),
            Self::Cps => (0.55, 0.75),
            Self::Mcs => (0.35, 0.55),
            Self::Rps => (0.15, 0.40),
        }
    }

    pub fn is_long_setup(self) -> bool {
        matches!(self, Self::Sps | Self::Cps)
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Sps => "SPS",
            Self::Cps => "CPS",
            Self::Mcs => "MCS",
            Self::Rps => "RPS",
        }
    }
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The seven SPS conditions; CPS is a majority of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpsConditions {
    pub higher_low: bool,
    pub obv_rising: bool,
    pub within_ema_band: bool,
    pub vwap_reclaimed: bool,
    pub rsi_strong: bool,
    pub ema_trend_bullish: bool,
    pub no_wide_range_down: bool,
}

impl SpsConditions {
    pub fn count(&self) -> usize {
        [
            self.higher_low,
            self.obv_rising,
            self.within_ema_band,
            self.vwap_reclaimed,
            self.rsi_strong,
            self.ema_trend_bullish,
            self.no_wide_range_down,
        ]
        .iter()
        .filter(|&&c| c)
        .count()
    }

    pub fn all(&self) -> bool {
        self.count() == 7
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpsConditions {
    pub lower_high_in_downtrend: bool,
    pub obv_falling: bool,
    pub below_vwap: bool,
    pub weak_rsi: bool,
    pub wide_range_down: bool,
}

impl RpsConditions {
    pub fn count(&self) -> usize {
        [
            self.lower_high_in_downtrend,
            self.obv_falling,
            self.below_vwap,
            self.weak_rsi,
            self.wide_range_down,
        ]
        .iter()
        .filter(|&&c| c)
        .count()
    }

    pub fn all(&self) -> bool {
        self.count() == 5
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureAssessment {
    pub structure_type: StructureType,
    /// In [0, 1], inside the category's confidence band.
    pub confidence: f64,
    /// Unmapped weighted score in [0, 1].
    pub raw_confidence: f64,
    pub micro_pullback: bool,
    pub retesting: bool,
    /// No category fully matched.
    pub fallback: bool,
    pub sps: SpsConditions,
    pub rps: RpsConditions,
}

#[derive(Debug, Clone, Default)]
pub struct StructureClassifier {
    cfg: StructureConfig,
}

impl StructureClassifier {
    pub fn new(cfg: StructureConfig) -> Self {
        Self { cfg }
    }

    pub fn classify(&self, snap: &IndicatorSnapshot, features: &WindowFeatures) -> StructureAssessment {
        let cfg = &self.cfg;
        let close = snap.close;
        let ema_bullish = close > snap.ema50 && snap.ema20 > snap.ema50;
        let ema_bearish = close < snap.ema50 && snap.ema20 < snap.ema50;

        let band = cfg.ema_band_atr_mult * snap.atr_intraday;
        let near_ema = (close - snap.ema20).abs() <= band || (close - snap.ema50).abs() <= band;
        let below_both = close < snap.ema20 && close < snap.ema50;

        let sps = SpsConditions {
            higher_low: features.swings.higher_low(),
            obv_rising: features.obv_trend == ObvTrend::Rising,
            within_ema_band: near_ema && !below_both,
            vwap_reclaimed: features.vwap_reclaimed,
            rsi_strong: snap.rsi14 >= cfg.sps_rsi_min,
            ema_trend_bullish: ema_bullish,
            no_wide_range_down: !features.wide_range_down_in_pullback,
        };
        let rps = RpsConditions {
            lower_high_in_downtrend: features.swings.lower_high() && ema_bearish,
            obv_falling: features.obv_trend == ObvTrend::Falling,
            below_vwap: close < snap.vwap,
            weak_rsi: snap.rsi14 < cfg.rps_rsi_max,
            wide_range_down: features.wide_range_down_in_pullback,
        };

        let compressed = snap.cpr.width_pct() <= cfg.mcs_cpr_width_max_pct
            && ema_spread_pct(snap) <= cfg.ema_compression_pct
            && features.volume_contraction
            && !ema_bullish
            && !ema_bearish;

        let (structure_type, fallback) = if sps.all() {
            (StructureType::Sps, false)
        } else if sps.count() >= cfg.cps_min_conditions && features.obv_trend != ObvTrend::Falling {
            (StructureType::Cps, false)
        } else if compressed {
            (StructureType::Mcs, false)
        } else if rps.all() {
            (StructureType::Rps, false)
        } else if rps.count() >= cfg.rps_fallback_min_conditions {
            (StructureType::Rps, true)
        } else {
            (StructureType::Mcs, true)
        };

        let raw_confidence = raw_confidence(snap, features);
        let (lo, hi) = structure_type.confidence_range();
        let confidence = (lo + raw_confidence * (hi - lo)).clamp(0.0, 1.0);

        let tolerance = cfg.retest_atr_mult * snap.atr_intraday;
        let retests = |level: f64| (snap.low - level).abs() <= tolerance && close > level;

        StructureAssessment {
            structure_type,
            confidence,
            raw_confidence,
            micro_pullback: (1..=3).contains(&features.pullback_bars) && close > snap.ema20,
            retesting: retests(snap.vwap) || retests(snap.cpr.tc),
            fallback,
            sps,
            rps,
        }
    }
}

/// Spread of the set EMAs as a percentage of price. NaN with fewer than two.
fn ema_spread_pct(snap: &IndicatorSnapshot) -> f64 {
    let emas: Vec<f64> = snap.emas().iter().filter_map(|&(_, v)| v).collect();
    if emas.len() < 2 {
        return f64::NAN;
    }
    let max = emas.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = emas.iter().copied().fold(f64::INFINITY, f64::min);
    (max - min) / snap.close * 100.0
}

/// Equal-weighted mean of five factors, each in [0, 1].
fn raw_confidence(snap: &IndicatorSnapshot, features: &WindowFeatures) -> f64 {
    let swings = &features.swings;
    let swing_quality = if swings.is_sufficient() {
        0.5 * f64::from(u8::from(swings.higher_low())) + 0.5 * f64::from(u8::from(swings.higher_high()))
    } else {
        0.25
    };
    let obv_factor = ((snap.obv_slope + 1.0) / 2.0).clamp(0.0, 1.0);
    let cpr_align = if snap.close > snap.cpr.tc {
        1.0
    } else if snap.close >= snap.cpr.bc {
        0.5
    } else {
        0.0
    };
    let [(_, e20), (_, e50), (_, e200)] = snap.emas();
    let ema_checks: Vec<bool> = [(Some(snap.close), e20), (e20, e50), (e50, e200)]
        .iter()
        .filter_map(|&(a, b)| Some(a? > b?))
        .collect();
    let ema_align = if ema_checks.is_empty() {
        0.5
    } else {
        ema_checks.iter().filter(|&&c| c).count() as f64 / ema_checks.len() as f64
    };
    let rsi_factor = ((snap.rsi14 - 30.0) / 40.0).clamp(0.0, 1.0);

    let conf = 0.2 * swing_quality + 0.2 * obv_factor + 0.2 * cpr_align + 0.2 * ema_align + 0.2 * rsi_factor;
    if conf.is_finite() {
        conf.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
