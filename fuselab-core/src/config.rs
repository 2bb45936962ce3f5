//! Fusion configuration: every threshold the engines use, by name.
//!
//! The source material states some cutoffs inconsistently (CPR "tight" at
//! both 0.25% and 0.35%, overextension at both 1.5x and 2.0x ATR). Each use
//! site therefore gets its own named field instead of a shared literal.
//!
//! All sections are `#[serde(default)]`, so a TOML file only needs the
//! values it overrides.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::{Timeframe, TradeDirection};

/// Complete configuration for one pipeline instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub lookback: LookbackConfig,
    pub staleness: StalenessConfig,
    pub features: FeatureConfig,
    pub cpr: CprConfig,
    pub structure: StructureConfig,
    pub trend: TrendConfig,
    pub reversal: ReversalConfig,
    pub volatility: VolatilityConfig,
    pub validity: ValidityConfig,
    pub ladder: LadderConfig,
    pub decision: DecisionConfig,
}

/// Minimum bar counts per timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookbackConfig {
    pub m5: usize,
    pub m15: usize,
    pub m30: usize,
    pub h1: usize,
    /// Daily is deployment-specific; >= 200 keeps EMA200 meaningful.
    pub daily: usize,
    pub weekly: usize,
    pub monthly: usize,
}

impl Default for LookbackConfig {
    fn default() -> Self {
        Self {
            m5: 150,
            m15: 120,
            m30: 100,
            h1: 60,
            daily: 200,
            weekly: 52,
            monthly: 24,
        }
    }
}

impl LookbackConfig {
    pub fn min_bars(&self, timeframe: Timeframe) -> usize {
        match timeframe {
            Timeframe::M5 => self.m5,
            Timeframe::M15 => self.m15,
            Timeframe::M30 => self.m30,
            Timeframe::H1 => self.h1,
            Timeframe::Daily => self.daily,
            Timeframe::Weekly => self.weekly,
            Timeframe::Monthly => self.monthly,
        }
    }
}

/// How old a snapshot may be relative to the evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessConfig {
    /// Maximum age in bars of the evaluated timeframe.
    pub stale_after_bars: i32,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        // 3 daily bars covers a Friday close evaluated on Monday.
        Self { stale_after_bars: 3 }
    }
}

impl StalenessConfig {
    pub fn max_age(&self, timeframe: Timeframe) -> Duration {
        timeframe.nominal_duration() * self.stale_after_bars
    }
}

/// Bar-window feature extraction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Bars on each side a fractal must exceed (2 = 5-bar fractal).
    pub fractal_span: usize,
    pub volume_avg_window: usize,
    pub volume_spike_mult: f64,
    /// Last-5 average volume at or below this fraction of the window average
    /// counts as contraction.
    pub volume_contraction_ratio: f64,
    pub wide_range_atr_mult: f64,
    pub pullback_window: usize,
    pub reclaim_lookback: usize,
    pub extended_run_bars: usize,
    pub divergence_lookback: usize,
    pub divergence_volume_decline_bars: usize,
    /// Body/range ratio at or below which a candle is a doji.
    pub doji_body_ratio: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fractal_span: 2,
            volume_avg_window: 20,
            volume_spike_mult: 2.0,
            volume_contraction_ratio: 0.8,
            wide_range_atr_mult: 1.5,
            pullback_window: 5,
            reclaim_lookback: 5,
            extended_run_bars: 5,
            divergence_lookback: 20,
            divergence_volume_decline_bars: 3,
            doji_body_ratio: 0.1,
        }
    }
}

/// CPR width classification (percent of pivot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CprConfig {
    pub narrow_width_pct: f64,
    pub wide_width_pct: f64,
    pub ultra_wide_width_pct: f64,
}

impl Default for CprConfig {
    fn default() -> Self {
        Self {
            narrow_width_pct: 0.25,
            wide_width_pct: 0.75,
            ultra_wide_width_pct: 1.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    pub sps_rsi_min: f64,
    /// Half-width of the EMA band in intraday ATR units.
    pub ema_band_atr_mult: f64,
    /// |obv_slope| at or below this is flat.
    pub obv_flat_band: f64,
    /// Conditions (of 7) a CPS needs.
    pub cps_min_conditions: usize,
    pub mcs_cpr_width_max_pct: f64,
    /// EMA20/50/200 spread, percent of price, at or below which the stack is compressed.
    pub ema_compression_pct: f64,
    pub rps_rsi_max: f64,
    /// Fallback to RPS when at least this many of its 5 conditions hold.
    pub rps_fallback_min_conditions: usize,
    pub retest_atr_mult: f64,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            sps_rsi_min: 55.0,
            ema_band_atr_mult: 1.0,
            obv_flat_band: 0.1,
            cps_min_conditions: 4,
            mcs_cpr_width_max_pct: 0.35,
            ema_compression_pct: 1.5,
            rps_rsi_max: 45.0,
            rps_fallback_min_conditions: 3,
            retest_atr_mult: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Raw frame score at or above which the frame bias is Bullish.
    pub bullish_bias_min: f64,
    /// Raw frame score at or below which the frame bias is Bearish.
    pub bearish_bias_max: f64,
    pub label_bullish: f64,
    pub label_constructive: f64,
    pub label_neutral: f64,
    pub label_weak: f64,
    pub rsi_strong: f64,
    pub rsi_positive: f64,
    pub rsi_soft: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            bullish_bias_min: 4.5,
            bearish_bias_max: -2.5,
            label_bullish: 7.5,
            label_constructive: 4.5,
            label_neutral: 2.5,
            label_weak: 1.0,
            rsi_strong: 60.0,
            rsi_positive: 50.0,
            rsi_soft: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReversalConfig {
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    /// OBV must fall for more than this many bars to count as distribution.
    pub obv_distribution_bars: usize,
    pub rsi_extreme_weight: f64,
    pub obv_distribution_weight: f64,
    pub pattern_weight: f64,
    pub spike_indecision_weight: f64,
    pub wide_range_run_weight: f64,
    pub max_score: f64,
}

impl Default for ReversalConfig {
    fn default() -> Self {
        Self {
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            obv_distribution_bars: 5,
            rsi_extreme_weight: 1.0,
            obv_distribution_weight: 0.5,
            pattern_weight: 0.5,
            spike_indecision_weight: 0.5,
            wide_range_run_weight: 0.5,
            max_score: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    pub low_risk_max_pct: f64,
    pub medium_risk_max_pct: f64,
    pub atr_pct_weight: f64,
    /// ATR slope below this is Compressed.
    pub compressed_slope: f64,
    /// ATR slope above this is Expanding.
    pub expanding_slope: f64,
    /// ATR slope above this is Hyper.
    pub hyper_slope: f64,
    pub compression_bonus: f64,
    pub hyper_penalty: f64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            low_risk_max_pct: 1.0,
            medium_risk_max_pct: 2.5,
            atr_pct_weight: 1.5,
            compressed_slope: -0.05,
            expanding_slope: 0.05,
            hyper_slope: 0.30,
            compression_bonus: 1.0,
            hyper_penalty: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidityConfig {
    pub direction: TradeDirection,
    /// Price within this percent of a circuit limit is vetoed.
    pub circuit_proximity_pct: f64,
    /// Displacement from VWAP or CPR pivot, in intraday ATR units.
    pub overextension_atr_mult: f64,
    /// Reversal score strictly above this vetoes.
    pub exhaustion_score: f64,
    /// Reversal score strictly above this (and not vetoed) downgrades Buyable to Watch.
    pub caution_score: f64,
}

impl Default for ValidityConfig {
    fn default() -> Self {
        Self {
            direction: TradeDirection::Long,
            circuit_proximity_pct: 1.0,
            overextension_atr_mult: 2.0,
            exhaustion_score: 2.5,
            caution_score: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LadderConfig {
    /// T1..T3 offsets from entry in daily ATR units.
    pub static_targets_atr: [f64; 3],
    pub static_stop_atr: f64,
    /// T1..T3 offsets from CMP in intraday ATR units.
    pub dynamic_targets_atr: [f64; 3],
    pub dynamic_stop_atr: f64,
    /// Multiplier applied to every offset when volatility is Hyper.
    pub hyper_spacing_scale: f64,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            static_targets_atr: [0.5, 1.0, 1.5],
            static_stop_atr: 1.0,
            dynamic_targets_atr: [0.35, 0.85, 1.35],
            dynamic_stop_atr: 0.70,
            hyper_spacing_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub buy_trend_min: f64,
    pub watch_trend_min: f64,
    pub trend_weight: f64,
    pub structure_weight: f64,
    pub reversal_weight: f64,
    pub risk_penalty_low: f64,
    pub risk_penalty_medium: f64,
    pub risk_penalty_high: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            buy_trend_min: 4.5,
            watch_trend_min: 2.5,
            trend_weight: 1.0,
            structure_weight: 1.0,
            reversal_weight: 1.0,
            risk_penalty_low: 0.0,
            risk_penalty_medium: 0.5,
            risk_penalty_high: 1.5,
        }
    }
}
