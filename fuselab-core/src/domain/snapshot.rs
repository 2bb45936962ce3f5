//! IndicatorSnapshot: precomputed numeric features at one bar.
//!
//! Snapshots are produced outside the pipeline (by a feed, or by
//! `indicators::build_snapshot`) and consumed read-only by every engine.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::timeframe::Timeframe;

/// Central Pivot Range levels derived from the prior session's high/low/close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CprLevels {
    pub pivot: f64,
    /// Top central level (always >= `bc`).
    pub tc: f64,
    /// Bottom central level.
    pub bc: f64,
}

impl CprLevels {
    /// Standard CPR: pivot = (H+L+C)/3, BC = (H+L)/2, TC = 2*pivot - BC,
    /// then swapped so that TC >= BC.
    pub fn from_hlc(high: f64, low: f64, close: f64) -> Self {
        let pivot = (high + low + close) / 3.0;
        let bc = (high + low) / 2.0;
        let tc = 2.0 * pivot - bc;
        Self {
            pivot,
            tc: tc.max(bc),
            bc: tc.min(bc),
        }
    }

    /// Band width as a percentage of the pivot.
    pub fn width_pct(&self) -> f64 {
        if self.pivot <= 0.0 {
            return f64::NAN;
        }
        (self.tc - self.bc) / self.pivot * 100.0
    }

    /// Strictly between BC and TC.
    pub fn contains_strictly(&self, price: f64) -> bool {
        price > self.bc && price < self.tc
    }

    fn is_finite(&self) -> bool {
        self.pivot.is_finite() && self.tc.is_finite() && self.bc.is_finite()
    }
}

/// Upper/lower circuit (price band) limits for the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitLimits {
    pub upper: f64,
    pub lower: f64,
}

/// Numeric features for one (symbol, timeframe) at one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp: NaiveDateTime,

    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// Current market price.
    pub close: f64,
    pub volume: f64,

    pub ema20: f64,
    pub ema50: f64,
    pub ema200: f64,
    pub rsi14: f64,

    /// ATR on daily bars.
    pub atr_daily: f64,
    /// ATR on the evaluated timeframe's bars.
    pub atr_intraday: f64,
    /// Fractional change of `atr_intraday` over the slope window.
    pub atr_slope: f64,

    pub obv: f64,
    /// OBV change over the slope window divided by gross volume, in [-1, 1].
    pub obv_slope: f64,

    pub vwap: f64,
    pub cpr: CprLevels,

    #[serde(default)]
    pub circuit: Option<CircuitLimits>,
    #[serde(default = "default_liquid")]
    pub liquid: bool,
}

fn default_liquid() -> bool {
    true
}

impl IndicatorSnapshot {
    /// (close - vwap) / intraday ATR.
    pub fn vwap_dist_atr(&self) -> f64 {
        if self.atr_intraday <= 0.0 {
            return 0.0;
        }
        (self.close - self.vwap) / self.atr_intraday
    }

    /// Daily ATR as a percentage of price.
    pub fn atr_pct(&self) -> f64 {
        if self.close <= 0.0 {
            return f64::NAN;
        }
        self.atr_daily / self.close * 100.0
    }

    /// EMA values by period, `None` where the history did not cover it.
    pub fn emas(&self) -> [(usize, Option<f64>); 3] {
        let ready = |v: f64| v.is_finite().then_some(v);
        [
            (20, ready(self.ema20)),
            (50, ready(self.ema50)),
            (200, ready(self.ema200)),
        ]
    }

    /// Name of the first required field that is missing (NaN or infinite),
    /// or `None` if the snapshot is complete.
    ///
    /// An EMA is required only when `lookback` (the minimum history for the
    /// timeframe) covers its period; EMA200 on an hourly frame with a 60-bar
    /// lookback is optional.
    pub fn first_invalid_field(&self, lookback: usize) -> Option<&'static str> {
        let emas = [("ema20", 20, self.ema20), ("ema50", 50, self.ema50), ("ema200", 200, self.ema200)];
        let fields: [(&'static str, f64); 13] = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
            ("rsi14", self.rsi14),
            ("atr_daily", self.atr_daily),
            ("atr_intraday", self.atr_intraday),
            ("atr_slope", self.atr_slope),
            ("obv", self.obv),
            ("obv_slope", self.obv_slope),
            ("vwap", self.vwap),
            ("cpr.pivot", self.cpr.pivot),
        ];
        let required_emas = emas
            .iter()
            .filter(|(_, period, _)| lookback >= *period)
            .map(|&(name, _, v)| (name, v));
        if let Some((name, _)) = fields[..5]
            .iter()
            .copied()
            .chain(required_emas)
            .chain(fields[5..].iter().copied())
            .find(|(_, v)| !v.is_finite())
        {
            return Some(name);
        }
        if !self.cpr.is_finite() {
            return Some("cpr");
        }
        if self.close <= 0.0 {
            return Some("close");
        }
        if self.atr_daily <= 0.0 {
            return Some("atr_daily");
        }
        if self.atr_intraday <= 0.0 {
            return Some("atr_intraday");
        }
        None
    }
}
