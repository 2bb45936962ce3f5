//! TrendEngine: per-frame four-layer score and the D/W/M composite.
//!
//! Layers per frame: EMA stack (±4), swing structure (±3), RSI bucket (±2),
//! VWAP side (±1). The raw sum decides the frame bias; the published score is
//! the raw sum clamped to [0, 10]. Trend output is advisory: it never lifts a
//! validity Avoid.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::structure::{StructureAssessment, StructureType};
use crate::config::TrendConfig;
use crate::domain::{IndicatorSnapshot, Timeframe};
use crate::features::SwingSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendBias {
    Bullish,
    Bearish,
    Range,
}

impl fmt::Display for TrendBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bullish => "Bullish",
            Self::Bearish => "Bearish",
            Self::Range => "Range",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    Bullish,
    Constructive,
    Neutral,
    Weak,
    Avoid,
}

/// A higher-timeframe frame: its snapshot and its own swing summary.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub snapshot: &'a IndicatorSnapshot,
    pub swings: SwingSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameScore {
    pub timeframe: Timeframe,
    pub ema_layer: f64,
    pub swing_layer: f64,
    pub momentum_layer: f64,
    pub vwap_layer: f64,
    /// Sum of the layers, in [-10, 10].
    pub raw: f64,
    /// `raw` clamped to [0, 10].
    pub score: f64,
    pub bias: TrendBias,
    pub label: TrendLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAssessment {
    pub bias_daily: Option<TrendBias>,
    pub bias_weekly: Option<TrendBias>,
    pub bias_monthly: Option<TrendBias>,
    /// Composite bias across D/W/M (primary frame bias if none are present).
    pub bias: TrendBias,
    /// Primary frame score, in [0, 10].
    pub score: f64,
    pub label: TrendLabel,
    /// e.g. "Bullish (D:Range W:Bullish M:Bullish)".
    pub composite: String,
    pub primary: FrameScore,
}

#[derive(Debug, Clone, Default)]
pub struct TrendEngine {
    cfg: TrendConfig,
}

impl TrendEngine {
    pub fn new(cfg: TrendConfig) -> Self {
        Self { cfg }
    }

    /// Score the primary frame (swing layer from the structure assessment) and
    /// fold in any higher frames. Frames with a timeframe equal to the primary's
    /// are ignored; the primary fills its own slot.
    pub fn assess(
        &self,
        primary: &IndicatorSnapshot,
        structure: &StructureAssessment,
        higher: &[FrameInput<'_>],
    ) -> TrendAssessment {
        let swing = match structure.structure_type {
            StructureType::Sps => 3.0,
            StructureType::Cps => 2.0,
            StructureType::Mcs => 0.0,
            StructureType::Rps => -3.0,
        };
        let primary_score = self.score_frame(primary, swing);

        let mut slots: [Option<TrendBias>; 3] = [None; 3];
        if let Some(i) = slot(primary.timeframe) {
            slots[i] = Some(primary_score.bias);
        }
        for frame in higher {
            let tf = frame.snapshot.timeframe;
            if tf == primary.timeframe {
                continue;
            }
            if let Some(i) = slot(tf) {
                if slots[i].is_none() {
                    let scored = self.score_frame(frame.snapshot, swing_layer(&frame.swings));
                    slots[i] = Some(scored.bias);
                }
            }
        }

        let bias = composite_bias(&slots).unwrap_or(primary_score.bias);
        let show = |b: Option<TrendBias>| b.map_or_else(|| "n/a".to_string(), |b| b.to_string());
        let composite = format!(
            "{} (D:{} W:{} M:{})",
            bias,
            show(slots[0]),
            show(slots[1]),
            show(slots[2])
        );

        TrendAssessment {
            bias_daily: slots[0],
            bias_weekly: slots[1],
            bias_monthly: slots[2],
            bias,
            score: primary_score.score,
            label: primary_score.label,
            composite,
            primary: primary_score,
        }
    }

    pub fn score_frame(&self, snap: &IndicatorSnapshot, swing_layer: f64) -> FrameScore {
        let cfg = &self.cfg;
        let sign = |cond: bool| if cond { 1.0 } else { -1.0 };
        let ema_layer = ema_layer(snap);
        let momentum_layer = if snap.rsi14 >= cfg.rsi_strong {
            2.0
        } else if snap.rsi14 >= cfg.rsi_positive {
            1.0
        } else if snap.rsi14 >= cfg.rsi_soft {
            -1.0
        } else {
            -2.0
        };
        let vwap_layer = sign(snap.close > snap.vwap);
        let swing_layer = swing_layer.clamp(-3.0, 3.0);

        let raw = ema_layer + swing_layer + momentum_layer + vwap_layer;
        let score = raw.clamp(0.0, 10.0);
        let bias = if raw >= cfg.bullish_bias_min {
            TrendBias::Bullish
        } else if raw <= cfg.bearish_bias_max {
            TrendBias::Bearish
        } else {
            TrendBias::Range
        };

        FrameScore {
            timeframe: snap.timeframe,
            ema_layer,
            swing_layer,
            momentum_layer,
            vwap_layer,
            raw,
            score,
            bias,
            label: self.label(score),
        }
    }

    pub fn label(&self, score: f64) -> TrendLabel {
        let cfg = &self.cfg;
        if score >= cfg.label_bullish {
            TrendLabel::Bullish
        } else if score >= cfg.label_constructive {
            TrendLabel::Constructive
        } else if score >= cfg.label_neutral {
            TrendLabel::Neutral
        } else if score >= cfg.label_weak {
            TrendLabel::Weak
        } else {
            TrendLabel::Avoid
        }
    }
}

fn slot(tf: Timeframe) -> Option<usize> {
    match tf {
        Timeframe::Daily => Some(0),
        Timeframe::Weekly => Some(1),
        Timeframe::Monthly => Some(2),
        _ => None,
    }
}

/// Higher-high and higher-low each +1.5; lower-high and lower-low each -1.5.
fn swing_layer(swings: &SwingSummary) -> f64 {
    let mut layer = 0.0;
    if swings.higher_high() {
        layer += 1.5;
    }
    if swings.higher_low() {
        layer += 1.5;
    }
    if swings.lower_high() {
        layer -= 1.5;
    }
    if swings.lower_low() {
        layer -= 1.5;
    }
    layer
}

/// Majority vote over the present frames. Two present and disagreeing: the
/// faster frame wins (Daily when present). Three-way split: Range.
fn composite_bias(slots: &[Option<TrendBias>; 3]) -> Option<TrendBias> {
    let present: Vec<TrendBias> = slots.iter().flatten().copied().collect();
    match present.as_slice() {
        [] => None,
        [only] => Some(*only),
        // slots are ordered D, W, M: the first present frame is the faster one
        [faster, _] => Some(*faster),
        [a, b, c] => {
            if a == b || a == c {
                Some(*a)
            } else if b == c {
                Some(*b)
            } else {
                Some(TrendBias::Range)
            }
        }
        _ => None,
    }
}

/// Sum of the four EMA-stack relations, each +1/-1, scaled back to [-4, 4]
/// when a short history leaves some EMAs unset.
fn ema_layer(snap: &IndicatorSnapshot) -> f64 {
    let [(_, e20), (_, e50), (_, e200)] = snap.emas();
    let close = Some(snap.close);
    let relations = [(close, e20), (e20, e50), (e50, e200), (close, e200)];
    let signs: Vec<f64> = relations
        .iter()
        .filter_map(|&(a, b)| Some(if a? > b? { 1.0 } else { -1.0 }))
        .collect();
    if signs.is_empty() {
        return 0.0;
    }
    signs.iter().sum::<f64>() * 4.0 / signs.len() as f64
}
