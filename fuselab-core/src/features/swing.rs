//! Fractal swing points.
//!
//! A bar is a swing high when its high is strictly greater than the highs of
//! the `span` bars on each side (span 2 = the classic 5-bar fractal). The last
//! `span` bars cannot be confirmed yet and are never reported.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
    pub kind: SwingKind,
}

/// All confirmed swing points, in bar order.
pub fn find_swings(bars: &[Bar], span: usize) -> Vec<SwingPoint> {
    let span = span.max(1);
    let n = bars.len();
    let mut swings = Vec::new();
    if n < 2 * span + 1 {
        return swings;
    }
    for i in span..n - span {
        let neighbors = (i - span..=i + span).filter(|&j| j != i);
        let mut is_high = true;
        let mut is_low = true;
        for j in neighbors {
            if bars[j].high >= bars[i].high {
                is_high = false;
            }
            if bars[j].low <= bars[i].low {
                is_low = false;
            }
        }
        if is_high {
            swings.push(SwingPoint {
                index: i,
                price: bars[i].high,
                kind: SwingKind::High,
            });
        }
        if is_low {
            swings.push(SwingPoint {
                index: i,
                price: bars[i].low,
                kind: SwingKind::Low,
            });
        }
    }
    swings
}

/// The two most recent swing highs and lows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SwingSummary {
    pub last_high: Option<f64>,
    pub prev_high: Option<f64>,
    pub last_low: Option<f64>,
    pub prev_low: Option<f64>,
}

impl SwingSummary {
    pub fn from_swings(swings: &[SwingPoint]) -> Self {
        let mut highs = swings.iter().rev().filter(|s| s.kind == SwingKind::High);
        let mut lows = swings.iter().rev().filter(|s| s.kind == SwingKind::Low);
        Self {
            last_high: highs.next().map(|s| s.price),
            prev_high: highs.next().map(|s| s.price),
            last_low: lows.next().map(|s| s.price),
            prev_low: lows.next().map(|s| s.price),
        }
    }

    pub fn from_bars(bars: &[Bar], span: usize) -> Self {
        Self::from_swings(&find_swings(bars, span))
    }

    pub fn higher_low(&self) -> bool {
        matches!((self.last_low, self.prev_low), (Some(l), Some(p)) if l > p)
    }

    pub fn lower_low(&self) -> bool {
        matches!((self.last_low, self.prev_low), (Some(l), Some(p)) if l < p)
    }

    pub fn higher_high(&self) -> bool {
        matches!((self.last_high, self.prev_high), (Some(h), Some(p)) if h > p)
    }

    pub fn lower_high(&self) -> bool {
        matches!((self.last_high, self.prev_high), (Some(h), Some(p)) if h < p)
    }

    /// Both a high pair and a low pair exist.
    pub fn is_sufficient(&self) -> bool {
        self.prev_high.is_some() && self.prev_low.is_some()
    }
}
