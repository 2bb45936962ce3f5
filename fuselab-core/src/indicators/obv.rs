//! On-Balance Volume (OBV).
//!
//! OBV[0] = 0; OBV[t] = OBV[t-1] ± volume[t] depending on the close-to-close
//! direction (unchanged on a flat close).

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Default)]
pub struct Obv;

impl Indicator for Obv {
    fn name(&self) -> &str {
        "obv"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut result = Vec::with_capacity(bars.len());
        let mut obv = 0.0;
        for (i, bar) in bars.iter().enumerate() {
            if i > 0 {
                let prev = bars[i - 1].close;
                if bar.close > prev {
                    obv += bar.volume;
                } else if bar.close < prev {
                    obv -= bar.volume;
                }
            }
            result.push(obv);
        }
        result
    }
}

/// OBV change over the last `window` bars divided by the gross volume traded
/// in those bars. +1 means every bar closed up; -1 means every bar closed down.
pub fn normalized_slope(bars: &[Bar], obv: &[f64], window: usize) -> f64 {
    let n = bars.len();
    if n < 2 || window == 0 || obv.len() != n {
        return 0.0;
    }
    let start = n.saturating_sub(window + 1);
    let gross: f64 = bars[start + 1..].iter().map(|b| b.volume).sum();
    if gross <= 0.0 {
        return 0.0;
    }
    ((obv[n - 1] - obv[start]) / gross).clamp(-1.0, 1.0)
}
