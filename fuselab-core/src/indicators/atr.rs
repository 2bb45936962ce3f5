//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing (alpha = 1/period), seeded with the mean of the
//! first `period` true ranges.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        wilder_smooth(&true_range(bars), self.period)
    }
}

/// TR[0] = high[0] - low[0]; TR[t] uses the previous close.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                return bar.high - bar.low;
            }
            let pc = bars[i - 1].close;
            (bar.high - bar.low)
                .max((bar.high - pc).abs())
                .max((bar.low - pc).abs())
        })
        .collect()
}

/// Wilder smoothing from the start of the series. NaN in the seed window
/// yields all NaN; NaN afterwards taints the tail.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if n < period || period == 0 {
        return result;
    }

    let seed_window = &values[..period];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let seed = seed_window.iter().sum::<f64>() / period as f64;
    result[period - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in period..n {
        if values[i].is_nan() {
            return result;
        }
        let smoothed = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = smoothed;
        prev = smoothed;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn true_range_uses_previous_close() {
        let mut bars = make_bars(&[100.0, 100.0]);
        bars[1].high = 101.0;
        bars[1].low = 99.5;
        bars[0].close = 104.0;
        let tr = true_range(&bars);
        // |99.5 - 104| dominates the 1.5 bar range
        assert_approx(tr[1], 4.5, DEFAULT_EPSILON);
    }

    #[test]
    fn constant_range_gives_constant_atr() {
        // make_bars on flat closes: every bar has range 2.0
        let bars = make_bars(&[50.0; 30]);
        let atr = Atr::new(14).compute(&bars);
        assert!(atr[12].is_nan());
        assert_approx(atr[13], 2.0, DEFAULT_EPSILON);
        assert_approx(atr[29], 2.0, DEFAULT_EPSILON);
    }

    #[test]
    fn wilder_smooth_known_values() {
        // seed mean(2,4) = 3, next 0.5*6 + 0.5*3 = 4.5
        let out = wilder_smooth(&[2.0, 4.0, 6.0], 2);
        assert!(out[0].is_nan());
        assert_approx(out[1], 3.0, DEFAULT_EPSILON);
        assert_approx(out[2], 4.5, DEFAULT_EPSILON);
    }
}
