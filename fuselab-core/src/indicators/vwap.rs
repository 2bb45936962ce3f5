//! Volume-Weighted Average Price.
//!
//! Intraday bars use a session VWAP that restarts every calendar day.
//! Daily and slower bars have no session, so a rolling window is used.

use crate::domain::Bar;

/// Cumulative VWAP of typical price, reset at each new calendar date.
pub fn session_vwap(bars: &[Bar]) -> Vec<f64> {
    let mut result = Vec::with_capacity(bars.len());
    let mut pv = 0.0;
    let mut vol = 0.0;
    let mut session = None;
    for bar in bars {
        let date = bar.timestamp.date();
        if session != Some(date) {
            session = Some(date);
            pv = 0.0;
            vol = 0.0;
        }
        pv += bar.typical_price() * bar.volume;
        vol += bar.volume;
        result.push(if vol > 0.0 { pv / vol } else { bar.typical_price() });
    }
    result
}

/// VWAP of typical price over the trailing `window` bars.
pub fn rolling_vwap(bars: &[Bar], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..bars.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &bars[start..=i];
            let vol: f64 = slice.iter().map(|b| b.volume).sum();
            if vol > 0.0 {
                slice.iter().map(|b| b.typical_price() * b.volume).sum::<f64>() / vol
            } else {
                bars[i].typical_price()
            }
        })
        .collect()
}
