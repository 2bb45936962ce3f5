//! Snapshot builder: bars in, `IndicatorSnapshot` out.
//!
//! Used when a feed supplies raw bars only. The computed fields mirror what an
//! external indicator service would publish; NaN fields are passed through
//! untouched so the pipeline can report them as data-integrity failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::obv::normalized_slope;
use super::{
    ema_of_series, last_value, resample, rolling_vwap, session_vwap, Atr, Indicator, Obv, Rsi,
};
use crate::domain::{Bar, CircuitLimits, CprLevels, IndicatorSnapshot, Timeframe};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SnapshotError {
    #[error("no bars supplied for {symbol}")]
    Empty { symbol: String },

    #[error("{symbol}: need at least {need} bars to derive the prior session, have {have}")]
    NoPriorSession {
        symbol: String,
        need: usize,
        have: usize,
    },
}

/// Parameters of the primitive indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotOptions {
    pub atr_period: usize,
    pub rsi_period: usize,
    /// Bars used for ATR slope and OBV slope.
    pub slope_window: usize,
    /// Rolling VWAP window for daily and slower bars.
    pub vwap_window: usize,
    /// Circuit band around the prior session close, percent. `None` = no limits.
    pub circuit_band_pct: Option<f64>,
    /// Minimum 20-bar average volume for the instrument to count as liquid.
    pub min_avg_volume: f64,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            atr_period: 14,
            rsi_period: 14,
            slope_window: 14,
            vwap_window: 20,
            circuit_band_pct: None,
            min_avg_volume: 0.0,
        }
    }
}

/// Build the snapshot for the last bar of `bars`.
///
/// `daily` supplies daily bars for intraday timeframes (daily ATR and CPR).
/// When absent, intraday bars are resampled, which only yields a valid
/// daily ATR if the window spans enough sessions.
pub fn build_snapshot(
    symbol: &str,
    timeframe: Timeframe,
    bars: &[Bar],
    daily: Option<&[Bar]>,
    opts: &SnapshotOptions,
) -> Result<IndicatorSnapshot, SnapshotError> {
    let last = bars.last().ok_or_else(|| SnapshotError::Empty {
        symbol: symbol.to_string(),
    })?;

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let atr_series = Atr::new(opts.atr_period).compute(bars);
    let atr_intraday = last_value(&atr_series);
    let atr_slope = slope_of(&atr_series, opts.slope_window);

    let obv_series = Obv.compute(bars);
    let obv_slope = normalized_slope(bars, &obv_series, opts.slope_window);

    let vwap = if timeframe.is_intraday() {
        last_value(&session_vwap(bars))
    } else {
        last_value(&rolling_vwap(bars, opts.vwap_window))
    };

    // Session bars: the frame CPR and daily ATR are derived from. Intraday
    // frames only see sessions completed before the current one.
    let session_bars: Vec<Bar> = if timeframe.is_intraday() {
        let today = last.timestamp.date();
        let sessions = match daily {
            Some(d) => d.to_vec(),
            None => resample(bars, Timeframe::Daily),
        };
        sessions
            .into_iter()
            .filter(|b| b.timestamp.date() < today)
            .collect()
    } else {
        bars.to_vec()
    };
    let prior = prior_session(&session_bars, last, timeframe).ok_or_else(|| {
        SnapshotError::NoPriorSession {
            symbol: symbol.to_string(),
            need: 2,
            have: session_bars.len(),
        }
    })?;
    let cpr = CprLevels::from_hlc(prior.high, prior.low, prior.close);

    let atr_daily = if timeframe.is_intraday() {
        last_value(&Atr::new(opts.atr_period).compute(&session_bars))
    } else {
        atr_intraday
    };

    let circuit = opts.circuit_band_pct.map(|band| CircuitLimits {
        upper: prior.close * (1.0 + band / 100.0),
        lower: prior.close * (1.0 - band / 100.0),
    });

    let tail = &bars[bars.len().saturating_sub(20)..];
    let avg_volume = tail.iter().map(|b| b.volume).sum::<f64>() / tail.len() as f64;

    Ok(IndicatorSnapshot {
        symbol: symbol.to_string(),
        timeframe,
        timestamp: last.timestamp,
        open: last.open,
        high: last.high,
        low: last.low,
        close: last.close,
        volume: last.volume,
        ema20: last_value(&ema_of_series(&closes, 20)),
        ema50: last_value(&ema_of_series(&closes, 50)),
        ema200: last_value(&ema_of_series(&closes, 200)),
        rsi14: last_value(&Rsi::new(opts.rsi_period).compute(bars)),
        atr_daily,
        atr_intraday,
        atr_slope,
        obv: last_value(&obv_series),
        obv_slope,
        vwap,
        cpr,
        circuit,
        liquid: avg_volume >= opts.min_avg_volume,
    })
}

/// The completed session before the one containing `last`.
fn prior_session<'a>(session_bars: &'a [Bar], last: &Bar, timeframe: Timeframe) -> Option<&'a Bar> {
    if timeframe.is_intraday() {
        let today = last.timestamp.date();
        session_bars.last().filter(|b| b.timestamp.date() < today)
    } else {
        let n = session_bars.len();
        if n < 2 {
            None
        } else {
            session_bars.get(n - 2)
        }
    }
}

/// Fractional change between the last value and the value `window` bars earlier.
fn slope_of(series: &[f64], window: usize) -> f64 {
    let n = series.len();
    if n <= window {
        return f64::NAN;
    }
    let now = series[n - 1];
    let then = series[n - 1 - window];
    if then.is_nan() || now.is_nan() || then == 0.0 {
        return f64::NAN;
    }
    now / then - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    #[test]
    fn empty_bars_error() {
        let err = build_snapshot("X", Timeframe::Daily, &[], None, &SnapshotOptions::default());
        assert!(matches!(err, Err(SnapshotError::Empty { .. })));
    }

    #[test]
    fn daily_snapshot_is_complete_with_enough_history() {
        let closes: Vec<f64> = (0..260).map(|i| 100.0 + i as f64 * 0.2).collect();
        let bars = make_bars(&closes);
        let snap =
            build_snapshot("X", Timeframe::Daily, &bars, None, &SnapshotOptions::default())
                .unwrap();
        assert_eq!(snap.first_invalid_field(200), None);
        assert_eq!(snap.close, *closes.last().unwrap());
        assert!(snap.ema20 > snap.ema50 && snap.ema50 > snap.ema200);
        assert_eq!(snap.atr_daily, snap.atr_intraday);
        // straight rise: OBV slope saturates
        assert!((snap.obv_slope - 1.0).abs() < 1e-12);
    }

    #[test]
    fn short_history_leaves_ema200_nan() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let snap = build_snapshot(
            "X",
            Timeframe::Daily,
            &make_bars(&closes),
            None,
            &SnapshotOptions::default(),
        )
        .unwrap();
        assert_eq!(snap.first_invalid_field(200), Some("ema200"));
        // A 60-bar lookback does not cover EMA200.
        assert_eq!(snap.first_invalid_field(60), None);
    }

    #[test]
    fn cpr_comes_from_prior_bar_on_daily() {
        let bars = make_bars(&[100.0, 102.0, 101.0]);
        let snap =
            build_snapshot("X", Timeframe::Daily, &bars, None, &SnapshotOptions::default())
                .unwrap();
        let expected = CprLevels::from_hlc(bars[1].high, bars[1].low, bars[1].close);
        assert_eq!(snap.cpr, expected);
    }

    #[test]
    fn intraday_uses_completed_sessions_only() {
        let base = chrono::NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        // two sessions of 30 fifteen-minute bars
        let bars: Vec<Bar> = (0..60)
            .map(|i| {
                let day = i / 30;
                let slot = i % 30;
                let close = 100.0 + i as f64 * 0.1;
                Bar {
                    timestamp: base + chrono::Duration::days(day) + chrono::Duration::minutes(15 * slot),
                    open: close - 0.05,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 1000.0,
                }
            })
            .collect();
        let snap = build_snapshot("X", Timeframe::M15, &bars, None, &SnapshotOptions::default())
            .unwrap();
        let first_session = &resample(&bars[..30], Timeframe::Daily)[0];
        assert_eq!(
            snap.cpr,
            CprLevels::from_hlc(first_session.high, first_session.low, first_session.close)
        );

        let one_session = build_snapshot("X", Timeframe::M15, &bars[..30], None, &SnapshotOptions::default());
        assert!(matches!(one_session, Err(SnapshotError::NoPriorSession { .. })));
    }

    #[test]
    fn circuit_band_around_prior_close() {
        let bars = make_bars(&[100.0, 200.0, 201.0]);
        let opts = SnapshotOptions {
            circuit_band_pct: Some(10.0),
            ..SnapshotOptions::default()
        };
        let snap = build_snapshot("X", Timeframe::Daily, &bars, None, &opts).unwrap();
        let circuit = snap.circuit.unwrap();
        assert!((circuit.upper - 220.0).abs() < 1e-9);
        assert!((circuit.lower - 180.0).abs() < 1e-9);
    }
}
