//! Seeded synthetic bars for development and tests.
//!
//! Each (seed, symbol, timeframe) gets its own BLAKE3-derived RNG stream, so
//! a series never depends on which other series were generated or in what
//! order. Results on synthetic data are not market evidence.

use chrono::{Datelike, Duration, NaiveDateTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fuselab_core::domain::{Bar, SeriesKey, Timeframe};

use crate::data_loader::{DataError, MarketDataSource};

/// Derive the RNG for one series.
pub fn rng_for(seed: u64, key: &SeriesKey) -> StdRng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(key.symbol.as_bytes());
    hasher.update(key.timeframe.code().as_bytes());
    StdRng::from_seed(*hasher.finalize().as_bytes())
}

/// Random walk of `n` bars from 100.0 with a mild upward drift.
///
/// Daily bars skip weekends. Intraday bars run 09:15 to 15:30, one session
/// per weekday. Weekly and monthly bars step by their nominal duration.
pub fn generate_bars(key: &SeriesKey, n: usize, start: NaiveDateTime, seed: u64) -> Vec<Bar> {
    let mut rng = rng_for(seed, key);
    let mut clock = SessionClock::new(key.timeframe, start);
    let ret_scale = match key.timeframe {
        Timeframe::M5 | Timeframe::M15 => 0.002,
        Timeframe::M30 | Timeframe::H1 => 0.004,
        Timeframe::Daily => 0.015,
        Timeframe::Weekly => 0.035,
        Timeframe::Monthly => 0.07,
    };

    let mut price = 100.0_f64;
    let mut bars = Vec::with_capacity(n);
    for _ in 0..n {
        let ret: f64 = rng.gen_range(-ret_scale..ret_scale) + ret_scale * 0.05;
        let open = price;
        let close = (price * (1.0 + ret)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..ret_scale * 0.6));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..ret_scale * 0.6));
        let volume = rng.gen_range(50_000.0..500_000.0_f64).round();
        bars.push(Bar {
            timestamp: clock.next_timestamp(),
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
    }
    bars
}

/// Bar open times for a timeframe, skipping weekends and off-session hours.
struct SessionClock {
    timeframe: Timeframe,
    next: NaiveDateTime,
}

impl SessionClock {
    const OPEN: (u32, u32) = (9, 15);
    const CLOSE: (u32, u32) = (15, 30);

    fn new(timeframe: Timeframe, start: NaiveDateTime) -> Self {
        let mut clock = Self { timeframe, next: start };
        if timeframe.is_intraday() {
            clock.next = clock.session_open(start);
        }
        clock.skip_weekend();
        clock
    }

    fn session_open(&self, at: NaiveDateTime) -> NaiveDateTime {
        at.date()
            .and_hms_opt(Self::OPEN.0, Self::OPEN.1, 0)
            .unwrap_or(at)
    }

    fn session_close(&self, at: NaiveDateTime) -> NaiveDateTime {
        at.date()
            .and_hms_opt(Self::CLOSE.0, Self::CLOSE.1, 0)
            .unwrap_or(at)
    }

    fn skip_weekend(&mut self) {
        if matches!(self.timeframe, Timeframe::Weekly | Timeframe::Monthly) {
            return;
        }
        while matches!(self.next.weekday(), Weekday::Sat | Weekday::Sun) {
            self.next += Duration::days(1);
        }
    }

    fn next_timestamp(&mut self) -> NaiveDateTime {
        let current = self.next;
        self.next = current + self.timeframe.nominal_duration();
        if self.timeframe.is_intraday() && self.next >= self.session_close(current) {
            self.next = self.session_open(current + Duration::days(1));
        }
        self.skip_weekend();
        current
    }
}

/// Generates every requested series on demand.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub seed: u64,
    pub bars: usize,
    pub start: NaiveDateTime,
}

impl MarketDataSource for SyntheticSource {
    fn series(&self, key: &SeriesKey) -> Result<Vec<Bar>, DataError> {
        // Intraday series cover the same sessions as the daily series.
        let n = if key.timeframe.is_intraday() {
            self.bars.max(bars_per_session(key.timeframe) * 30)
        } else {
            self.bars
        };
        Ok(generate_bars(key, n, self.start, self.seed))
    }
}

fn bars_per_session(timeframe: Timeframe) -> usize {
    // 6h15m session
    let minutes: usize = 375;
    let step = timeframe.nominal_duration().num_minutes().max(1) as usize;
    minutes.div_ceil(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::check_series;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn same_seed_same_series() {
        let key = SeriesKey::new("SYN", Timeframe::Daily);
        assert_eq!(generate_bars(&key, 50, start(), 1), generate_bars(&key, 50, start(), 1));
        assert_ne!(generate_bars(&key, 50, start(), 1), generate_bars(&key, 50, start(), 2));
    }

    #[test]
    fn series_are_independent_per_symbol() {
        let a = generate_bars(&SeriesKey::new("A", Timeframe::Daily), 20, start(), 9);
        let b = generate_bars(&SeriesKey::new("B", Timeframe::Daily), 20, start(), 9);
        assert_ne!(a, b);
    }

    #[test]
    fn daily_bars_skip_weekends_and_are_sane() {
        let key = SeriesKey::new("SYN", Timeframe::Daily);
        let bars = generate_bars(&key, 30, start(), 3);
        assert!(check_series(&key, &bars).is_ok());
        assert!(bars
            .iter()
            .all(|b| !matches!(b.timestamp.weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn session_bar_counts_round_up() {
        assert_eq!(bars_per_session(Timeframe::M5), 75);
        assert_eq!(bars_per_session(Timeframe::M15), 25);
        assert_eq!(bars_per_session(Timeframe::M30), 13);
        assert_eq!(bars_per_session(Timeframe::H1), 7);
    }

    #[test]
    fn intraday_bars_stay_in_session() {
        let key = SeriesKey::new("SYN", Timeframe::M15);
        let bars = generate_bars(&key, 80, start(), 3);
        assert!(check_series(&key, &bars).is_ok());
        let open = chrono::NaiveTime::from_hms_opt(9, 15, 0).unwrap();
        let close = chrono::NaiveTime::from_hms_opt(15, 30, 0).unwrap();
        assert!(bars.iter().all(|b| b.timestamp.time() >= open && b.timestamp.time() < close));
        // 25 bars per 15-minute session
        assert_eq!(bars[25].timestamp.time(), open);
    }
}
