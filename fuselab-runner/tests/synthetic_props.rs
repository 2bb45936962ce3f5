//! Property tests for synthetic series.
//!
//! 1. Every generated series passes the loader's bar checks
//! 2. Generation is a pure function of (seed, key, start, n)

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use fuselab_core::domain::{SeriesKey, Timeframe};
use fuselab_runner::data_loader::check_series;
use fuselab_runner::generate_bars;

fn arb_timeframe() -> impl Strategy<Value = Timeframe> {
    prop_oneof![
        Just(Timeframe::M5),
        Just(Timeframe::M15),
        Just(Timeframe::M30),
        Just(Timeframe::H1),
        Just(Timeframe::Daily),
        Just(Timeframe::Weekly),
        Just(Timeframe::Monthly),
    ]
}

proptest! {
    #[test]
    fn synthetic_series_are_valid(seed in any::<u64>(), tf in arb_timeframe(), n in 1usize..400, offset in 0i64..60) {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap() + Duration::days(offset);
        let key = SeriesKey::new("PROP", tf);
        let bars = generate_bars(&key, n, start, seed);
        prop_assert_eq!(bars.len(), n);
        prop_assert!(check_series(&key, &bars).is_ok());
    }

    #[test]
    fn synthetic_series_are_reproducible(seed in any::<u64>(), tf in arb_timeframe()) {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let key = SeriesKey::new("PROP", tf);
        prop_assert_eq!(generate_bars(&key, 50, start, seed), generate_bars(&key, 50, start, seed));
    }
}
