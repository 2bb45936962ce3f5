//! Aggregation of bars into slower timeframes.

use chrono::{Datelike, NaiveDate};

use crate::domain::{Bar, Timeframe};

/// Aggregate bars into Daily, Weekly (ISO week) or Monthly buckets.
///
/// Each output bar opens at midnight of its bucket's first source bar and
/// carries first open, max high, min low, last close and summed volume.
/// Intraday targets are returned unchanged; bars are not split.
pub fn resample(bars: &[Bar], target: Timeframe) -> Vec<Bar> {
    if target.is_intraday() {
        return bars.to_vec();
    }

    let mut out: Vec<Bar> = Vec::new();
    let mut current_bucket: Option<(i32, u32)> = None;

    for bar in bars {
        let bucket = bucket_of(bar.timestamp.date(), target);
        match out.last_mut() {
            Some(agg) if current_bucket == Some(bucket) => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
            }
            _ => {
                current_bucket = Some(bucket);
                out.push(Bar {
                    timestamp: bar.timestamp.date().and_time(chrono::NaiveTime::MIN),
                    ..bar.clone()
                });
            }
        }
    }

    out
}

fn bucket_of(date: NaiveDate, target: Timeframe) -> (i32, u32) {
    match target {
        Timeframe::Weekly => {
            let week = date.iso_week();
            (week.year(), week.week())
        }
        Timeframe::Monthly => (date.year(), date.month()),
        _ => (date.year(), date.ordinal()),
    }
}
