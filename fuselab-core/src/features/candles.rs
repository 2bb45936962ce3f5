//! Candlestick pattern classification on the last three bars.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandlePattern {
    BearishEngulfing,
    ShootingStar,
    EveningStar,
    DarkCloudCover,
    BullishEngulfing,
    Hammer,
    MorningStar,
    Doji,
    SpinningTop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternGroup {
    BearishReversal,
    BullishReversal,
    Indecision,
}

impl CandlePattern {
    pub fn group(self) -> PatternGroup {
        match self {
            Self::BearishEngulfing | Self::ShootingStar | Self::EveningStar | Self::DarkCloudCover => {
                PatternGroup::BearishReversal
            }
            Self::BullishEngulfing | Self::Hammer | Self::MorningStar => {
                PatternGroup::BullishReversal
            }
            Self::Doji | Self::SpinningTop => PatternGroup::Indecision,
        }
    }
}

/// Body-to-range ratio below which a candle is small but not a doji.
const SMALL_BODY_RATIO: f64 = 0.3;

/// Patterns completed by the last bar of `bars`.
pub fn detect_patterns(bars: &[Bar], doji_body_ratio: f64) -> BTreeSet<CandlePattern> {
    let mut found = BTreeSet::new();
    let Some(cur) = bars.last() else {
        return found;
    };
    let range = cur.range();
    if range > 0.0 {
        let body = cur.body();
        if body <= doji_body_ratio * range {
            found.insert(CandlePattern::Doji);
        } else if body <= SMALL_BODY_RATIO * range
            && cur.upper_wick() >= body
            && cur.lower_wick() >= body
        {
            found.insert(CandlePattern::SpinningTop);
        }
    }

    let n = bars.len();
    if n >= 2 {
        let prev = &bars[n - 2];
        single_with_context(prev, cur, doji_body_ratio, &mut found);
        two_bar(prev, cur, &mut found);
    }
    if n >= 3 {
        three_bar(&bars[n - 3], &bars[n - 2], cur, &mut found);
    }
    found
}

/// Hammer after a down bar, shooting star after an up bar.
fn single_with_context(prev: &Bar, cur: &Bar, doji_body_ratio: f64, found: &mut BTreeSet<CandlePattern>) {
    let body = cur.body();
    if cur.range() <= 0.0 || body <= doji_body_ratio * cur.range() {
        return;
    }
    if prev.is_down() && cur.lower_wick() >= 2.0 * body && cur.upper_wick() <= body {
        found.insert(CandlePattern::Hammer);
    }
    if prev.is_up() && cur.upper_wick() >= 2.0 * body && cur.lower_wick() <= body {
        found.insert(CandlePattern::ShootingStar);
    }
}

fn two_bar(prev: &Bar, cur: &Bar, found: &mut BTreeSet<CandlePattern>) {
    if prev.is_up()
        && cur.is_down()
        && cur.open >= prev.close
        && cur.close <= prev.open
        && cur.body() > prev.body()
    {
        found.insert(CandlePattern::BearishEngulfing);
    }
    if prev.is_down()
        && cur.is_up()
        && cur.open <= prev.close
        && cur.close >= prev.open
        && cur.body() > prev.body()
    {
        found.insert(CandlePattern::BullishEngulfing);
    }
    let prev_mid = (prev.open + prev.close) / 2.0;
    if prev.is_up()
        && cur.is_down()
        && cur.open > prev.close
        && cur.close < prev_mid
        && cur.close > prev.open
    {
        found.insert(CandlePattern::DarkCloudCover);
    }
}

fn three_bar(first: &Bar, star: &Bar, cur: &Bar, found: &mut BTreeSet<CandlePattern>) {
    let first_mid = (first.open + first.close) / 2.0;
    let strong_first = first.range() > 0.0 && first.body() >= 0.5 * first.range();
    let small_star = star.body() <= 0.5 * first.body();
    if !(strong_first && small_star) {
        return;
    }
    if first.is_up() && cur.is_down() && cur.close < first_mid {
        found.insert(CandlePattern::EveningStar);
    }
    if first.is_down() && cur.is_up() && cur.close > first_mid {
        found.insert(CandlePattern::MorningStar);
    }
}
