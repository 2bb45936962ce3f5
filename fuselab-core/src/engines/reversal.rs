//! ReversalEngine: low-weight exhaustion scoring, capped at 3.0.
//!
//! Never vetoes on its own. The validity gate reads the score against its
//! caution and exhaustion thresholds.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::ReversalConfig;
use crate::domain::IndicatorSnapshot;
use crate::features::{PatternGroup, WindowFeatures};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalTag {
    RsiOverbought,
    RsiOversold,
    ObvDistribution,
    BearishPattern,
    VolumeSpikeIndecision,
    WideRangeAfterRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalBias {
    Overbought,
    Oversold,
    Distribution,
    Accumulation,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalAssessment {
    /// In [0, 3].
    pub score: f64,
    pub bias: ReversalBias,
    pub tags: BTreeSet<ReversalTag>,
}

#[derive(Debug, Clone)]
pub struct ReversalEngine {
    cfg: ReversalConfig,
    extended_run_bars: usize,
}

impl Default for ReversalEngine {
    fn default() -> Self {
        Self::new(ReversalConfig::default(), 5)
    }
}

impl ReversalEngine {
    pub fn new(cfg: ReversalConfig, extended_run_bars: usize) -> Self {
        Self {
            cfg,
            extended_run_bars,
        }
    }

    pub fn assess(&self, snap: &IndicatorSnapshot, features: &WindowFeatures) -> ReversalAssessment {
        let cfg = &self.cfg;
        let mut tags = BTreeSet::new();
        let mut score = 0.0;

        if snap.rsi14 >= cfg.rsi_overbought {
            tags.insert(ReversalTag::RsiOverbought);
            score += cfg.rsi_extreme_weight;
        } else if snap.rsi14 <= cfg.rsi_oversold {
            tags.insert(ReversalTag::RsiOversold);
            score += cfg.rsi_extreme_weight;
        }
        if features.obv_falling_bars > cfg.obv_distribution_bars {
            tags.insert(ReversalTag::ObvDistribution);
            score += cfg.obv_distribution_weight;
        }
        if features.has_group(PatternGroup::BearishReversal) {
            tags.insert(ReversalTag::BearishPattern);
            score += cfg.pattern_weight;
        }
        if features.volume_spike && features.has_group(PatternGroup::Indecision) {
            tags.insert(ReversalTag::VolumeSpikeIndecision);
            score += cfg.spike_indecision_weight;
        }
        if features.wide_range && features.extended_run(self.extended_run_bars) {
            tags.insert(ReversalTag::WideRangeAfterRun);
            score += cfg.wide_range_run_weight;
        }

        let score = if score.is_finite() {
            score.clamp(0.0, cfg.max_score.min(3.0))
        } else {
            0.0
        };
        ReversalAssessment {
            score,
            bias: bias(&tags, features),
            tags,
        }
    }
}

/// Exhaustion patterns first, then pure RSI extremes, then OBV alone.
fn bias(tags: &BTreeSet<ReversalTag>, features: &WindowFeatures) -> ReversalBias {
    let has = |t: ReversalTag| tags.contains(&t);
    let climax = has(ReversalTag::VolumeSpikeIndecision) || has(ReversalTag::WideRangeAfterRun);

    let bearish_exhaustion = has(ReversalTag::BearishPattern) || (climax && features.run_up);
    let bullish_exhaustion = (climax && !features.run_up)
        || (has(ReversalTag::RsiOversold) && features.has_group(PatternGroup::BullishReversal));

    if bearish_exhaustion {
        if has(ReversalTag::RsiOverbought) {
            ReversalBias::Overbought
        } else {
            ReversalBias::Distribution
        }
    } else if bullish_exhaustion {
        if has(ReversalTag::RsiOversold) {
            ReversalBias::Oversold
        } else {
            ReversalBias::Accumulation
        }
    } else if has(ReversalTag::RsiOverbought) {
        ReversalBias::Overbought
    } else if has(ReversalTag::RsiOversold) {
        ReversalBias::Oversold
    } else if has(ReversalTag::ObvDistribution) {
        ReversalBias::Distribution
    } else {
        ReversalBias::Neutral
    }
}
