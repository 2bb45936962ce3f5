//! TradeValidityEngine: the single authoritative veto.
//!
//! Hard vetoes are evaluated in a fixed order and all matches are collected.
//! Any veto makes the verdict Avoid; the final decision cannot override it.
//! Without a veto the verdict is Buyable or Watch depending on geometry,
//! structure and the reversal/divergence downgrades.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::reversal::ReversalAssessment;
use super::structure::{StructureAssessment, StructureType};
use super::trend::{TrendAssessment, TrendBias};
use super::volatility::{CprWidthClass, RiskRating, VolRegime, VolatilityAssessment};
use crate::config::ValidityConfig;
use crate::domain::{IndicatorSnapshot, TradeDirection};
use crate::features::{Divergence, WindowFeatures};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityStatus {
    Buyable,
    Watch,
    Avoid,
}

/// Reason codes, in veto evaluation order within each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityReason {
    // hard vetoes
    SlBreach,
    CircuitLimit,
    CprUltraWide,
    InsideCpr,
    Overextended,
    TrendContradiction,
    Illiquid,
    MissingOhlc,
    ReversalExhaustion,
    // watch-level
    BelowVwap,
    BelowCprMid,
    WeakStructure,
    TrendBearish,
    ReversalCaution,
    VolumeDivergence,
    // evaluation errors
    InsufficientHistory,
    StaleData,
    DataIntegrity,
    EvaluationFault,
}

impl ValidityReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::SlBreach => "sl_breach",
            Self::CircuitLimit => "circuit_limit",
            Self::CprUltraWide => "cpr_ultra_wide",
            Self::InsideCpr => "inside_cpr",
            Self::Overextended => "overextended",
            Self::TrendContradiction => "trend_contradiction",
            Self::Illiquid => "illiquid",
            Self::MissingOhlc => "missing_ohlc",
            Self::ReversalExhaustion => "reversal_exhaustion",
            Self::BelowVwap => "below_vwap",
            Self::BelowCprMid => "below_cpr_mid",
            Self::WeakStructure => "weak_structure",
            Self::TrendBearish => "trend_bearish",
            Self::ReversalCaution => "reversal_caution",
            Self::VolumeDivergence => "volume_divergence",
            Self::InsufficientHistory => "insufficient_history",
            Self::StaleData => "stale_data",
            Self::DataIntegrity => "data_integrity",
            Self::EvaluationFault => "evaluation_fault",
        }
    }

    pub fn is_veto(self) -> bool {
        matches!(
            self,
            Self::SlBreach
                | Self::CircuitLimit
                | Self::CprUltraWide
                | Self::InsideCpr
                | Self::Overextended
                | Self::TrendContradiction
                | Self::Illiquid
                | Self::MissingOhlc
                | Self::ReversalExhaustion
        )
    }

    /// Vetoes that invalidate an open ladder episode.
    pub fn is_structural_invalidation(self) -> bool {
        matches!(self, Self::SlBreach | Self::TrendContradiction)
    }
}

impl fmt::Display for ValidityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityFlag {
    AboveVwap,
    AboveCprMid,
    VwapReclaimed,
    CprReclaimed,
    CautionStructure,
    HighRisk,
    HyperVolatility,
}

/// Price relative to VWAP, in the trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VwapContext {
    Above,
    At,
    Below,
}

/// Price relative to the CPR band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CprContext {
    AboveCpr,
    InsideCpr,
    BelowCpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidityVerdict {
    pub status: ValidityStatus,
    pub reasons: Vec<ValidityReason>,
    pub flags: BTreeSet<ValidityFlag>,
    pub vwap_context: VwapContext,
    pub cpr_context: CprContext,
    /// The stop level the breach check ran against, if any.
    pub stop_reference: Option<f64>,
}

impl ValidityVerdict {
    pub fn is_avoid(&self) -> bool {
        self.status == ValidityStatus::Avoid
    }

    pub fn is_structural_invalidation(&self) -> bool {
        self.is_avoid() && self.reasons.iter().any(|r| r.is_structural_invalidation())
    }
}

/// Everything the gate reads. `active_stop` is the stop of the committed
/// ladder episode from the previous cycle, if one is open.
#[derive(Debug, Clone, Copy)]
pub struct ValidityInput<'a> {
    pub snapshot: &'a IndicatorSnapshot,
    pub features: &'a WindowFeatures,
    pub structure: &'a StructureAssessment,
    pub trend: &'a TrendAssessment,
    pub reversal: &'a ReversalAssessment,
    pub volatility: &'a VolatilityAssessment,
    pub active_stop: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TradeValidityEngine {
    cfg: ValidityConfig,
}

impl TradeValidityEngine {
    pub fn new(cfg: ValidityConfig) -> Self {
        Self { cfg }
    }

    pub fn direction(&self) -> TradeDirection {
        self.cfg.direction
    }

    pub fn evaluate(&self, input: &ValidityInput<'_>) -> ValidityVerdict {
        let cfg = &self.cfg;
        let dir = cfg.direction;
        let snap = input.snapshot;
        let close = snap.close;

        let stop_reference = input.active_stop.or(match dir {
            TradeDirection::Long => input.features.swings.last_low,
            TradeDirection::Short => input.features.swings.last_high,
        });

        let mut vetoes = Vec::new();

        // 1. stop-loss geometry
        if let Some(stop) = stop_reference {
            if dir.is_beyond(stop, close) {
                vetoes.push(ValidityReason::SlBreach);
            }
        }

        // 2. circuit proximity
        if let Some(limits) = snap.circuit {
            let near = |limit: f64| (limit - close).abs() / close * 100.0 <= cfg.circuit_proximity_pct;
            if near(limits.upper) || near(limits.lower) {
                vetoes.push(ValidityReason::CircuitLimit);
            }
        }

        // 3. CPR resolution
        if input.volatility.cpr_width_class == CprWidthClass::UltraWide {
            vetoes.push(ValidityReason::CprUltraWide);
        }
        if snap.cpr.contains_strictly(close) {
            vetoes.push(ValidityReason::InsideCpr);
        }

        // 4. overextension from VWAP or the CPR pivot
        let max_dist = cfg.overextension_atr_mult * snap.atr_intraday;
        if (close - snap.vwap).abs() > max_dist || (close - snap.cpr.pivot).abs() > max_dist {
            vetoes.push(ValidityReason::Overextended);
        }

        // 5. trend against the trade
        let contradicting = match dir {
            TradeDirection::Long => TrendBias::Bearish,
            TradeDirection::Short => TrendBias::Bullish,
        };
        if input.trend.bias == contradicting {
            vetoes.push(ValidityReason::TrendContradiction);
        }

        // 6. tradability
        if !snap.liquid {
            vetoes.push(ValidityReason::Illiquid);
        }
        if !ohlc_complete(snap) {
            vetoes.push(ValidityReason::MissingOhlc);
        }

        // 7. exhaustion
        if input.reversal.score > cfg.exhaustion_score {
            vetoes.push(ValidityReason::ReversalExhaustion);
        }

        let beyond_vwap = dir.is_beyond(close, snap.vwap);
        let beyond_pivot = dir.is_beyond(close, snap.cpr.pivot);
        let flags = self.flags(input, beyond_vwap, beyond_pivot);
        let vwap_context = if close == snap.vwap {
            VwapContext::At
        } else if beyond_vwap {
            VwapContext::Above
        } else {
            VwapContext::Below
        };
        let cpr_context = if close > snap.cpr.tc {
            CprContext::AboveCpr
        } else if close < snap.cpr.bc {
            CprContext::BelowCpr
        } else {
            CprContext::InsideCpr
        };

        let (status, reasons) = if !vetoes.is_empty() {
            (ValidityStatus::Avoid, vetoes)
        } else {
            self.grade(input, beyond_vwap, beyond_pivot)
        };

        ValidityVerdict {
            status,
            reasons,
            flags,
            vwap_context,
            cpr_context,
            stop_reference,
        }
    }

    /// Buyable or Watch, for a setup that passed every veto.
    fn grade(
        &self,
        input: &ValidityInput<'_>,
        beyond_vwap: bool,
        beyond_pivot: bool,
    ) -> (ValidityStatus, Vec<ValidityReason>) {
        let cfg = &self.cfg;
        let mut reasons = Vec::new();
        if !beyond_vwap {
            reasons.push(ValidityReason::BelowVwap);
        }
        if !beyond_pivot {
            reasons.push(ValidityReason::BelowCprMid);
        }
        if !input.structure.structure_type.is_long_setup() {
            reasons.push(ValidityReason::WeakStructure);
        }

        if reasons.is_empty() {
            let score = input.reversal.score;
            let reclaimed = input.features.vwap_reclaimed || input.features.cpr_reclaimed;
            if score > cfg.caution_score && score <= cfg.exhaustion_score && !reclaimed {
                reasons.push(ValidityReason::ReversalCaution);
            }
            let against = match cfg.direction {
                TradeDirection::Long => Divergence::Bearish,
                TradeDirection::Short => Divergence::Bullish,
            };
            if input.features.divergence == against {
                reasons.push(ValidityReason::VolumeDivergence);
            }
            if reasons.is_empty() {
                return (ValidityStatus::Buyable, reasons);
            }
        }

        if self.frame_against(input.trend) {
            reasons.push(ValidityReason::TrendBearish);
        }
        (ValidityStatus::Watch, reasons)
    }

    /// Some scored frame leans against the trade although the composite does not.
    fn frame_against(&self, trend: &TrendAssessment) -> bool {
        let against = match self.cfg.direction {
            TradeDirection::Long => TrendBias::Bearish,
            TradeDirection::Short => TrendBias::Bullish,
        };
        [trend.bias_daily, trend.bias_weekly, trend.bias_monthly]
            .iter()
            .flatten()
            .any(|&b| b == against)
            || trend.primary.bias == against
    }

    fn flags(&self, input: &ValidityInput<'_>, beyond_vwap: bool, beyond_pivot: bool) -> BTreeSet<ValidityFlag> {
        let mut flags = BTreeSet::new();
        if beyond_vwap {
            flags.insert(ValidityFlag::AboveVwap);
        }
        if beyond_pivot {
            flags.insert(ValidityFlag::AboveCprMid);
        }
        if input.features.vwap_reclaimed {
            flags.insert(ValidityFlag::VwapReclaimed);
        }
        if input.features.cpr_reclaimed {
            flags.insert(ValidityFlag::CprReclaimed);
        }
        if input.structure.structure_type == StructureType::Rps {
            flags.insert(ValidityFlag::CautionStructure);
        }
        if input.volatility.risk_rating == RiskRating::High {
            flags.insert(ValidityFlag::HighRisk);
        }
        if input.volatility.regime == VolRegime::Hyper {
            flags.insert(ValidityFlag::HyperVolatility);
        }
        flags
    }
}

fn ohlc_complete(snap: &IndicatorSnapshot) -> bool {
    let prices = [snap.open, snap.high, snap.low, snap.close];
    prices.iter().all(|p| p.is_finite() && *p > 0.0)
        && snap.volume.is_finite()
        && snap.high >= snap.low
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::test_support::snapshot;
    use crate::domain::CircuitLimits;
    use crate::engines::reversal::ReversalEngine;
    use crate::engines::structure::StructureClassifier;
    use crate::engines::trend::TrendEngine;
    use crate::engines::volatility::VolatilityEngine;
    use crate::features::{ObvTrend, SwingSummary};

    struct Fixture {
        snap: IndicatorSnapshot,
        features: WindowFeatures,
        active_stop: Option<f64>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                snap: snapshot(),
                features: WindowFeatures {
                    bar_count: 60,
                    swings: SwingSummary {
                        last_high: Some(102.0),
                        prev_high: Some(101.0),
                        last_low: Some(98.0),
                        prev_low: Some(96.0),
                    },
                    obv_trend: ObvTrend::Rising,
                    vwap_reclaimed: true,
                    ..WindowFeatures::default()
                },
                active_stop: None,
            }
        }

        fn verdict(&self) -> ValidityVerdict {
            self.verdict_with(&TradeValidityEngine::default(), None)
        }

        fn verdict_with(&self, engine: &TradeValidityEngine, reversal_score: Option<f64>) -> ValidityVerdict {
            let structure = StructureClassifier::default().classify(&self.snap, &self.features);
            let trend = TrendEngine::default().assess(&self.snap, &structure, &[]);
            let mut reversal = ReversalEngine::default().assess(&self.snap, &self.features);
            if let Some(score) = reversal_score {
                reversal.score = score;
            }
            let volatility = VolatilityEngine::default().assess(&self.snap);
            engine.evaluate(&ValidityInput {
                snapshot: &self.snap,
                features: &self.features,
                structure: &structure,
                trend: &trend,
                reversal: &reversal,
                volatility: &volatility,
                active_stop: self.active_stop,
            })
        }
    }

    #[test]
    fn clean_setup_is_buyable() {
        let v = Fixture::new().verdict();
        assert_eq!(v.status, ValidityStatus::Buyable);
        assert!(v.reasons.is_empty());
        assert!(v.flags.contains(&ValidityFlag::AboveVwap));
        assert!(v.flags.contains(&ValidityFlag::AboveCprMid));
        assert_eq!(v.vwap_context, VwapContext::Above);
        assert_eq!(v.cpr_context, CprContext::AboveCpr);
    }

    #[test]
    fn stop_breach_vetoes() {
        let mut fx = Fixture::new();
        fx.active_stop = Some(100.5);
        let v = fx.verdict();
        assert_eq!(v.status, ValidityStatus::Avoid);
        assert_eq!(v.reasons[0], ValidityReason::SlBreach);
        assert!(v.is_structural_invalidation());
    }

    #[test]
    fn swing_low_is_the_stop_without_an_episode() {
        let mut fx = Fixture::new();
        fx.features.swings.last_low = Some(100.2);
        let v = fx.verdict();
        assert_eq!(v.stop_reference, Some(100.2));
        assert!(v.reasons.contains(&ValidityReason::SlBreach));
    }

    #[test]
    fn inside_cpr_vetoes() {
        let mut fx = Fixture::new();
        fx.snap.cpr.tc = 100.5;
        fx.snap.cpr.pivot = 100.1;
        fx.snap.cpr.bc = 99.7;
        let v = fx.verdict();
        assert_eq!(v.status, ValidityStatus::Avoid);
        assert!(v.reasons.contains(&ValidityReason::InsideCpr));
        assert_eq!(v.cpr_context, CprContext::InsideCpr);
        assert!(!v.is_structural_invalidation());
    }

    #[test]
    fn overextension_from_vwap() {
        let mut fx = Fixture::new();
        fx.snap.vwap = 100.0 - 2.2 * fx.snap.atr_intraday;
        let v = fx.verdict();
        assert!(v.reasons.contains(&ValidityReason::Overextended));
    }

    #[test]
    fn all_vetoes_are_collected() {
        let mut fx = Fixture::new();
        fx.snap.liquid = false;
        fx.snap.circuit = Some(CircuitLimits {
            upper: 100.5,
            lower: 90.0,
        });
        let v = fx.verdict_with(&TradeValidityEngine::default(), Some(2.8));
        assert_eq!(
            v.reasons,
            vec![
                ValidityReason::CircuitLimit,
                ValidityReason::Illiquid,
                ValidityReason::ReversalExhaustion
            ]
        );
    }

    #[test]
    fn reversal_caution_downgrades_unless_reclaimed() {
        let mut fx = Fixture::new();
        let v = fx.verdict_with(&TradeValidityEngine::default(), Some(2.0));
        assert_eq!(v.status, ValidityStatus::Buyable);

        fx.features.vwap_reclaimed = false;
        let v = fx.verdict_with(&TradeValidityEngine::default(), Some(2.0));
        assert_eq!(v.status, ValidityStatus::Watch);
        assert_eq!(v.reasons, vec![ValidityReason::ReversalCaution]);
    }

    #[test]
    fn bearish_divergence_downgrades() {
        let mut fx = Fixture::new();
        fx.features.divergence = Divergence::Bearish;
        let v = fx.verdict();
        assert_eq!(v.status, ValidityStatus::Watch);
        assert_eq!(v.reasons, vec![ValidityReason::VolumeDivergence]);
    }

    #[test]
    fn below_vwap_is_watch() {
        let mut fx = Fixture::new();
        fx.snap.vwap = 100.4;
        let v = fx.verdict();
        assert_eq!(v.status, ValidityStatus::Watch);
        assert!(v.reasons.contains(&ValidityReason::BelowVwap));
    }

    #[test]
    fn short_direction_mirrors_stop_geometry() {
        let mut fx = Fixture::new();
        fx.features.swings.last_high = Some(99.0);
        let engine = TradeValidityEngine::new(ValidityConfig {
            direction: TradeDirection::Short,
            ..ValidityConfig::default()
        });
        let v = fx.verdict_with(&engine, None);
        assert!(v.reasons.contains(&ValidityReason::SlBreach));
        // a bullish trend contradicts a short
        assert!(v.reasons.contains(&ValidityReason::TrendContradiction));
    }

    #[test]
    fn codes_match_serde_names() {
        for reason in [
            ValidityReason::SlBreach,
            ValidityReason::CprUltraWide,
            ValidityReason::MissingOhlc,
            ValidityReason::VolumeDivergence,
            ValidityReason::InsufficientHistory,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.code()));
        }
    }
}
