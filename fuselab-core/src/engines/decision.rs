//! FinalDecisionEngine: rule-ordered synthesis of the emitted action.
//!
//! Rule order: validity Avoid → ladder exit → Add → Buy → Hold → Watch →
//! fallback Avoid. A validity Avoid is terminal.

use serde::{Deserialize, Serialize};

use super::ladder::LadderProgress;
use super::reversal::ReversalAssessment;
use super::structure::{StructureAssessment, StructureType};
use super::trend::{TrendAssessment, TrendBias};
use super::validity::{ValidityStatus, ValidityVerdict};
use super::volatility::{RiskRating, VolatilityAssessment};
use crate::config::DecisionConfig;
use crate::domain::{IndicatorSnapshot, TradeDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Add,
    Hold,
    Watch,
    Avoid,
}

/// A rule or score component that contributed to the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Driver {
    ValidityAvoid,
    LadderExit,
    LadderAdvanced,
    TrendIntact,
    BuyableSetup,
    LongStructure,
    TrendStrong,
    RestingOnTarget,
    TrendAcceptable,
    GeometrySuboptimal,
    TrendWeak,
    ReversalPenalty,
    RiskPenalty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDecision {
    pub action: Action,
    pub composite_score: f64,
    pub drivers: Vec<Driver>,
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub snapshot: &'a IndicatorSnapshot,
    pub verdict: &'a ValidityVerdict,
    pub structure: &'a StructureAssessment,
    pub trend: &'a TrendAssessment,
    pub reversal: &'a ReversalAssessment,
    pub volatility: &'a VolatilityAssessment,
    pub ladder: &'a LadderProgress,
}

#[derive(Debug, Clone, Default)]
pub struct FinalDecisionEngine {
    cfg: DecisionConfig,
    direction: TradeDirection,
}

impl FinalDecisionEngine {
    pub fn new(cfg: DecisionConfig, direction: TradeDirection) -> Self {
        Self { cfg, direction }
    }

    pub fn decide(&self, input: &DecisionInput<'_>) -> FinalDecision {
        let (action, mut drivers) = self.action(input);
        let composite_score = self.composite_score(input, &mut drivers);
        FinalDecision {
            action,
            composite_score,
            drivers,
        }
    }

    fn action(&self, input: &DecisionInput<'_>) -> (Action, Vec<Driver>) {
        let cfg = &self.cfg;
        if input.verdict.status == ValidityStatus::Avoid {
            return (Action::Avoid, vec![Driver::ValidityAvoid]);
        }
        if input.ladder.closed {
            return (Action::Watch, vec![Driver::LadderExit]);
        }

        let trend_intact = input.trend.bias != self.contradicting_bias();
        let structure_intact = input.structure.structure_type != StructureType::Rps;

        if input.ladder.advanced && trend_intact && structure_intact {
            return (Action::Add, vec![Driver::LadderAdvanced, Driver::TrendIntact]);
        }
        if input.verdict.status == ValidityStatus::Buyable
            && input.structure.structure_type.is_long_setup()
            && input.trend.score >= cfg.buy_trend_min
        {
            return (
                Action::Buy,
                vec![Driver::BuyableSetup, Driver::LongStructure, Driver::TrendStrong],
            );
        }
        // Hold: price rests between the last hit target and the next one,
        // on either ladder.
        if let Some(episode) = &input.ladder.state.episode {
            let close = input.snapshot.close;
            let holds = |level: f64| match self.direction {
                TradeDirection::Long => close >= level,
                TradeDirection::Short => close <= level,
            };
            let resting = usize::from(input.ladder.state.stage)
                .checked_sub(1)
                .is_some_and(|hit| {
                    [&episode.static_ladder, &episode.dynamic_ladder]
                        .iter()
                        .filter_map(|l| l.targets.get(hit))
                        .any(|&t| holds(t))
                });
            if resting && trend_intact && structure_intact {
                return (Action::Hold, vec![Driver::RestingOnTarget, Driver::TrendIntact]);
            }
        }
        if input.trend.score >= cfg.watch_trend_min && trend_intact {
            return (
                Action::Watch,
                vec![Driver::TrendAcceptable, Driver::GeometrySuboptimal],
            );
        }
        (Action::Avoid, vec![Driver::TrendWeak])
    }

    /// `w_t·trend + w_s·conf·10 − w_r·reversal − risk_penalty`.
    fn composite_score(&self, input: &DecisionInput<'_>, drivers: &mut Vec<Driver>) -> f64 {
        let cfg = &self.cfg;
        let penalty = match input.volatility.risk_rating {
            RiskRating::Low => cfg.risk_penalty_low,
            RiskRating::Medium => cfg.risk_penalty_medium,
            RiskRating::High => cfg.risk_penalty_high,
        };
        if input.reversal.score > 0.0 {
            drivers.push(Driver::ReversalPenalty);
        }
        if penalty > 0.0 {
            drivers.push(Driver::RiskPenalty);
        }
        cfg.trend_weight * input.trend.score + cfg.structure_weight * input.structure.confidence * 10.0
            - cfg.reversal_weight * input.reversal.score
            - penalty
    }

    fn contradicting_bias(&self) -> TrendBias {
        match self.direction {
            TradeDirection::Long => TrendBias::Bearish,
            TradeDirection::Short => TrendBias::Bullish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::test_support::snapshot;
    use crate::engines::ladder::test_support::active_ladder;
    use crate::engines::ladder::{LadderState, TargetLevel};
    use crate::engines::reversal::ReversalEngine;
    use crate::engines::structure::StructureClassifier;
    use crate::engines::trend::TrendEngine;
    use crate::engines::validity::{CprContext, ValidityReason, VwapContext};
    use crate::engines::volatility::VolatilityEngine;
    use crate::features::{ObvTrend, SwingSummary, WindowFeatures};
    use std::collections::BTreeSet;

    struct Case {
        snap: IndicatorSnapshot,
        status: ValidityStatus,
        ladder: LadderProgress,
        structure: StructureAssessment,
    }

    impl Case {
        fn new() -> Self {
            let snap = snapshot();
            let features = WindowFeatures {
                swings: SwingSummary {
                    last_high: Some(102.0),
                    prev_high: Some(101.0),
                    last_low: Some(98.0),
                    prev_low: Some(96.0),
                },
                obv_trend: ObvTrend::Rising,
                vwap_reclaimed: true,
                ..WindowFeatures::default()
            };
            let structure = StructureClassifier::default().classify(&snap, &features);
            let state = LadderState::default();
            Self {
                snap,
                status: ValidityStatus::Buyable,
                ladder: LadderProgress {
                    state: state.clone(),
                    reported: state,
                    advanced: false,
                    reset: false,
                    closed: false,
                },
                structure,
            }
        }

        fn decide(&self) -> FinalDecision {
            let trend = TrendEngine::default().assess(&self.snap, &self.structure, &[]);
            let reversal = ReversalEngine::default().assess(&self.snap, &WindowFeatures::default());
            let volatility = VolatilityEngine::default().assess(&self.snap);
            let verdict = ValidityVerdict {
                status: self.status,
                reasons: if self.status == ValidityStatus::Avoid {
                    vec![ValidityReason::InsideCpr]
                } else {
                    vec![]
                },
                flags: BTreeSet::new(),
                vwap_context: VwapContext::Above,
                cpr_context: CprContext::AboveCpr,
                stop_reference: None,
            };
            FinalDecisionEngine::default().decide(&DecisionInput {
                snapshot: &self.snap,
                verdict: &verdict,
                structure: &self.structure,
                trend: &trend,
                reversal: &reversal,
                volatility: &volatility,
                ladder: &self.ladder,
            })
        }
    }

    #[test]
    fn buyable_sps_with_strong_trend_buys() {
        let d = Case::new().decide();
        assert_eq!(d.action, Action::Buy);
        assert_eq!(d.drivers[0], Driver::BuyableSetup);
    }

    #[test]
    fn avoid_verdict_is_terminal() {
        let mut case = Case::new();
        case.status = ValidityStatus::Avoid;
        case.ladder.advanced = true;
        let d = case.decide();
        assert_eq!(d.action, Action::Avoid);
        assert_eq!(d.drivers[0], Driver::ValidityAvoid);
    }

    #[test]
    fn advance_adds() {
        let mut case = Case::new();
        case.ladder.advanced = true;
        assert_eq!(case.decide().action, Action::Add);
    }

    #[test]
    fn closed_episode_exits_to_watch() {
        let mut case = Case::new();
        case.ladder.advanced = true;
        case.ladder.closed = true;
        let d = case.decide();
        assert_eq!(d.action, Action::Watch);
        assert_eq!(d.drivers[0], Driver::LadderExit);
    }

    fn stage_one_case(close: f64) -> Case {
        let mut case = Case::new();
        case.status = ValidityStatus::Watch;
        let mut state = active_ladder();
        state.stage = 1;
        state.hits = TargetLevel::up_to(1);
        case.ladder.state = state;
        case.snap.close = close;
        case
    }

    fn lowest_t1(case: &Case) -> f64 {
        let e = case.ladder.state.episode.as_ref().unwrap();
        e.static_ladder.targets[0].min(e.dynamic_ladder.targets[0])
    }

    #[test]
    fn holds_between_hit_and_next_target() {
        let mut case = stage_one_case(0.0);
        case.snap.close = lowest_t1(&case) + 0.01;
        let d = case.decide();
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.drivers[0], Driver::RestingOnTarget);
    }

    #[test]
    fn slipping_below_hit_target_is_not_hold() {
        let mut case = stage_one_case(0.0);
        let entry = case.ladder.state.episode.as_ref().unwrap().entry;
        let t1 = lowest_t1(&case);
        assert!(t1 > entry);
        case.snap.close = (entry + t1) / 2.0;
        assert_eq!(case.decide().action, Action::Watch);
    }

    #[test]
    fn watch_when_trend_acceptable_but_not_buyable() {
        let mut case = Case::new();
        case.status = ValidityStatus::Watch;
        let d = case.decide();
        assert_eq!(d.action, Action::Watch);
        assert!(d.drivers.contains(&Driver::GeometrySuboptimal));
    }

    #[test]
    fn composite_score_is_transparent() {
        let case = Case::new();
        let d = case.decide();
        // trend 9 + conf*10 - reversal 0 - medium risk 0.5
        let expected = 9.0 + case.structure.confidence * 10.0 - 0.5;
        assert!((d.composite_score - expected).abs() < 1e-9);
        assert!(d.drivers.contains(&Driver::RiskPenalty));
    }
}
