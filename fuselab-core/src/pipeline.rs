//! PipelineCoordinator: one (symbol, timeframe, bar) evaluation.
//!
//! `evaluate` is a pure function of (bar window, snapshot, higher frames,
//! prior ladder state). It performs no I/O. Committing the returned ladder
//! state is the caller's job.

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::config::FusionConfig;
use crate::domain::{Bar, IndicatorSnapshot, Timeframe, TradeDirection};
use crate::engines::{
    Action, DecisionInput, Driver, FinalDecision, FinalDecisionEngine, FrameInput, LadderEngine,
    LadderState, ReversalEngine, StructureClassifier, TradeValidityEngine, TrendEngine,
    ValidityInput, VolatilityEngine,
};
use crate::error::EvaluationError;
use crate::features::{SwingSummary, WindowFeatures};
use crate::fingerprint::DecisionFingerprint;
use crate::record::{OutputRecord, RecordParts};

/// A higher-timeframe frame for the trend composite.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameData {
    pub snapshot: IndicatorSnapshot,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HigherFrames {
    pub daily: Option<FrameData>,
    pub weekly: Option<FrameData>,
    pub monthly: Option<FrameData>,
}

impl HigherFrames {
    fn iter(&self) -> impl Iterator<Item = &FrameData> {
        [&self.daily, &self.weekly, &self.monthly]
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationInput {
    pub snapshot: IndicatorSnapshot,
    /// Bounded history ending at the snapshot's bar.
    pub bars: Vec<Bar>,
    /// Evaluation clock, for the staleness bound.
    pub as_of: NaiveDateTime,
    pub higher: HigherFrames,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub record: OutputRecord,
    pub decision: FinalDecision,
    pub fingerprint: DecisionFingerprint,
    /// State to commit for this key.
    pub ladder: LadderState,
    pub error: Option<EvaluationError>,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    cfg: FusionConfig,
    structure: StructureClassifier,
    trend: TrendEngine,
    reversal: ReversalEngine,
    volatility: VolatilityEngine,
    validity: TradeValidityEngine,
    ladder: LadderEngine,
    decision: FinalDecisionEngine,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

impl Pipeline {
    pub fn new(cfg: FusionConfig) -> Self {
        Self {
            structure: StructureClassifier::new(cfg.structure.clone()),
            trend: TrendEngine::new(cfg.trend.clone()),
            reversal: ReversalEngine::new(cfg.reversal.clone(), cfg.features.extended_run_bars),
            volatility: VolatilityEngine::new(cfg.volatility.clone(), cfg.cpr.clone()),
            validity: TradeValidityEngine::new(cfg.validity.clone()),
            ladder: LadderEngine::new(cfg.ladder.clone()),
            decision: FinalDecisionEngine::new(cfg.decision.clone(), cfg.validity.direction),
            cfg,
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.cfg
    }

    pub fn direction(&self) -> TradeDirection {
        self.cfg.validity.direction
    }

    /// Bars of history the evaluation requires for `input`'s timeframe.
    pub fn required_bars(&self, input: &EvaluationInput) -> usize {
        self.cfg.lookback.min_bars(input.snapshot.timeframe)
    }

    pub fn evaluate(&self, input: &EvaluationInput, prior: &LadderState) -> Evaluation {
        let snap = &input.snapshot;
        if let Err(err) = self.check(input) {
            debug!(symbol = %snap.symbol, timeframe = %snap.timeframe, error = %err, "evaluation rejected");
            return self.rejected(snap, err, prior);
        }

        let prior = match prior.validate() {
            Ok(()) => prior.clone(),
            Err(detail) => {
                warn!(symbol = %snap.symbol, timeframe = %snap.timeframe, %detail, "ladder state corrupted, resetting");
                self.ladder.reset()
            }
        };

        let features = WindowFeatures::extract(&input.bars, snap, &self.cfg);
        let structure = self.structure.classify(snap, &features);

        let span = self.cfg.features.fractal_span;
        let lookback = &self.cfg.lookback;
        let frames: Vec<(&IndicatorSnapshot, SwingSummary)> = input
            .higher
            .iter()
            .filter(|f| {
                let need = lookback.min_bars(f.snapshot.timeframe);
                match f.snapshot.first_invalid_field(need) {
                    None => true,
                    Some(field) => {
                        debug!(timeframe = %f.snapshot.timeframe, field, "higher frame skipped");
                        false
                    }
                }
            })
            .map(|f| (&f.snapshot, SwingSummary::from_bars(&f.bars, span)))
            .collect();
        let frame_inputs: Vec<FrameInput<'_>> = frames
            .iter()
            .map(|&(snapshot, swings)| FrameInput { snapshot, swings })
            .collect();
        let trend = self.trend.assess(snap, &structure, &frame_inputs);

        let reversal = self.reversal.assess(snap, &features);
        let volatility = self.volatility.assess(snap);
        let verdict = self.validity.evaluate(&ValidityInput {
            snapshot: snap,
            features: &features,
            structure: &structure,
            trend: &trend,
            reversal: &reversal,
            volatility: &volatility,
            active_stop: prior.active_stop(),
        });

        let progress = self.ladder.progress(&prior, snap, &verdict);
        let decision = self.decision.decide(&DecisionInput {
            snapshot: snap,
            verdict: &verdict,
            structure: &structure,
            trend: &trend,
            reversal: &reversal,
            volatility: &volatility,
            ladder: &progress,
        });
        let committed =
            self.ladder
                .activate(&progress.state, snap, decision.action, &volatility, self.direction());
        let reported = if committed != progress.state {
            &committed
        } else {
            &progress.reported
        };

        let record = OutputRecord::from_parts(RecordParts {
            symbol: &snap.symbol,
            timeframe: snap.timeframe,
            timestamp: snap.timestamp,
            vwap_dist_atr: snap.vwap_dist_atr(),
            features: &features,
            structure: &structure,
            trend: &trend,
            reversal: &reversal,
            volatility: &volatility,
            verdict: &verdict,
            decision: &decision,
            ladder: reported,
        });
        let fingerprint = DecisionFingerprint::of(&decision);
        debug!(
            symbol = %snap.symbol,
            timeframe = %snap.timeframe,
            action = ?decision.action,
            stage = committed.stage,
            fingerprint = fingerprint.short(),
            "evaluated"
        );

        Evaluation {
            record,
            decision,
            fingerprint,
            ladder: committed,
            error: None,
        }
    }

    /// History, staleness, integrity, in that order.
    fn check(&self, input: &EvaluationInput) -> Result<(), EvaluationError> {
        let snap = &input.snapshot;
        let need = self.required_bars(input);
        let have = input.bars.len();
        if have < need {
            return Err(EvaluationError::MissingData {
                timeframe: snap.timeframe,
                have,
                need,
            });
        }

        let max_age = self.cfg.staleness.max_age(snap.timeframe);
        if input.as_of - snap.timestamp > max_age {
            return Err(EvaluationError::StaleData {
                snapshot_at: snap.timestamp,
                as_of: input.as_of,
                max_age_minutes: max_age.num_minutes(),
            });
        }

        if let Some(field) = snap.first_invalid_field(need) {
            return Err(EvaluationError::DataIntegrity {
                field: field.to_string(),
            });
        }
        Ok(())
    }

    /// Avoid with the error's reason; ladder state passes through untouched.
    pub fn rejected(&self, snap: &IndicatorSnapshot, err: EvaluationError, prior: &LadderState) -> Evaluation {
        self.unavailable(&snap.symbol, snap.timeframe, snap.timestamp, err, prior)
    }

    /// Like [`Pipeline::rejected`] for a series that produced no snapshot.
    pub fn unavailable(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        timestamp: NaiveDateTime,
        err: EvaluationError,
        prior: &LadderState,
    ) -> Evaluation {
        let record = OutputRecord::avoid(symbol, timeframe, timestamp, err.reason(), prior);
        let decision = FinalDecision {
            action: Action::Avoid,
            composite_score: 0.0,
            drivers: vec![Driver::ValidityAvoid],
        };
        Evaluation {
            fingerprint: DecisionFingerprint::of(&decision),
            record,
            decision,
            ladder: prior.clone(),
            error: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::test_support::snapshot;
    use crate::engines::ValidityReason;
    use crate::indicators::make_bars;

    fn input(bars: usize) -> EvaluationInput {
        let snap = snapshot();
        let closes: Vec<f64> = (0..bars).map(|i| 90.0 + i as f64 * 0.05).collect();
        EvaluationInput {
            as_of: snap.timestamp,
            snapshot: snap,
            bars: make_bars(&closes),
            higher: HigherFrames::default(),
        }
    }

    #[test]
    fn short_history_is_insufficient() {
        let eval = Pipeline::default().evaluate(&input(50), &LadderState::default());
        assert_eq!(eval.record.validity_reasons, vec![ValidityReason::InsufficientHistory]);
        assert_eq!(eval.record.action, Action::Avoid);
        assert!(matches!(eval.error, Some(EvaluationError::MissingData { have: 50, need: 200, .. })));
    }

    #[test]
    fn stale_snapshot_keeps_ladder() {
        let mut inp = input(220);
        inp.as_of = inp.snapshot.timestamp + chrono::Duration::days(10);
        let prior = crate::engines::ladder::test_support::active_ladder();
        let eval = Pipeline::default().evaluate(&inp, &prior);
        assert_eq!(eval.record.validity_reasons, vec![ValidityReason::StaleData]);
        assert_eq!(eval.ladder, prior);
    }

    #[test]
    fn nan_field_is_data_integrity() {
        let mut inp = input(220);
        inp.snapshot.rsi14 = f64::NAN;
        let eval = Pipeline::default().evaluate(&inp, &LadderState::default());
        assert_eq!(eval.record.reason_codes(), vec!["data_integrity"]);
        assert_eq!(
            eval.error,
            Some(EvaluationError::DataIntegrity {
                field: "rsi14".into()
            })
        );
    }

    #[test]
    fn ema200_is_required_only_where_lookback_covers_it() {
        let mut hourly = input(60);
        hourly.snapshot.timeframe = Timeframe::H1;
        hourly.snapshot.ema200 = f64::NAN;
        let eval = Pipeline::default().evaluate(&hourly, &LadderState::default());
        assert!(eval.error.is_none());
        assert!(eval.record.trend_score.is_some());

        let mut daily = input(220);
        daily.snapshot.ema200 = f64::NAN;
        let eval = Pipeline::default().evaluate(&daily, &LadderState::default());
        assert_eq!(
            eval.error,
            Some(EvaluationError::DataIntegrity {
                field: "ema200".into()
            })
        );
    }

    #[test]
    fn higher_frames_without_ema200_still_count() {
        let mut inp = input(220);
        let mut weekly = snapshot();
        weekly.timeframe = Timeframe::Weekly;
        weekly.ema200 = f64::NAN;
        let mut monthly = snapshot();
        monthly.timeframe = Timeframe::Monthly;
        monthly.ema50 = f64::NAN;
        monthly.ema200 = f64::NAN;
        let closes: Vec<f64> = (0..60).map(|i| 90.0 + i as f64 * 0.2).collect();
        inp.higher.weekly = Some(FrameData {
            snapshot: weekly,
            bars: make_bars(&closes),
        });
        inp.higher.monthly = Some(FrameData {
            snapshot: monthly,
            bars: make_bars(&closes[..30]),
        });
        let eval = Pipeline::default().evaluate(&inp, &LadderState::default());
        let composite = eval.record.trend_composite.unwrap();
        assert!(!composite.contains("W:n/a"), "{composite}");
        assert!(!composite.contains("M:n/a"), "{composite}");
    }

    #[test]
    fn corrupted_prior_state_is_reset() {
        let inp = input(220);
        let corrupt = LadderState {
            stage: 2,
            hits: Default::default(),
            episode: None,
        };
        let eval = Pipeline::default().evaluate(&inp, &corrupt);
        assert!(eval.error.is_none());
        assert!(eval.ladder.validate().is_ok());
    }

    #[test]
    fn identical_inputs_identical_fingerprints() {
        let inp = input(220);
        let p = Pipeline::default();
        let a = p.evaluate(&inp, &LadderState::default());
        let b = p.evaluate(&inp, &LadderState::default());
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.record, b.record);
    }
}
