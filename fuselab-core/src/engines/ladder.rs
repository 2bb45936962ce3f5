//! LadderEngine: per-key target/stop state machine.
//!
//! Two phases per evaluation cycle:
//! - `progress` runs before the decision: structural invalidation resets,
//!   target crossings advance the stage, T3 closes the episode.
//! - `activate` runs after the decision: a Buy/Add on an inactive ladder opens
//!   a new episode with static (daily ATR) and dynamic (intraday ATR) ladders.
//!
//! Within an episode the stage never decreases. Targets are fixed at
//! activation.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::decision::Action;
use super::validity::ValidityVerdict;
use super::volatility::{VolRegime, VolatilityAssessment};
use crate::config::LadderConfig;
use crate::domain::{IndicatorSnapshot, Timeframe, TradeDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TargetLevel {
    T1,
    T2,
    T3,
}

impl TargetLevel {
    pub const ALL: [TargetLevel; 3] = [Self::T1, Self::T2, Self::T3];

    /// The hit set for a given stage: T1..=T{stage}.
    pub fn up_to(stage: u8) -> BTreeSet<TargetLevel> {
        Self::ALL.into_iter().take(usize::from(stage.min(3))).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LadderKind {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ladder {
    pub targets: [f64; 3],
    pub stop_loss: f64,
}

impl Ladder {
    fn around(entry: f64, atr: f64, multiples: [f64; 3], stop_mult: f64, scale: f64, dir: TradeDirection) -> Self {
        let s = dir.sign();
        Self {
            targets: multiples.map(|m| entry + s * m * scale * atr),
            stop_loss: entry - s * stop_mult * scale * atr,
        }
    }

    /// Number of consecutive targets, from T1, reached by `price`.
    pub fn achieved(&self, price: f64, dir: TradeDirection) -> u8 {
        let reached = |t: f64| match dir {
            TradeDirection::Long => price >= t,
            TradeDirection::Short => price <= t,
        };
        self.targets.iter().take_while(|&&t| reached(t)).count() as u8
    }

    fn is_finite(&self) -> bool {
        self.stop_loss.is_finite() && self.targets.iter().all(|t| t.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub entry: f64,
    pub opened_at: NaiveDateTime,
    pub direction: TradeDirection,
    pub static_ladder: Ladder,
    pub dynamic_ladder: Ladder,
    /// Timeframe of the evaluation that achieved the current stage.
    pub ref_interval: Option<Timeframe>,
    /// Ladder that achieved the current stage.
    pub ref_ladder: Option<LadderKind>,
}

/// Committed per-key state. The only entity that outlives an evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LadderState {
    pub stage: u8,
    pub hits: BTreeSet<TargetLevel>,
    pub episode: Option<Episode>,
}

impl LadderState {
    pub fn is_active(&self) -> bool {
        self.episode.is_some()
    }

    /// Stop of the open episode.
    pub fn active_stop(&self) -> Option<f64> {
        self.episode.as_ref().map(|e| e.static_ladder.stop_loss)
    }

    /// Structural invariants of a persisted state.
    pub fn validate(&self) -> Result<(), String> {
        if self.stage > 3 {
            return Err(format!("stage {} out of range", self.stage));
        }
        if self.hits != TargetLevel::up_to(self.stage) {
            return Err(format!("hits {:?} do not match stage {}", self.hits, self.stage));
        }
        match &self.episode {
            None if self.stage != 0 => Err(format!("stage {} without an open episode", self.stage)),
            Some(e) if self.stage == 3 => Err(format!("episode opened at {} left open at stage 3", e.opened_at)),
            Some(e) if !(e.entry.is_finite() && e.static_ladder.is_finite() && e.dynamic_ladder.is_finite()) => {
                Err("non-finite ladder levels".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Result of the `progress` phase.
#[derive(Debug, Clone, PartialEq)]
pub struct LadderProgress {
    /// State to carry into the decision and commit (absent activation).
    pub state: LadderState,
    /// State to report on this cycle's record (shows stage 3 on an episode close).
    pub reported: LadderState,
    pub advanced: bool,
    pub reset: bool,
    pub closed: bool,
}

impl LadderProgress {
    fn unchanged(state: &LadderState) -> Self {
        Self {
            state: state.clone(),
            reported: state.clone(),
            advanced: false,
            reset: false,
            closed: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LadderEngine {
    cfg: LadderConfig,
}

impl LadderEngine {
    pub fn new(cfg: LadderConfig) -> Self {
        Self { cfg }
    }

    /// A reset leaves the default state; resetting again changes nothing.
    pub fn reset(&self) -> LadderState {
        LadderState::default()
    }

    pub fn progress(&self, prior: &LadderState, snap: &IndicatorSnapshot, verdict: &ValidityVerdict) -> LadderProgress {
        let Some(episode) = &prior.episode else {
            return LadderProgress::unchanged(prior);
        };

        if verdict.is_structural_invalidation() {
            let state = self.reset();
            return LadderProgress {
                reported: state.clone(),
                state,
                advanced: false,
                reset: true,
                closed: false,
            };
        }

        let dir = episode.direction;
        let by_static = episode.static_ladder.achieved(snap.close, dir);
        let by_dynamic = episode.dynamic_ladder.achieved(snap.close, dir);
        let (achieved, kind) = if by_static >= by_dynamic {
            (by_static, LadderKind::Static)
        } else {
            (by_dynamic, LadderKind::Dynamic)
        };
        if achieved <= prior.stage {
            return LadderProgress::unchanged(prior);
        }

        let mut episode = episode.clone();
        episode.ref_interval = Some(snap.timeframe);
        episode.ref_ladder = Some(kind);
        let advanced_state = LadderState {
            stage: achieved,
            hits: TargetLevel::up_to(achieved),
            episode: Some(episode),
        };

        if achieved >= 3 {
            return LadderProgress {
                state: self.reset(),
                reported: advanced_state,
                advanced: true,
                reset: false,
                closed: true,
            };
        }
        LadderProgress {
            reported: advanced_state.clone(),
            state: advanced_state,
            advanced: true,
            reset: false,
            closed: false,
        }
    }

    /// Open an episode on Buy/Add when no episode is open. Otherwise `state`
    /// is returned as is.
    pub fn activate(
        &self,
        state: &LadderState,
        snap: &IndicatorSnapshot,
        action: Action,
        volatility: &VolatilityAssessment,
        direction: TradeDirection,
    ) -> LadderState {
        if state.is_active() || !matches!(action, Action::Buy | Action::Add) {
            return state.clone();
        }
        let cfg = &self.cfg;
        let scale = if volatility.regime == VolRegime::Hyper {
            cfg.hyper_spacing_scale
        } else {
            1.0
        };
        let entry = snap.close;
        LadderState {
            stage: 0,
            hits: BTreeSet::new(),
            episode: Some(Episode {
                entry,
                opened_at: snap.timestamp,
                direction,
                static_ladder: Ladder::around(
                    entry,
                    snap.atr_daily,
                    cfg.static_targets_atr,
                    cfg.static_stop_atr,
                    scale,
                    direction,
                ),
                dynamic_ladder: Ladder::around(
                    entry,
                    snap.atr_intraday,
                    cfg.dynamic_targets_atr,
                    cfg.dynamic_stop_atr,
                    scale,
                    direction,
                ),
                ref_interval: None,
                ref_ladder: None,
            }),
        }
    }
}
