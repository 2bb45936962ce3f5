//! The fusion stages, leaf-first.
//!
//! Each engine is a pure transformation: it reads the snapshot, the window
//! features and the immutable outputs of the stages before it, and writes
//! exactly one assessment type. No engine reads a downstream output.

pub mod decision;
pub mod ladder;
pub mod reversal;
pub mod structure;
pub mod trend;
pub mod validity;
pub mod volatility;

pub use decision::{Action, DecisionInput, Driver, FinalDecision, FinalDecisionEngine};
pub use ladder::{Episode, Ladder, LadderEngine, LadderKind, LadderProgress, LadderState, TargetLevel};
pub use reversal::{ReversalAssessment, ReversalBias, ReversalEngine, ReversalTag};
pub use structure::{
    RpsConditions, SpsConditions, StructureAssessment, StructureClassifier, StructureType,
};
pub use trend::{FrameInput, FrameScore, TrendAssessment, TrendBias, TrendEngine, TrendLabel};
pub use validity::{
    CprContext, TradeValidityEngine, ValidityFlag, ValidityInput, ValidityReason, ValidityStatus,
    ValidityVerdict, VwapContext,
};
pub use volatility::{
    CprWidthClass, RiskRating, VolRegime, VolState, VolatilityAssessment, VolatilityEngine,
};
