//! Per-evaluation error taxonomy.
//!
//! Every variant is non-fatal: the coordinator converts it into an Avoid
//! record carrying the matching reason code and leaves ladder state untouched.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::Timeframe;
use crate::engines::validity::ValidityReason;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    #[error("insufficient history for {timeframe}: have {have} bars, need {need}")]
    MissingData {
        timeframe: Timeframe,
        have: usize,
        need: usize,
    },

    #[error("stale snapshot: bar at {snapshot_at} is older than {max_age_minutes} minutes at {as_of}")]
    StaleData {
        snapshot_at: NaiveDateTime,
        as_of: NaiveDateTime,
        max_age_minutes: i64,
    },

    #[error("data integrity: required field '{field}' is missing or invalid")]
    DataIntegrity { field: String },

    #[error("market data unavailable: {detail}")]
    DataUnavailable { detail: String },

    #[error("ladder state corrupted for {key}: {detail}")]
    StateCorruption { key: String, detail: String },

    #[error("evaluation fault: {0}")]
    Fault(String),
}

impl EvaluationError {
    /// Reason code recorded on the Avoid record produced for this error.
    pub fn reason(&self) -> ValidityReason {
        match self {
            Self::MissingData { .. } => ValidityReason::InsufficientHistory,
            Self::StaleData { .. } => ValidityReason::StaleData,
            Self::DataIntegrity { .. } | Self::DataUnavailable { .. } => ValidityReason::DataIntegrity,
            // Corrupted state is reset by the store before evaluation; if it
            // still surfaces here the record is treated as bad input.
            Self::StateCorruption { .. } => ValidityReason::DataIntegrity,
            Self::Fault(_) => ValidityReason::EvaluationFault,
        }
    }
}
