//! FuseLab Core: signal fusion and trade validity pipeline.
//!
//! This crate contains the evaluation path end to end:
//! - Domain types (bars, timeframes, series keys, indicator snapshots)
//! - Indicator primitives and the snapshot builder
//! - Bar-window features (swings, candles, volume, reclaim, divergence)
//! - Structure, trend, reversal and volatility engines
//! - The trade validity gate (authoritative veto)
//! - Ladder state machine and final decision synthesis
//! - Pipeline coordinator, output records, decision fingerprints

pub mod config;
pub mod domain;
pub mod engines;
pub mod error;
pub mod features;
pub mod fingerprint;
pub mod indicators;
pub mod pipeline;
pub mod record;

pub use config::FusionConfig;
pub use error::EvaluationError;
pub use fingerprint::DecisionFingerprint;
pub use pipeline::{Evaluation, EvaluationInput, FrameData, HigherFrames, Pipeline};
pub use record::OutputRecord;
