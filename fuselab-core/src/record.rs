//! Output record: one flat, serializable row per evaluation.
//!
//! Assessment fields are `None` on error records, where the pipeline stopped
//! before the engines ran.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::Timeframe;
use crate::engines::{
    Action, CprContext, CprWidthClass, Driver, FinalDecision, LadderState, ReversalAssessment,
    ReversalBias, ReversalTag, RiskRating, StructureAssessment, StructureType, TargetLevel,
    TrendAssessment, TrendBias, TrendLabel, ValidityReason, ValidityStatus, ValidityVerdict,
    VolRegime, VolatilityAssessment, VwapContext,
};
use crate::features::{Divergence, ObvTrend, WindowFeatures};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp: NaiveDateTime,

    pub action: Action,
    pub composite_score: f64,
    pub drivers: Vec<Driver>,

    pub structure_type: Option<StructureType>,
    pub structure_confidence: Option<f64>,

    pub trend_bias: Option<TrendBias>,
    pub trend_score: Option<f64>,
    pub trend_label: Option<TrendLabel>,
    pub trend_composite: Option<String>,

    pub reversal_score: Option<f64>,
    pub reversal_bias: Option<ReversalBias>,
    pub reversal_tags: Vec<ReversalTag>,

    pub vol_regime: Option<VolRegime>,
    pub vol_score: Option<f64>,
    pub risk_rating: Option<RiskRating>,

    pub cpr_context: Option<CprContext>,
    pub cpr_width_class: Option<CprWidthClass>,
    pub vwap_context: Option<VwapContext>,
    pub vwap_dist_atr: Option<f64>,
    pub obv_label: Option<ObvTrend>,
    pub obv_divergence: Option<Divergence>,

    pub ladder_stage: u8,
    pub ladder_hits: Vec<TargetLevel>,

    pub validity_status: ValidityStatus,
    pub validity_reasons: Vec<ValidityReason>,
}

/// All stage outputs of a completed evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RecordParts<'a> {
    pub symbol: &'a str,
    pub timeframe: Timeframe,
    pub timestamp: NaiveDateTime,
    pub vwap_dist_atr: f64,
    pub features: &'a WindowFeatures,
    pub structure: &'a StructureAssessment,
    pub trend: &'a TrendAssessment,
    pub reversal: &'a ReversalAssessment,
    pub volatility: &'a VolatilityAssessment,
    pub verdict: &'a ValidityVerdict,
    pub decision: &'a FinalDecision,
    pub ladder: &'a LadderState,
}

impl OutputRecord {
    pub fn from_parts(p: RecordParts<'_>) -> Self {
        Self {
            symbol: p.symbol.to_string(),
            timeframe: p.timeframe,
            timestamp: p.timestamp,
            action: p.decision.action,
            composite_score: p.decision.composite_score,
            drivers: p.decision.drivers.clone(),
            structure_type: Some(p.structure.structure_type),
            structure_confidence: Some(p.structure.confidence),
            trend_bias: Some(p.trend.bias),
            trend_score: Some(p.trend.score),
            trend_label: Some(p.trend.label),
            trend_composite: Some(p.trend.composite.clone()),
            reversal_score: Some(p.reversal.score),
            reversal_bias: Some(p.reversal.bias),
            reversal_tags: p.reversal.tags.iter().copied().collect(),
            vol_regime: Some(p.volatility.regime),
            vol_score: Some(p.volatility.score),
            risk_rating: Some(p.volatility.risk_rating),
            cpr_context: Some(p.verdict.cpr_context),
            cpr_width_class: Some(p.volatility.cpr_width_class),
            vwap_context: Some(p.verdict.vwap_context),
            vwap_dist_atr: Some(p.vwap_dist_atr),
            obv_label: Some(p.features.obv_trend),
            obv_divergence: Some(p.features.divergence),
            ladder_stage: p.ladder.stage,
            ladder_hits: p.ladder.hits.iter().copied().collect(),
            validity_status: p.verdict.status,
            validity_reasons: p.verdict.reasons.clone(),
        }
    }

    /// Avoid record for an evaluation that could not run.
    pub fn avoid(
        symbol: &str,
        timeframe: Timeframe,
        timestamp: NaiveDateTime,
        reason: ValidityReason,
        ladder: &LadderState,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            timestamp,
            action: Action::Avoid,
            composite_score: 0.0,
            drivers: vec![Driver::ValidityAvoid],
            structure_type: None,
            structure_confidence: None,
            trend_bias: None,
            trend_score: None,
            trend_label: None,
            trend_composite: None,
            reversal_score: None,
            reversal_bias: None,
            reversal_tags: Vec::new(),
            vol_regime: None,
            vol_score: None,
            risk_rating: None,
            cpr_context: None,
            cpr_width_class: None,
            vwap_context: None,
            vwap_dist_atr: None,
            obv_label: None,
            obv_divergence: None,
            ladder_stage: ladder.stage,
            ladder_hits: ladder.hits.iter().copied().collect(),
            validity_status: ValidityStatus::Avoid,
            validity_reasons: vec![reason],
        }
    }

    pub fn reason_codes(&self) -> Vec<&'static str> {
        self.validity_reasons.iter().map(|r| r.code()).collect()
    }
}
