//! VolatilityEngine: ATR% risk rating, ATR-slope regime, CPR width class.

use serde::{Deserialize, Serialize};

use crate::config::{CprConfig, VolatilityConfig};
use crate::domain::IndicatorSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRating {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolState {
    Quiet,
    Normal,
    Expanded,
    Hyper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolRegime {
    Compressed,
    Stable,
    Expanding,
    Hyper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CprWidthClass {
    Narrow,
    Normal,
    Wide,
    UltraWide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityAssessment {
    pub risk_rating: RiskRating,
    pub state: VolState,
    pub regime: VolRegime,
    /// In [0, 10].
    pub score: f64,
    pub atr_pct: f64,
    pub cpr_width_class: CprWidthClass,
}

#[derive(Debug, Clone, Default)]
pub struct VolatilityEngine {
    cfg: VolatilityConfig,
    cpr: CprConfig,
}

impl VolatilityEngine {
    pub fn new(cfg: VolatilityConfig, cpr: CprConfig) -> Self {
        Self { cfg, cpr }
    }

    pub fn assess(&self, snap: &IndicatorSnapshot) -> VolatilityAssessment {
        let cfg = &self.cfg;
        let atr_pct = snap.atr_pct();

        let risk_rating = if atr_pct < cfg.low_risk_max_pct {
            RiskRating::Low
        } else if atr_pct <= cfg.medium_risk_max_pct {
            RiskRating::Medium
        } else {
            RiskRating::High
        };

        let slope = snap.atr_slope;
        let regime = if slope < cfg.compressed_slope {
            VolRegime::Compressed
        } else if slope <= cfg.expanding_slope {
            VolRegime::Stable
        } else if slope <= cfg.hyper_slope {
            VolRegime::Expanding
        } else {
            VolRegime::Hyper
        };

        let state = match (risk_rating, regime) {
            (_, VolRegime::Hyper) => VolState::Hyper,
            (RiskRating::Low, VolRegime::Compressed | VolRegime::Stable) => VolState::Quiet,
            (RiskRating::High, _) | (_, VolRegime::Expanding) => VolState::Expanded,
            _ => VolState::Normal,
        };

        let cpr_width_class = self.cpr_width_class(snap.cpr.width_pct());

        let mut score = atr_pct * cfg.atr_pct_weight;
        if regime == VolRegime::Compressed || cpr_width_class == CprWidthClass::Narrow {
            score += cfg.compression_bonus;
        }
        if regime == VolRegime::Hyper {
            score -= cfg.hyper_penalty;
        }
        let score = if score.is_finite() {
            score.clamp(0.0, 10.0)
        } else {
            0.0
        };

        VolatilityAssessment {
            risk_rating,
            state,
            regime,
            score,
            atr_pct,
            cpr_width_class,
        }
    }

    pub fn cpr_width_class(&self, width_pct: f64) -> CprWidthClass {
        if width_pct < self.cpr.narrow_width_pct {
            CprWidthClass::Narrow
        } else if width_pct <= self.cpr.wide_width_pct {
            CprWidthClass::Normal
        } else if width_pct <= self.cpr.ultra_wide_width_pct {
            CprWidthClass::Wide
        } else {
            CprWidthClass::UltraWide
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::test_support::snapshot;

    #[test]
    fn medium_risk_stable() {
        // ATR 2.0 on price 100 = 2%
        let a = VolatilityEngine::default().assess(&snapshot());
        assert_eq!(a.risk_rating, RiskRating::Medium);
        assert_eq!(a.regime, VolRegime::Stable);
        assert_eq!(a.state, VolState::Normal);
        assert!((a.score - 3.0).abs() < 1e-9);
        assert_eq!(a.cpr_width_class, CprWidthClass::Normal);
    }

    #[test]
    fn quiet_compressed_gets_bonus() {
        let mut snap = snapshot();
        snap.atr_daily = 0.5;
        snap.atr_slope = -0.2;
        let a = VolatilityEngine::default().assess(&snap);
        assert_eq!(a.risk_rating, RiskRating::Low);
        assert_eq!(a.regime, VolRegime::Compressed);
        assert_eq!(a.state, VolState::Quiet);
        assert!((a.score - 1.75).abs() < 1e-9);
    }

    #[test]
    fn hyper_penalty_and_floor() {
        let mut snap = snapshot();
        snap.atr_daily = 1.0;
        snap.atr_slope = 0.5;
        let a = VolatilityEngine::default().assess(&snap);
        assert_eq!(a.regime, VolRegime::Hyper);
        assert_eq!(a.state, VolState::Hyper);
        assert_eq!(a.score, 0.0);
    }

    #[test]
    fn high_risk_is_expanded_and_capped() {
        let mut snap = snapshot();
        snap.atr_daily = 12.0;
        let a = VolatilityEngine::default().assess(&snap);
        assert_eq!(a.risk_rating, RiskRating::High);
        assert_eq!(a.state, VolState::Expanded);
        assert_eq!(a.score, 10.0);
    }

    #[test]
    fn cpr_width_classes() {
        let e = VolatilityEngine::default();
        assert_eq!(e.cpr_width_class(0.1), CprWidthClass::Narrow);
        assert_eq!(e.cpr_width_class(0.5), CprWidthClass::Normal);
        assert_eq!(e.cpr_width_class(1.0), CprWidthClass::Wide);
        assert_eq!(e.cpr_width_class(1.5), CprWidthClass::UltraWide);
    }
}
