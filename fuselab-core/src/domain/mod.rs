//! Domain types for FuseLab

pub mod bar;
pub mod ids;
pub mod snapshot;
pub mod timeframe;

pub use bar::Bar;
pub use ids::{KeyParseError, SeriesKey};
pub use snapshot::{CircuitLimits, CprLevels, IndicatorSnapshot};
pub use timeframe::{Timeframe, TimeframeParseError};

/// Symbol type alias
pub type Symbol = String;

/// Direction of the trade the pipeline is qualifying.
///
/// Long is the default for cash-equity scanning; Short mirrors every
/// price-geometry comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    #[default]
    Long,
    Short,
}

impl TradeDirection {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    /// True if `price` is on the favorable side of `level` (strictly).
    pub fn is_beyond(self, price: f64, level: f64) -> bool {
        match self {
            Self::Long => price > level,
            Self::Short => price < level,
        }
    }
}
