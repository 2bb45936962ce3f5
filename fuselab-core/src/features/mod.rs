//! Bar-window features: everything the engines read from the recent bar
//! sequence rather than from the snapshot.
//!
//! Extraction happens once per evaluation; engines never rescan bars.

pub mod candles;
pub mod swing;
pub mod window;

pub use candles::{detect_patterns, CandlePattern, PatternGroup};
pub use swing::{find_swings, SwingKind, SwingPoint, SwingSummary};
pub use window::{Divergence, ObvTrend, WindowFeatures};
