use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::timeframe::{Timeframe, TimeframeParseError};

/// Identity of one evaluated series: (symbol, timeframe).
///
/// This is the ladder-store key. Its string form is `SYMBOL@tf`
/// (e.g. `RELIANCE@1d`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("series key '{0}' must look like SYMBOL@tf")]
    Malformed(String),
    #[error(transparent)]
    Timeframe(#[from] TimeframeParseError),
}

impl FromStr for SeriesKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (symbol, tf) = s
            .rsplit_once('@')
            .ok_or_else(|| KeyParseError::Malformed(s.to_string()))?;
        if symbol.is_empty() {
            return Err(KeyParseError::Malformed(s.to_string()));
        }
        Ok(Self::new(symbol, tf.parse()?))
    }
}
