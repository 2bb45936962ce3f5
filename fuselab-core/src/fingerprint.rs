//! Decision fingerprints: BLAKE3 over the canonical JSON of a value.
//!
//! Two evaluations with identical inputs must produce identical fingerprints;
//! the determinism tests and `fuselab evaluate` compare these.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionFingerprint(pub String);

impl DecisionFingerprint {
    /// Fingerprint any serializable value. Struct fields serialize in
    /// declaration order and sets are `BTreeSet`s, so the JSON is canonical.
    pub fn of<T: Serialize>(value: &T) -> Self {
        let json = serde_json::to_vec(value).unwrap_or_default();
        Self(blake3::hash(&json).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for DecisionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
