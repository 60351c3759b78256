use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::signal::Action;

/// Deterministic signal ID.
///
/// Derived from (symbol, generated_at, action) so that evaluating the same
/// snapshot twice yields the same ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalId(pub String);

impl SignalId {
    pub fn derive(symbol: &str, generated_at: DateTime<Utc>, action: Action) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(symbol.as_bytes());
        hasher.update(&generated_at.timestamp_micros().to_le_bytes());
        hasher.update(action.as_str().as_bytes());
        let hex = hasher.finalize().to_hex();
        Self(hex[..16].to_string())
    }

    /// ID of an exit signal, scoped to the position it closes.
    pub fn derive_exit(position: &PositionId, generated_at: DateTime<Utc>, action: Action) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"exit");
        hasher.update(position.0.as_bytes());
        hasher.update(&generated_at.timestamp_micros().to_le_bytes());
        hasher.update(action.as_str().as_bytes());
        let hex = hasher.finalize().to_hex();
        Self(hex[..16].to_string())
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position ID, assigned by the engine that owns the position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionId(pub String);

impl PositionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<u64> for PositionId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
