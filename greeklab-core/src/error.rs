//! Engine error taxonomy.
//!
//! Every failure the engine can surface to a caller lives here. Failures are
//! local to one symbol or one training job; none of them leave partially
//! updated weights or model parameters behind.

use thiserror::Error;

/// Errors produced by the signal and learning engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Malformed or missing numeric input in a market snapshot. The symbol's
    /// cycle is rejected; the scan continues with other symbols.
    #[error("invalid snapshot for {symbol}: {field} {reason}")]
    InvalidSnapshot {
        symbol: String,
        field: &'static str,
        reason: String,
    },

    /// Too few samples to train or reweight. The caller keeps serving the
    /// previous parameters.
    #[error("insufficient data: need at least {required} samples, have {available}")]
    InsufficientData { required: usize, available: usize },

    /// Feature-vector schema of a stored model or vector differs from the
    /// current extractor. Fatal for that model until retrained from scratch.
    #[error("feature schema mismatch: expected v{expected}, found v{found}")]
    SchemaMismatch { expected: u32, found: u32 },

    /// The external snapshot provider could not supply data for a symbol.
    #[error("data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// The external journal rejected an append or query.
    #[error("journal error: {0}")]
    Journal(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The background trainer thread has shut down.
    #[error("trainer unavailable")]
    TrainerUnavailable,
}

impl EngineError {
    pub fn invalid_snapshot(
        symbol: impl Into<String>,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSnapshot {
            symbol: symbol.into(),
            field,
            reason: reason.into(),
        }
    }

    pub fn data_unavailable(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable code, used as the recorded skip reason.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSnapshot { .. } => "invalid-snapshot",
            Self::InsufficientData { .. } => "insufficient-data",
            Self::SchemaMismatch { .. } => "schema-mismatch",
            Self::DataUnavailable { .. } => "data-unavailable",
            Self::Journal(_) => "journal",
            Self::InvalidConfig(_) => "invalid-config",
            Self::TrainerUnavailable => "trainer-unavailable",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = EngineError::invalid_snapshot("NIFTY", "delta", "is NaN");
        assert_eq!(err.to_string(), "invalid snapshot for NIFTY: delta is NaN");

        let err = EngineError::InsufficientData {
            required: 30,
            available: 10,
        };
        assert!(err.to_string().contains("30"));
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            EngineError::data_unavailable("X", "timeout").code(),
            "data-unavailable"
        );
        assert_eq!(
            EngineError::SchemaMismatch {
                expected: 1,
                found: 2
            }
            .code(),
            "schema-mismatch"
        );
    }
}
