//! Versioned envelope for the learned state.
//!
//! The envelope carries the feature schema the models were trained on. A
//! document written under another schema is refused on load with
//! `SchemaMismatch`; those models must be retrained from scratch. Storage is
//! the caller's business: this module only converts to and from the
//! serialisable form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::state::{EngineState, TrainingRecord};
use crate::error::{EngineError, EngineResult};
use crate::factors::FactorWeights;
use crate::features::FEATURE_SCHEMA_VERSION;
use crate::models::{EnsembleModel, PatternModel, TrendModel};

/// Version of the envelope layout itself.
pub const PERSIST_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub format_version: u32,
    pub feature_schema_version: u32,
    pub saved_at: DateTime<Utc>,
    pub state_version: u64,
    pub weights: FactorWeights,
    /// blake3 of the weight table at save time, for audit.
    pub weights_digest: String,
    pub pattern: PatternModel,
    pub trend: TrendModel,
    pub last_weight_update: Option<DateTime<Utc>>,
    pub training_history: Vec<TrainingRecord>,
}

impl PersistedState {
    pub fn capture(state: &EngineState, saved_at: DateTime<Utc>) -> Self {
        Self {
            format_version: PERSIST_FORMAT_VERSION,
            feature_schema_version: FEATURE_SCHEMA_VERSION,
            saved_at,
            state_version: state.version,
            weights: state.weights.clone(),
            weights_digest: state.weights.digest(),
            pattern: state.pattern.clone(),
            trend: state.trend.clone(),
            last_weight_update: state.last_weight_update,
            training_history: state.training_history.clone(),
        }
    }

    /// Check the envelope against the running extractor and unpack it.
    pub fn into_state(self) -> EngineResult<EngineState> {
        if self.format_version != PERSIST_FORMAT_VERSION {
            return Err(EngineError::InvalidConfig(format!(
                "unsupported persisted format version {}",
                self.format_version
            )));
        }
        for found in [
            self.feature_schema_version,
            self.pattern.schema_version(),
            self.trend.schema_version(),
        ] {
            if found != FEATURE_SCHEMA_VERSION {
                warn!(expected = FEATURE_SCHEMA_VERSION, found, "persisted state rejected");
                return Err(EngineError::SchemaMismatch {
                    expected: FEATURE_SCHEMA_VERSION,
                    found,
                });
            }
        }
        Ok(EngineState {
            version: self.state_version,
            weights: self.weights,
            pattern: self.pattern,
            trend: self.trend,
            last_weight_update: self.last_weight_update,
            training_history: self.training_history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn captured() -> PersistedState {
        let mut state = EngineState::initial(&EngineConfig::default());
        state.version = 7;
        state.weights = FactorWeights::uniform();
        PersistedState::capture(&state, Utc::now())
    }

    #[test]
    fn json_round_trip_restores_state() {
        let json = serde_json::to_string(&captured()).unwrap();
        let back: PersistedState = serde_json::from_str(&json).unwrap();
        let state = back.into_state().unwrap();
        assert_eq!(state.version, 7);
        assert!(state.weights.max_abs_diff(&FactorWeights::uniform()) < 1e-12);
    }

    #[test]
    fn stale_schema_is_rejected() {
        let mut p = captured();
        p.feature_schema_version = FEATURE_SCHEMA_VERSION + 1;
        assert_eq!(
            p.into_state(),
            Err(EngineError::SchemaMismatch {
                expected: FEATURE_SCHEMA_VERSION,
                found: FEATURE_SCHEMA_VERSION + 1,
            })
        );
    }

    #[test]
    fn stale_model_schema_in_json_is_rejected() {
        let mut doc = serde_json::to_value(captured()).unwrap();
        doc["pattern"]["schema_version"] = serde_json::json!(0);
        let p: PersistedState = serde_json::from_value(doc).unwrap();
        assert!(matches!(p.into_state(), Err(EngineError::SchemaMismatch { found: 0, .. })));
    }
}
