//! Engine configuration.
//!
//! Every section carries serde defaults, so a partial TOML/JSON document
//! deserialises into a complete config. `validate` rejects out-of-range
//! values before any component is built.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::exit::ExitConfig;
use crate::features::ExtractorConfig;
use crate::feedback::FeedbackConfig;
use crate::gate::GateConfig;
use crate::models::{PatternParams, TrendParams, MIN_TRAINING_SAMPLES};
use crate::weights::OptimizerConfig;

/// Default master seed for the model RNG hierarchy.
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub seed: u64,
    pub extractor: ExtractorConfig,
    pub gate: GateConfig,
    pub exit: ExitConfig,
    pub pattern: PatternParams,
    pub trend: TrendParams,
    pub optimizer: OptimizerConfig,
    pub feedback: FeedbackConfig,
    /// Training records kept in the published state.
    pub training_history_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            extractor: ExtractorConfig::default(),
            gate: GateConfig::default(),
            exit: ExitConfig::default(),
            pattern: PatternParams::default(),
            trend: TrendParams::default(),
            optimizer: OptimizerConfig::default(),
            feedback: FeedbackConfig::default(),
            training_history_cap: 50,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        self.gate.validate()?;
        self.exit.validate()?;
        self.optimizer.validate()?;
        self.feedback.validate()?;

        let e = &self.extractor;
        if e.liquidity_volume_norm <= 0.0 || e.liquidity_oi_norm <= 0.0 || e.expiry_decay_days <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "extractor normalisation constants must be positive".into(),
            ));
        }

        let p = &self.pattern;
        if p.n_trees == 0 || p.max_depth == 0 || p.min_samples_leaf == 0 {
            return Err(EngineError::InvalidConfig(
                "pattern n_trees, max_depth and min_samples_leaf must be positive".into(),
            ));
        }
        check_training_split("pattern", p.test_fraction, p.min_samples)?;

        let t = &self.trend;
        if t.n_stages == 0 || t.max_depth == 0 || t.min_samples_leaf == 0 {
            return Err(EngineError::InvalidConfig(
                "trend n_stages, max_depth and min_samples_leaf must be positive".into(),
            ));
        }
        if !(t.learning_rate > 0.0 && t.learning_rate <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "trend learning_rate must be in (0, 1], got {}",
                t.learning_rate
            )));
        }
        if !(t.subsample > 0.0 && t.subsample <= 1.0) || t.return_scale <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "trend subsample must be in (0, 1] and return_scale positive".into(),
            ));
        }
        check_training_split("trend", t.test_fraction, t.min_samples)?;

        if self.training_history_cap == 0 {
            return Err(EngineError::InvalidConfig(
                "training_history_cap must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn check_training_split(model: &str, test_fraction: f64, min_samples: usize) -> EngineResult<()> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(EngineError::InvalidConfig(format!(
            "{model} test_fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    if min_samples < MIN_TRAINING_SAMPLES {
        return Err(EngineError::InvalidConfig(format!(
            "{model} min_samples {min_samples} below floor {MIN_TRAINING_SAMPLES}"
        )));
    }
    Ok(())
}
