//! Ensemble predictors: a bagged tree classifier (pattern) and a
//! gradient-boosted regressor (trend).
//!
//! Both are stateless at inference time. `train` builds the replacement
//! parameters completely and assigns them only on success, so a failed
//! training run leaves the model that was serving untouched. Parameters sit
//! behind an `Arc`, so cloning a trained model to publish a new engine
//! snapshot does not copy trees.

pub mod dataset;
pub mod pattern;
pub mod tree;
pub mod trend;

pub use dataset::{Dataset, LabeledSample};
pub use pattern::{PatternModel, PatternParams};
pub use tree::{RegressionTree, TreeParams};
pub use trend::{TrendModel, TrendParams};

use serde::{Deserialize, Serialize};

use crate::domain::TradeOutcome;
use crate::error::EngineResult;
use crate::features::FeatureVector;
use crate::rng::RngHierarchy;

/// Floor on the training-set size; configs may raise it, never lower it.
pub const MIN_TRAINING_SAMPLES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelId {
    Pattern,
    Trend,
}

impl ModelId {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::Pattern => "pattern",
            ModelId::Trend => "trend",
        }
    }
}

/// Output of one model for one feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub model_id: ModelId,
    pub raw: f64,
    /// `raw` mapped into [0, 1].
    pub normalized: f64,
}

impl ModelScore {
    /// Score reported by a model that has never been trained.
    pub fn neutral(model_id: ModelId) -> Self {
        Self {
            model_id,
            raw: 0.0,
            normalized: 0.5,
        }
    }
}

/// Metrics of one training run. The held-out split is for reporting only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub model_id: ModelId,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub sample_count: usize,
    pub train_count: usize,
    pub test_count: usize,
}

/// Common surface of the two ensembles.
pub trait EnsembleModel: Clone + Send + Sync {
    const ID: ModelId;

    /// Labelled training set for this model.
    fn dataset(outcomes: &[TradeOutcome]) -> Dataset;

    /// Retrain from scratch. On error `self` is unchanged.
    fn train(&mut self, data: &Dataset, rng: &RngHierarchy) -> EngineResult<TrainingMetrics>;

    fn score(&self, vector: &FeatureVector) -> EngineResult<ModelScore>;

    fn is_trained(&self) -> bool;

    /// Metrics of the run that produced the current parameters.
    fn metrics(&self) -> Option<&TrainingMetrics>;

    /// Feature schema the parameters were trained under.
    fn schema_version(&self) -> u32;
}

/// Fraction of pairs on which `agree` holds; 0 for an empty set.
pub(crate) fn agreement<'a>(
    pairs: impl Iterator<Item = (f64, &'a LabeledSample)>,
    agree: impl Fn(f64, f64) -> bool,
) -> f64 {
    let (mut hits, mut total) = (0usize, 0usize);
    for (pred, sample) in pairs {
        total += 1;
        if agree(pred, sample.label) {
            hits += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::features::{Feature, FEATURE_COUNT};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Rows where a positive momentum feature means a winning trade.
    pub fn momentum_dataset(n: usize, seed: u64, regression: bool) -> Dataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let samples = (0..n)
            .map(|_| {
                let mut features = [0.0; FEATURE_COUNT];
                for f in features.iter_mut() {
                    *f = rng.gen_range(-1.0..1.0);
                }
                let m = rng.gen_range(-0.2..0.2);
                features[Feature::Momentum.index()] = m;
                let label = match (regression, m > 0.0) {
                    (true, _) => m,
                    (false, true) => 1.0,
                    (false, false) => 0.0,
                };
                LabeledSample { features, label }
            })
            .collect();
        Dataset::new(samples)
    }
}
