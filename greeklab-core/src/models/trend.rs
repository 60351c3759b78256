//! TrendModel — least-squares gradient boosting on realized returns.

use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{RegressionTree, TreeParams};
use super::{agreement, Dataset, EnsembleModel, ModelId, ModelScore, TrainingMetrics, MIN_TRAINING_SAMPLES};
use crate::domain::TradeOutcome;
use crate::error::EngineResult;
use crate::features::{FeatureVector, FEATURE_SCHEMA_VERSION};
use crate::rng::RngHierarchy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendParams {
    pub n_stages: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of the training rows drawn (without replacement) per stage.
    pub subsample: f64,
    /// Return at which the normalised score reaches 0.5 + 0.5·tanh(1).
    pub return_scale: f64,
    pub test_fraction: f64,
    pub min_samples: usize,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            n_stages: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 3,
            subsample: 0.8,
            return_scale: 0.10,
            test_fraction: 0.2,
            min_samples: MIN_TRAINING_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendModel {
    params: TrendParams,
    schema_version: u32,
    generation: u64,
    /// Initial prediction (mean training return).
    base: f64,
    stages: Arc<Vec<RegressionTree>>,
    metrics: Option<TrainingMetrics>,
}

impl TrendModel {
    pub fn new(params: TrendParams) -> Self {
        Self {
            params,
            schema_version: FEATURE_SCHEMA_VERSION,
            generation: 0,
            base: 0.0,
            stages: Arc::new(Vec::new()),
            metrics: None,
        }
    }

    pub fn params(&self) -> &TrendParams {
        &self.params
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    fn predict(base: f64, lr: f64, stages: &[RegressionTree], x: &[f64]) -> f64 {
        base + lr * stages.iter().map(|t| t.predict(x)).sum::<f64>()
    }

    fn normalize(&self, raw: f64) -> f64 {
        let scale = if self.params.return_scale > 0.0 {
            self.params.return_scale
        } else {
            1.0
        };
        (0.5 + 0.5 * (raw / scale).tanh()).clamp(0.0, 1.0)
    }
}

impl Default for TrendModel {
    fn default() -> Self {
        Self::new(TrendParams::default())
    }
}

impl EnsembleModel for TrendModel {
    const ID: ModelId = ModelId::Trend;

    fn dataset(outcomes: &[TradeOutcome]) -> Dataset {
        Dataset::return_labels(outcomes)
    }

    fn train(&mut self, data: &Dataset, rng: &RngHierarchy) -> EngineResult<TrainingMetrics> {
        data.ensure_min(self.params.min_samples.max(MIN_TRAINING_SAMPLES))?;

        let generation = self.generation + 1;
        let stream = Self::ID.as_str();
        let split = data.split(self.params.test_fraction, &mut rng.rng_for(stream, generation, 0));

        let rows: Vec<&[f64]> = split.train.iter().map(|s| s.features.as_slice()).collect();
        let targets: Vec<f64> = split.train.iter().map(|s| s.label).collect();
        let n = rows.len();
        let lr = self.params.learning_rate;
        let base = targets.iter().sum::<f64>() / n as f64;
        let tree_params = TreeParams {
            max_depth: self.params.max_depth,
            min_samples_leaf: self.params.min_samples_leaf,
            max_features: None,
        };
        let per_stage = ((n as f64 * self.params.subsample).round() as usize).clamp(1, n);

        let mut fitted = vec![base; n];
        let mut stages = Vec::with_capacity(self.params.n_stages);
        for stage in 0..self.params.n_stages {
            let mut r = rng.rng_for(stream, generation, stage as u64 + 1);
            let residuals: Vec<f64> = targets.iter().zip(&fitted).map(|(y, f)| y - f).collect();
            let mut rows_used: Vec<usize> = (0..n).collect();
            rows_used.shuffle(&mut r);
            rows_used.truncate(per_stage);

            let tree = RegressionTree::fit(&rows, &residuals, &rows_used, &tree_params, &mut r);
            for (f, row) in fitted.iter_mut().zip(&rows) {
                *f += lr * tree.predict(row);
            }
            stages.push(tree);
        }
        debug!(stages = stages.len(), base, "trend model boosted");

        let same_direction = |p: f64, y: f64| (p > 0.0) == (y > 0.0);
        let metrics = TrainingMetrics {
            model_id: Self::ID,
            train_accuracy: agreement(
                split.train.iter().map(|s| (Self::predict(base, lr, &stages, &s.features), *s)),
                same_direction,
            ),
            test_accuracy: agreement(
                split.test.iter().map(|s| (Self::predict(base, lr, &stages, &s.features), *s)),
                same_direction,
            ),
            sample_count: data.len(),
            train_count: split.train.len(),
            test_count: split.test.len(),
        };

        *self = Self {
            params: self.params.clone(),
            schema_version: FEATURE_SCHEMA_VERSION,
            generation,
            base,
            stages: Arc::new(stages),
            metrics: Some(metrics.clone()),
        };
        Ok(metrics)
    }

    fn score(&self, vector: &FeatureVector) -> EngineResult<ModelScore> {
        vector.ensure_schema(self.schema_version)?;
        if !self.is_trained() {
            return Ok(ModelScore::neutral(Self::ID));
        }
        let raw = Self::predict(self.base, self.params.learning_rate, &self.stages, vector.as_slice());
        Ok(ModelScore {
            model_id: Self::ID,
            raw,
            normalized: self.normalize(raw),
        })
    }

    fn is_trained(&self) -> bool {
        self.metrics.is_some()
    }

    fn metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics.as_ref()
    }

    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::fixtures::call_snapshot;
    use crate::error::EngineError;
    use crate::features::{Feature, FeatureExtractor, FEATURE_COUNT};
    use crate::models::fixtures::momentum_dataset;

    fn small() -> TrendModel {
        TrendModel::new(TrendParams {
            n_stages: 40,
            ..TrendParams::default()
        })
    }

    #[test]
    fn untrained_scores_neutral() {
        let v = FeatureExtractor::default().extract(&call_snapshot()).unwrap();
        let s = TrendModel::default().score(&v).unwrap();
        assert_eq!(s.raw, 0.0);
        assert_eq!(s.normalized, 0.5);
        assert!(!TrendModel::default().is_trained());
    }

    #[test]
    fn predicts_return_direction() {
        let mut model = small();
        let metrics = model.train(&momentum_dataset(200, 21, true), &RngHierarchy::new(4)).unwrap();
        assert!(metrics.train_accuracy > 0.8, "train acc {}", metrics.train_accuracy);
        assert_eq!(model.n_stages(), 40);

        let mut v = FeatureExtractor::default().extract(&call_snapshot()).unwrap();
        v.values = [0.0; FEATURE_COUNT];
        v.values[Feature::Momentum.index()] = 0.15;
        let up = model.score(&v).unwrap();
        v.values[Feature::Momentum.index()] = -0.15;
        let down = model.score(&v).unwrap();
        assert!(up.raw > down.raw);
        assert!(up.normalized > 0.5 && down.normalized < 0.5);
    }

    #[test]
    fn normalization_bounded() {
        let model = TrendModel::default();
        for raw in [-10.0, -0.1, 0.0, 0.1, 10.0] {
            let n = model.normalize(raw);
            assert!((0.0..=1.0).contains(&n));
        }
        assert_eq!(model.normalize(0.0), 0.5);
    }

    #[test]
    fn insufficient_data_leaves_model_untouched() {
        let mut model = small();
        let before = model.clone();
        let err = model.train(&momentum_dataset(10, 1, true), &RngHierarchy::new(4)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { required: 30, available: 10 }));
        assert_eq!(model, before);
    }
}
