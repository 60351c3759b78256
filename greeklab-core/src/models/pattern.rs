//! PatternModel — bagged regression trees on win/loss labels.

use std::sync::Arc;

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::tree::{RegressionTree, TreeParams};
use super::{agreement, Dataset, EnsembleModel, ModelId, ModelScore, TrainingMetrics, MIN_TRAINING_SAMPLES};
use crate::domain::TradeOutcome;
use crate::error::EngineResult;
use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_SCHEMA_VERSION};
use crate::rng::RngHierarchy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` means ⌊√n⌋.
    pub max_features: Option<usize>,
    pub test_fraction: f64,
    pub min_samples: usize,
}

impl Default for PatternParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 6,
            min_samples_leaf: 3,
            max_features: None,
            test_fraction: 0.2,
            min_samples: MIN_TRAINING_SAMPLES,
        }
    }
}

impl PatternParams {
    fn tree_params(&self) -> TreeParams {
        let sqrt = (FEATURE_COUNT as f64).sqrt().floor() as usize;
        TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            max_features: Some(self.max_features.unwrap_or(sqrt).max(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternModel {
    params: PatternParams,
    schema_version: u32,
    generation: u64,
    trees: Arc<Vec<RegressionTree>>,
    metrics: Option<TrainingMetrics>,
}

impl PatternModel {
    pub fn new(params: PatternParams) -> Self {
        Self {
            params,
            schema_version: FEATURE_SCHEMA_VERSION,
            generation: 0,
            trees: Arc::new(Vec::new()),
            metrics: None,
        }
    }

    pub fn params(&self) -> &PatternParams {
        &self.params
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean leaf probability across the forest.
    fn predict(trees: &[RegressionTree], x: &[f64]) -> f64 {
        if trees.is_empty() {
            return 0.0;
        }
        trees.iter().map(|t| t.predict(x)).sum::<f64>() / trees.len() as f64
    }
}

impl Default for PatternModel {
    fn default() -> Self {
        Self::new(PatternParams::default())
    }
}

impl EnsembleModel for PatternModel {
    const ID: ModelId = ModelId::Pattern;

    fn dataset(outcomes: &[TradeOutcome]) -> Dataset {
        Dataset::direction_labels(outcomes)
    }

    fn train(&mut self, data: &Dataset, rng: &RngHierarchy) -> EngineResult<TrainingMetrics> {
        data.ensure_min(self.params.min_samples.max(MIN_TRAINING_SAMPLES))?;

        let generation = self.generation + 1;
        let stream = Self::ID.as_str();
        let split = data.split(self.params.test_fraction, &mut rng.rng_for(stream, generation, 0));

        let rows: Vec<&[f64]> = split.train.iter().map(|s| s.features.as_slice()).collect();
        let targets: Vec<f64> = split.train.iter().map(|s| s.label).collect();
        let tree_params = self.params.tree_params();
        let n = rows.len();

        let trees: Vec<RegressionTree> = (0..self.params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut r = rng.rng_for(stream, generation, t as u64 + 1);
                let bootstrap: Vec<usize> = (0..n).map(|_| r.gen_range(0..n)).collect();
                RegressionTree::fit(&rows, &targets, &bootstrap, &tree_params, &mut r)
            })
            .collect();

        let hit = |p: f64, y: f64| (p >= 0.5) == (y >= 0.5);
        let metrics = TrainingMetrics {
            model_id: Self::ID,
            train_accuracy: agreement(
                split.train.iter().map(|s| (Self::predict(&trees, &s.features), *s)),
                hit,
            ),
            test_accuracy: agreement(
                split.test.iter().map(|s| (Self::predict(&trees, &s.features), *s)),
                hit,
            ),
            sample_count: data.len(),
            train_count: split.train.len(),
            test_count: split.test.len(),
        };

        *self = Self {
            params: self.params.clone(),
            schema_version: FEATURE_SCHEMA_VERSION,
            generation,
            trees: Arc::new(trees),
            metrics: Some(metrics.clone()),
        };
        Ok(metrics)
    }

    fn score(&self, vector: &FeatureVector) -> EngineResult<ModelScore> {
        vector.ensure_schema(self.schema_version)?;
        if !self.is_trained() {
            return Ok(ModelScore::neutral(Self::ID));
        }
        let raw = Self::predict(&self.trees, vector.as_slice());
        Ok(ModelScore {
            model_id: Self::ID,
            raw,
            normalized: raw.clamp(0.0, 1.0),
        })
    }

    fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    fn metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics.as_ref()
    }

    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}
