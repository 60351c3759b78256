//! Training datasets built from realized outcomes.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::TradeOutcome;
use crate::error::{EngineError, EngineResult};
use crate::features::{FEATURE_COUNT, FEATURE_SCHEMA_VERSION};

/// One training row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub features: [f64; FEATURE_COUNT],
    pub label: f64,
}

/// Rows sharing one feature schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub samples: Vec<LabeledSample>,
}

impl Dataset {
    pub fn new(samples: Vec<LabeledSample>) -> Self {
        Self { samples }
    }

    /// Classification set: label 1 when the trade's direction was right.
    pub fn direction_labels(outcomes: &[TradeOutcome]) -> Self {
        Self::from_outcomes(outcomes, |o| if o.direction_correct { 1.0 } else { 0.0 })
    }

    /// Regression set: label is the realized side-aware return.
    pub fn return_labels(outcomes: &[TradeOutcome]) -> Self {
        Self::from_outcomes(outcomes, |o| o.return_pct)
    }

    /// Rows from outcomes recorded under the current feature schema. Outcomes
    /// from an older schema or with a non-finite label are dropped.
    pub fn from_outcomes(outcomes: &[TradeOutcome], label: impl Fn(&TradeOutcome) -> f64) -> Self {
        let mut dropped = 0usize;
        let samples = outcomes
            .iter()
            .filter_map(|o| {
                let y = label(o);
                if o.entry.features.schema_version != FEATURE_SCHEMA_VERSION || !y.is_finite() {
                    dropped += 1;
                    return None;
                }
                Some(LabeledSample {
                    features: o.entry.features.values,
                    label: y,
                })
            })
            .collect();
        if dropped > 0 {
            debug!(dropped, "outcomes excluded from training set");
        }
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn ensure_min(&self, required: usize) -> EngineResult<()> {
        if self.samples.len() < required {
            return Err(EngineError::InsufficientData {
                required,
                available: self.samples.len(),
            });
        }
        Ok(())
    }

    /// Shuffled train/test split. The test side gets
    /// `round(len * test_fraction)` rows, at least one when `len >= 2`.
    pub fn split<R: Rng>(&self, test_fraction: f64, rng: &mut R) -> Split<'_> {
        let n = self.samples.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut n_test = (n as f64 * test_fraction.clamp(0.0, 1.0)).round() as usize;
        if n >= 2 {
            n_test = n_test.clamp(1, n - 1);
        } else {
            n_test = 0;
        }
        let (test, train) = order.split_at(n_test);
        Split {
            train: train.iter().map(|&i| &self.samples[i]).collect(),
            test: test.iter().map(|&i| &self.samples[i]).collect(),
        }
    }
}

/// Borrowed view of a train/test split.
#[derive(Debug)]
pub struct Split<'a> {
    pub train: Vec<&'a LabeledSample>,
    pub test: Vec<&'a LabeledSample>,
}
