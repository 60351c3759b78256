//! Learner — derives the next engine state from the current one.
//!
//! Each part of a job succeeds or fails on its own. A weight pass short of
//! outcomes keeps the prior weights; a model short of samples keeps its
//! prior parameters. Nothing here touches the published cell.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::state::{EngineState, TrainingRecord};
use crate::config::EngineConfig;
use crate::domain::TradeOutcome;
use crate::error::EngineResult;
use crate::models::{EnsembleModel, TrainingMetrics};
use crate::rng::RngHierarchy;
use crate::weights::{propose, OptimizerConfig, WeightUpdate};

/// Work handed to the learner by the feedback loop.
#[derive(Debug, Clone)]
pub struct LearningJob {
    /// Outcome history, oldest first.
    pub history: Vec<TradeOutcome>,
    pub reweight: bool,
    pub retrain: bool,
    pub requested_at: DateTime<Utc>,
}

/// What a job did. `None` means the part was not requested.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnReport {
    pub weights: Option<EngineResult<WeightUpdate>>,
    pub pattern: Option<EngineResult<TrainingMetrics>>,
    pub trend: Option<EngineResult<TrainingMetrics>>,
}

impl LearnReport {
    /// True when at least one part produced new state.
    pub fn changed(&self) -> bool {
        let ok = |r: &Option<EngineResult<_>>| matches!(r, Some(Ok(_)));
        ok(&self.pattern) || ok(&self.trend) || matches!(&self.weights, Some(Ok(u)) if u.max_change > 0.0)
    }
}

#[derive(Debug, Clone)]
pub struct Learner {
    optimizer: OptimizerConfig,
    rng: RngHierarchy,
    history_cap: usize,
}

impl Learner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            optimizer: config.optimizer.clone(),
            rng: RngHierarchy::new(config.seed),
            history_cap: config.training_history_cap,
        }
    }

    /// Build the successor of `current` for `job`.
    pub fn apply(&self, current: &EngineState, job: &LearningJob) -> (EngineState, LearnReport) {
        let mut next = current.clone();
        let mut report = LearnReport {
            weights: None,
            pattern: None,
            trend: None,
        };

        if job.reweight {
            let result = propose(&self.optimizer, &current.weights, &job.history);
            match &result {
                Ok(update) => {
                    info!(
                        samples = update.sample_count,
                        max_change = update.max_change,
                        top = %update.weights.top_factor(),
                        "weights updated"
                    );
                    next.weights = update.weights.clone();
                    next.last_weight_update = Some(job.requested_at);
                }
                Err(e) => debug!(error = %e, "weight update skipped"),
            }
            report.weights = Some(result);
        }

        if job.retrain {
            let (pattern, trend) = rayon::join(
                || retrain(&current.pattern, &job.history, &self.rng),
                || retrain(&current.trend, &job.history, &self.rng),
            );
            let mut record = TrainingRecord {
                trained_at: job.requested_at,
                sample_count: job.history.len(),
                pattern: None,
                trend: None,
            };
            if let Ok((model, metrics)) = &pattern {
                next.pattern = model.clone();
                record.pattern = Some(metrics.clone());
            }
            if let Ok((model, metrics)) = &trend {
                next.trend = model.clone();
                record.trend = Some(metrics.clone());
            }
            if record.pattern.is_some() || record.trend.is_some() {
                next.push_training(record, self.history_cap);
            }
            report.pattern = Some(pattern.map(|(_, m)| m));
            report.trend = Some(trend.map(|(_, m)| m));
        }

        (next, report)
    }
}

/// Train a copy of `model`; the original stays servable either way.
fn retrain<M: EnsembleModel>(
    model: &M,
    history: &[TradeOutcome],
    rng: &RngHierarchy,
) -> EngineResult<(M, TrainingMetrics)> {
    let data = M::dataset(history);
    let mut candidate = model.clone();
    match candidate.train(&data, rng) {
        Ok(metrics) => {
            info!(
                model = M::ID.as_str(),
                samples = metrics.sample_count,
                train_accuracy = metrics.train_accuracy,
                test_accuracy = metrics.test_accuracy,
                "model retrained"
            );
            Ok((candidate, metrics))
        }
        Err(e) => {
            warn!(model = M::ID.as_str(), error = %e, "retraining skipped, prior model kept");
            Err(e)
        }
    }
}
