//! OutcomeFeedback — bounded outcome history and learning cadence.
//!
//! Each recorded outcome advances two counters. A weight update is due after
//! `weight_update_every` new outcomes, or once the last update is older than
//! `weight_update_max_age_hours` and at least one new outcome arrived. A
//! retrain is due once the outcomes since the last one exceed `retrain_batch`
//! and the history holds enough samples to train on. Counters reset only when
//! the learner accepts the corresponding job, so a dropped job is retried on
//! the next outcome.

pub mod insights;

pub use insights::{LearningInsights, PerformanceTrend};

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::TradeOutcome;
use crate::error::{EngineError, EngineResult};
use crate::models::MIN_TRAINING_SAMPLES;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Outcomes kept in memory, most recent last.
    pub history_cap: usize,
    pub weight_update_every: usize,
    pub weight_update_max_age_hours: i64,
    /// Retrain once more than this many outcomes arrived since the last one.
    pub retrain_batch: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            history_cap: 1_000,
            weight_update_every: 30,
            weight_update_max_age_hours: 24,
            retrain_batch: MIN_TRAINING_SAMPLES,
        }
    }
}

impl FeedbackConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.history_cap == 0 || self.weight_update_every == 0 || self.retrain_batch == 0 {
            return Err(EngineError::InvalidConfig(
                "feedback history cap, weight cadence and retrain batch must be positive".into(),
            ));
        }
        if self.weight_update_max_age_hours <= 0 {
            return Err(EngineError::InvalidConfig(
                "feedback weight_update_max_age_hours must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Which learning jobs an outcome made due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackDue {
    pub reweight: bool,
    pub retrain: bool,
}

impl FeedbackDue {
    pub fn any(&self) -> bool {
        self.reweight || self.retrain
    }
}

#[derive(Debug, Clone)]
pub struct OutcomeFeedback {
    config: FeedbackConfig,
    history: VecDeque<TradeOutcome>,
    since_weight_update: usize,
    since_training: usize,
    /// Start of the current weight-update age window.
    weight_window_start: Option<DateTime<Utc>>,
    total_recorded: u64,
}

impl OutcomeFeedback {
    pub fn new(config: FeedbackConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.history_cap.min(4_096)),
            config,
            since_weight_update: 0,
            since_training: 0,
            weight_window_start: None,
            total_recorded: 0,
        }
    }

    pub fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    /// Append an outcome and report which jobs are now due. The outcome's
    /// close time is the clock for the age rule.
    pub fn record(&mut self, outcome: TradeOutcome) -> FeedbackDue {
        let now = outcome.closed_at;
        if self.history.len() == self.config.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(outcome);
        self.total_recorded += 1;
        self.since_weight_update += 1;
        self.since_training += 1;
        let window_start = *self.weight_window_start.get_or_insert(now);

        let aged = now - window_start >= Duration::hours(self.config.weight_update_max_age_hours);
        let due = FeedbackDue {
            reweight: self.since_weight_update >= self.config.weight_update_every || aged,
            retrain: self.since_training > self.config.retrain_batch
                && self.history.len() >= MIN_TRAINING_SAMPLES,
        };
        debug!(
            since_weight_update = self.since_weight_update,
            since_training = self.since_training,
            reweight = due.reweight,
            retrain = due.retrain,
            "outcome recorded"
        );
        due
    }

    /// The learner accepted a weight job issued at `at`.
    pub fn weights_accepted(&mut self, at: DateTime<Utc>) {
        self.since_weight_update = 0;
        self.weight_window_start = Some(at);
    }

    /// The learner accepted a retraining job.
    pub fn training_accepted(&mut self) {
        self.since_training = 0;
    }

    /// Oldest-first copy of the retained history.
    pub fn history(&self) -> Vec<TradeOutcome> {
        self.history.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    pub fn since_weight_update(&self) -> usize {
        self.since_weight_update
    }

    pub fn since_training(&self) -> usize {
        self.since_training
    }

    /// Replace the retained history, e.g. when replaying a journal on start.
    /// Counters restart from zero.
    pub fn seed(&mut self, outcomes: impl IntoIterator<Item = TradeOutcome>) {
        self.history.clear();
        for o in outcomes {
            if self.history.len() == self.config.history_cap {
                self.history.pop_front();
            }
            self.history.push_back(o);
        }
        self.since_weight_update = 0;
        self.since_training = 0;
        self.weight_window_start = self.history.back().map(|o| o.closed_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::fixtures::outcome_with_return;

    fn config() -> FeedbackConfig {
        FeedbackConfig {
            history_cap: 40,
            weight_update_every: 3,
            weight_update_max_age_hours: 24,
            retrain_batch: 2,
        }
    }

    #[test]
    fn history_is_bounded() {
        let mut fb = OutcomeFeedback::new(FeedbackConfig {
            history_cap: 5,
            ..config()
        });
        for i in 0..8 {
            fb.record(outcome_with_return(i, 0.01));
        }
        assert_eq!(fb.len(), 5);
        assert_eq!(fb.total_recorded(), 8);
        assert_eq!(fb.history()[0].position_ref.0, "3");
    }

    #[test]
    fn retrain_waits_for_a_trainable_history() {
        let mut fb = OutcomeFeedback::new(config());
        for i in 1..MIN_TRAINING_SAMPLES as u64 {
            assert!(!fb.record(outcome_with_return(i, 0.1)).retrain, "outcome {i}");
        }
        assert!(fb.record(outcome_with_return(30, 0.1)).retrain);
        assert_eq!(fb.since_training(), MIN_TRAINING_SAMPLES);
    }

    #[test]
    fn retrain_due_once_batch_exceeded() {
        let mut fb = OutcomeFeedback::new(config());
        fb.seed((0..MIN_TRAINING_SAMPLES as u64).map(|i| outcome_with_return(i, 0.1)));
        assert!(!fb.record(outcome_with_return(100, 0.1)).retrain);
        assert!(!fb.record(outcome_with_return(101, 0.1)).retrain);
        assert!(fb.record(outcome_with_return(102, 0.1)).retrain);
        // Not accepted yet: still due.
        assert!(fb.record(outcome_with_return(103, 0.1)).retrain);
        fb.training_accepted();
        assert!(!fb.record(outcome_with_return(104, 0.1)).retrain);
    }

    #[test]
    fn reweight_due_by_count() {
        let mut fb = OutcomeFeedback::new(config());
        let due: Vec<bool> = (0..3).map(|i| fb.record(outcome_with_return(i, 0.1)).reweight).collect();
        assert_eq!(due, vec![false, false, true]);
    }

    #[test]
    fn reweight_due_by_age() {
        let mut fb = OutcomeFeedback::new(config());
        let first = outcome_with_return(1, 0.1);
        let start = first.closed_at;
        assert!(!fb.record(first).reweight);
        let mut late = outcome_with_return(2, 0.1);
        late.closed_at = start + Duration::hours(25);
        assert!(fb.record(late).reweight);

        fb.weights_accepted(start + Duration::hours(25));
        let mut next = outcome_with_return(3, 0.1);
        next.closed_at = start + Duration::hours(26);
        assert!(!fb.record(next).reweight);
    }

    #[test]
    fn seed_replaces_history() {
        let mut fb = OutcomeFeedback::new(config());
        fb.record(outcome_with_return(1, 0.1));
        fb.seed((10..60).map(|i| outcome_with_return(i, 0.0)));
        assert_eq!(fb.len(), 40);
        assert_eq!(fb.since_training(), 0);
    }
}
