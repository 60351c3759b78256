//! Published engine state and the cell it lives in.
//!
//! `EngineState` is immutable once published. Scoring clones the `Arc` out of
//! the cell and works on that snapshot for the whole cycle; the learner
//! builds a successor without holding the lock and swaps it in.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::factors::FactorWeights;
use crate::models::{PatternModel, TrainingMetrics, TrendModel};

/// One point on the learning curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub trained_at: DateTime<Utc>,
    pub sample_count: usize,
    pub pattern: Option<TrainingMetrics>,
    pub trend: Option<TrainingMetrics>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    /// Monotonic; bumped on every publish.
    pub version: u64,
    pub weights: FactorWeights,
    pub pattern: PatternModel,
    pub trend: TrendModel,
    pub last_weight_update: Option<DateTime<Utc>>,
    /// Oldest first, bounded by `EngineConfig::training_history_cap`.
    pub training_history: Vec<TrainingRecord>,
}

impl EngineState {
    /// Untrained models and default weights.
    pub fn initial(config: &EngineConfig) -> Self {
        Self {
            version: 0,
            weights: FactorWeights::default(),
            pattern: PatternModel::new(config.pattern.clone()),
            trend: TrendModel::new(config.trend.clone()),
            last_weight_update: None,
            training_history: Vec::new(),
        }
    }

    pub fn last_training(&self) -> Option<&TrainingRecord> {
        self.training_history.last()
    }

    pub(crate) fn push_training(&mut self, record: TrainingRecord, cap: usize) {
        self.training_history.push(record);
        if self.training_history.len() > cap {
            let excess = self.training_history.len() - cap;
            self.training_history.drain(..excess);
        }
    }
}

/// Holder of the current state. The lock guards only the pointer.
#[derive(Debug)]
pub struct StateCell {
    current: RwLock<Arc<EngineState>>,
}

impl StateCell {
    pub fn new(state: EngineState) -> Self {
        Self {
            current: RwLock::new(Arc::new(state)),
        }
    }

    /// The current snapshot.
    pub fn load(&self) -> Arc<EngineState> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Swap in `next` as the successor of whatever is current. Returns the
    /// assigned version.
    pub fn publish(&self, mut next: EngineState) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        next.version = guard.version + 1;
        let version = next.version;
        *guard = Arc::new(next);
        version
    }

    /// Swap in `next` only if the current version is still `base`, the
    /// version `next` was built from. `None` when another publish got there
    /// first; the cell is left untouched.
    pub fn publish_from(&self, base: u64, mut next: EngineState) -> Option<u64> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if guard.version != base {
            return None;
        }
        next.version = base + 1;
        *guard = Arc::new(next);
        Some(base + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_bumps_version_and_keeps_old_snapshots() {
        let cell = StateCell::new(EngineState::initial(&EngineConfig::default()));
        let before = cell.load();
        let mut next = (*before).clone();
        next.weights = FactorWeights::uniform();
        assert_eq!(cell.publish(next), 1);

        assert_eq!(before.version, 0);
        assert_eq!(before.weights, FactorWeights::default());
        let after = cell.load();
        assert_eq!(after.version, 1);
        assert_eq!(after.weights, FactorWeights::uniform());
    }

    #[test]
    fn publish_from_stale_base_is_rejected() {
        let cell = StateCell::new(EngineState::initial(&EngineConfig::default()));
        let base = cell.load();
        let mut restored = (*base).clone();
        restored.weights = FactorWeights::uniform();
        assert_eq!(cell.publish(restored), 1);

        let successor = (*base).clone();
        assert_eq!(cell.publish_from(base.version, successor), None);
        let current = cell.load();
        assert_eq!(current.version, 1);
        assert_eq!(current.weights, FactorWeights::uniform());

        assert_eq!(cell.publish_from(1, (*current).clone()), Some(2));
    }

    #[test]
    fn training_history_is_bounded() {
        let mut s = EngineState::initial(&EngineConfig::default());
        for n in 0..5 {
            s.push_training(
                TrainingRecord {
                    trained_at: Utc::now(),
                    sample_count: n,
                    pattern: None,
                    trend: None,
                },
                3,
            );
        }
        assert_eq!(s.training_history.len(), 3);
        assert_eq!(s.last_training().map(|r| r.sample_count), Some(4));
        assert_eq!(s.training_history[0].sample_count, 2);
    }
}
