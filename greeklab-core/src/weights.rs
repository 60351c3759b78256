//! WeightOptimizer — shifts factor weights towards factors that separated
//! winners from losers.
//!
//! For each factor, outcomes are split at the median of that factor's entry
//! reading. The factor's edge is the mean return above the median minus the
//! mean return at or below it. Target weights are a floor plus a share of the
//! remaining mass proportional to positive edge. The move from current to
//! target is scaled so no single weight changes by more than `max_step`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::TradeOutcome;
use crate::error::{EngineError, EngineResult};
use crate::factors::{Factor, FactorMap, FactorWeights};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Most recent outcomes considered per update.
    pub lookback: usize,
    /// Fewer outcomes than this and the update is refused.
    pub min_outcomes: usize,
    /// Largest change of any single weight per update.
    pub max_step: f64,
    /// Minimum target weight of every factor.
    pub floor: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            lookback: 100,
            min_outcomes: 20,
            max_step: 0.05,
            floor: 0.02,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.lookback == 0 || self.min_outcomes == 0 {
            return Err(EngineError::InvalidConfig(
                "optimizer lookback and min_outcomes must be positive".into(),
            ));
        }
        if !(self.max_step > 0.0 && self.max_step <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "optimizer max_step must be in (0, 1], got {}",
                self.max_step
            )));
        }
        if !(0.0..=1.0 / Factor::COUNT as f64).contains(&self.floor) {
            return Err(EngineError::InvalidConfig(format!(
                "optimizer floor must be in [0, 1/{}], got {}",
                Factor::COUNT,
                self.floor
            )));
        }
        Ok(())
    }
}

/// Result of one optimizer pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightUpdate {
    pub weights: FactorWeights,
    /// Per-factor discriminative edge (mean return above minus at-or-below
    /// the median reading).
    pub edges: FactorMap<f64>,
    /// Largest absolute change applied to any weight.
    pub max_change: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone)]
pub struct WeightOptimizer {
    config: OptimizerConfig,
    weights: FactorWeights,
}

impl WeightOptimizer {
    pub fn new(config: OptimizerConfig, weights: FactorWeights) -> Self {
        Self { config, weights }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn current_weights(&self) -> FactorWeights {
        self.weights.clone()
    }

    /// Recompute weights from `history` (oldest first) and adopt them.
    /// On error the current weights are kept.
    pub fn update(&mut self, history: &[TradeOutcome]) -> EngineResult<FactorWeights> {
        let update = propose(&self.config, &self.weights, history)?;
        self.weights = update.weights;
        Ok(self.weights.clone())
    }
}

/// Pure optimizer step: the weights that would follow `current`.
pub fn propose(
    config: &OptimizerConfig,
    current: &FactorWeights,
    history: &[TradeOutcome],
) -> EngineResult<WeightUpdate> {
    let start = history.len().saturating_sub(config.lookback);
    let recent = &history[start..];
    if recent.len() < config.min_outcomes {
        return Err(EngineError::InsufficientData {
            required: config.min_outcomes,
            available: recent.len(),
        });
    }

    let returns: Vec<f64> = recent.iter().map(|o| o.return_pct).collect();
    let edges = FactorMap::from_fn(|f| {
        let readings: Vec<f64> = recent.iter().map(|o| o.entry.reading(f)).collect();
        edge(&readings, &returns)
    });

    let positive = edges.map(|_, e| e.max(0.0));
    let total_positive = positive.sum();
    if total_positive <= f64::EPSILON {
        debug!(samples = recent.len(), "no factor shows positive edge, weights kept");
        return Ok(WeightUpdate {
            weights: current.clone(),
            edges,
            max_change: 0.0,
            sample_count: recent.len(),
        });
    }

    let free_mass = 1.0 - Factor::COUNT as f64 * config.floor;
    let target = positive.map(|_, p| config.floor + free_mass * p / total_positive);

    let steps = target.map(|f, t| t - current.get(f));
    let largest = steps.values().iter().fold(0.0_f64, |m, s| m.max(s.abs()));
    let scale = if largest > config.max_step {
        config.max_step / largest
    } else {
        1.0
    };
    let next = FactorMap::from_fn(|f| (current.get(f) + scale * steps[f]).clamp(0.0, 1.0));
    let weights = FactorWeights::normalized(next)?;
    let max_change = weights.max_abs_diff(current);

    debug!(
        samples = recent.len(),
        max_change,
        top = %weights.top_factor(),
        "weights proposed"
    );
    Ok(WeightUpdate {
        weights,
        edges,
        max_change,
        sample_count: recent.len(),
    })
}

/// Mean return of readings above the median minus mean return of readings at
/// or below it; 0 when either side is empty.
fn edge(readings: &[f64], returns: &[f64]) -> f64 {
    let m = median(readings);
    let (mut hi_sum, mut hi_n, mut lo_sum, mut lo_n) = (0.0, 0usize, 0.0, 0usize);
    for (x, r) in readings.iter().zip(returns) {
        if *x > m {
            hi_sum += r;
            hi_n += 1;
        } else {
            lo_sum += r;
            lo_n += 1;
        }
    }
    if hi_n == 0 || lo_n == 0 {
        return 0.0;
    }
    hi_sum / hi_n as f64 - lo_sum / lo_n as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::fixtures::outcome_with_return;

    /// Outcomes where a high volume reading wins and everything else is noise.
    fn volume_driven(n: usize) -> Vec<TradeOutcome> {
        (0..n)
            .map(|i| {
                let win = i % 2 == 0;
                let mut o = outcome_with_return(i as u64, if win { 0.15 } else { -0.08 });
                o.entry.readings = FactorMap::splat(0.5);
                o.entry.readings[Factor::Volume] = if win { 0.9 } else { 0.3 };
                o
            })
            .collect()
    }

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn edge_sign() {
        let readings = [0.9, 0.1, 0.8, 0.2];
        let returns = [0.1, -0.1, 0.1, -0.1];
        assert!((edge(&readings, &returns) - 0.2).abs() < 1e-12);
        assert_eq!(edge(&[0.5; 4], &returns), 0.0);
    }

    #[test]
    fn rewards_discriminative_factor() {
        let current = FactorWeights::default();
        let update = propose(&OptimizerConfig::default(), &current, &volume_driven(40)).unwrap();
        assert!(update.weights.get(Factor::Volume) > current.get(Factor::Volume));
        assert!(update.weights.get(Factor::Delta) < current.get(Factor::Delta));
        assert!((update.weights.sum() - 1.0).abs() < 1e-9);
        assert!(update.max_change <= 0.05 + 1e-9);
        assert!(update.edges[Factor::Volume] > 0.0);
    }

    #[test]
    fn step_bounded_even_for_extreme_targets() {
        let config = OptimizerConfig {
            max_step: 0.01,
            ..OptimizerConfig::default()
        };
        let current = FactorWeights::uniform();
        let update = propose(&config, &current, &volume_driven(100)).unwrap();
        for f in Factor::ALL {
            assert!((update.weights.get(f) - current.get(f)).abs() <= 0.01 + 1e-9);
        }
    }

    #[test]
    fn no_edge_keeps_weights() {
        let outcomes: Vec<_> = (0..30).map(|i| outcome_with_return(i, 0.05)).collect();
        let current = FactorWeights::default();
        let update = propose(&OptimizerConfig::default(), &current, &outcomes).unwrap();
        assert_eq!(update.weights, current);
        assert_eq!(update.max_change, 0.0);
    }

    #[test]
    fn insufficient_history_refused() {
        let mut opt = WeightOptimizer::new(OptimizerConfig::default(), FactorWeights::default());
        let err = opt.update(&volume_driven(5)).unwrap_err();
        assert_eq!(err, EngineError::InsufficientData { required: 20, available: 5 });
        assert_eq!(opt.current_weights(), FactorWeights::default());
    }

    #[test]
    fn only_lookback_window_used() {
        let config = OptimizerConfig {
            lookback: 20,
            ..OptimizerConfig::default()
        };
        let mut history: Vec<_> = (0..50).map(|i| outcome_with_return(i, 0.01)).collect();
        history.extend(volume_driven(20));
        let update = propose(&config, &FactorWeights::default(), &history).unwrap();
        assert_eq!(update.sample_count, 20);
        assert!(update.edges[Factor::Volume] > 0.0);
    }

    #[test]
    fn config_validation() {
        assert!(OptimizerConfig::default().validate().is_ok());
        let bad_floor = OptimizerConfig {
            floor: 0.2,
            ..OptimizerConfig::default()
        };
        assert!(bad_floor.validate().is_err());
        let bad_step = OptimizerConfig {
            max_step: 0.0,
            ..OptimizerConfig::default()
        };
        assert!(bad_step.validate().is_err());
    }
}
