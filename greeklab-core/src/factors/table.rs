//! FactorWeights — the normalised weight table read by the aggregator.

use serde::{Deserialize, Serialize};

use super::{Factor, FactorMap};
use crate::error::{EngineError, EngineResult};

/// Tolerance on the sum-to-one invariant.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Per-factor weights in [0, 1] summing to 1.
///
/// The only constructors normalise, so a value of this type always satisfies
/// the invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FactorMap<f64>", into = "FactorMap<f64>")]
pub struct FactorWeights {
    weights: FactorMap<f64>,
}

impl FactorWeights {
    /// Normalise raw non-negative weights so they sum to 1.
    pub fn normalized(raw: FactorMap<f64>) -> EngineResult<Self> {
        for (factor, w) in raw.iter() {
            if !w.is_finite() || *w < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "weight for {factor} must be finite and non-negative, got {w}"
                )));
            }
        }
        let total = raw.sum();
        if total <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "factor weights must not all be zero".into(),
            ));
        }
        Ok(Self {
            weights: raw.map(|_, w| w / total),
        })
    }

    /// Equal weight for every factor.
    pub fn uniform() -> Self {
        Self {
            weights: FactorMap::splat(1.0 / Factor::COUNT as f64),
        }
    }

    pub fn get(&self, factor: Factor) -> f64 {
        self.weights[factor]
    }

    pub fn as_map(&self) -> &FactorMap<f64> {
        &self.weights
    }

    pub fn iter(&self) -> impl Iterator<Item = (Factor, f64)> + '_ {
        self.weights.iter().map(|(f, w)| (f, *w))
    }

    pub fn sum(&self) -> f64 {
        self.weights.sum()
    }

    /// Factor with the largest weight; earlier factors win ties.
    pub fn top_factor(&self) -> Factor {
        let mut best = Factor::ALL[0];
        for (f, w) in self.iter() {
            if w > self.get(best) {
                best = f;
            }
        }
        best
    }

    /// Largest absolute per-factor difference to `other`.
    pub fn max_abs_diff(&self, other: &FactorWeights) -> f64 {
        self.iter()
            .map(|(f, w)| (w - other.get(f)).abs())
            .fold(0.0, f64::max)
    }

    /// BLAKE3 digest of the table, for audit trails.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (f, w) in self.iter() {
            hasher.update(f.name().as_bytes());
            hasher.update(&w.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl Default for FactorWeights {
    fn default() -> Self {
        let mut w = FactorMap::splat(0.0);
        w[Factor::Delta] = 0.20;
        w[Factor::OiChange] = 0.15;
        w[Factor::Volume] = 0.15;
        w[Factor::Momentum] = 0.10;
        w[Factor::Iv] = 0.10;
        w[Factor::Spread] = 0.10;
        w[Factor::Liquidity] = 0.05;
        w[Factor::PatternModel] = 0.075;
        w[Factor::TrendModel] = 0.075;
        Self { weights: w }
    }
}

impl TryFrom<FactorMap<f64>> for FactorWeights {
    type Error = EngineError;

    fn try_from(raw: FactorMap<f64>) -> EngineResult<Self> {
        Self::normalized(raw)
    }
}

impl From<FactorWeights> for FactorMap<f64> {
    fn from(w: FactorWeights) -> Self {
        w.weights
    }
}
