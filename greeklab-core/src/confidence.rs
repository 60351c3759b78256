//! ConfidenceAggregator — blends factor readings and model scores into one
//! auditable confidence value.
//!
//! For each side `s`:
//!
//! ```text
//! conf_s = Σ_f  w_f · c_f · [bias_f supports s]
//! ```
//!
//! with `c_f` clamped to [0, 1] and neutral readings supporting both sides.
//! Weights sum to 1, so both side totals lie in [0, 1]. The headline value is
//! the larger side.

use serde::{Deserialize, Serialize};

use crate::factors::{market_reading, Bias, Factor, FactorMap, FactorWeights, Reading, Side};
use crate::features::FeatureVector;
use crate::models::ModelScore;

/// One factor's line in the confidence breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    pub reading: Reading,
    pub weight: f64,
    /// Weighted contribution counted towards the bullish side.
    pub bullish: f64,
    /// Weighted contribution counted towards the bearish side.
    pub bearish: f64,
}

impl FactorContribution {
    fn new(reading: Reading, weight: f64) -> Self {
        let on = |side| {
            if reading.bias.supports(side) {
                weight * reading.value
            } else {
                0.0
            }
        };
        Self {
            reading,
            weight,
            bullish: on(Side::Bullish),
            bearish: on(Side::Bearish),
        }
    }

    pub fn on_side(&self, side: Side) -> f64 {
        match side {
            Side::Bullish => self.bullish,
            Side::Bearish => self.bearish,
        }
    }
}

/// Derived every cycle; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// `max(bullish, bearish)`.
    pub value: f64,
    pub bullish: f64,
    pub bearish: f64,
    pub contributions: FactorMap<FactorContribution>,
    /// Weighted share of the two model factors on the leading side.
    pub model_contribution: f64,
}

impl ConfidenceScore {
    /// Score with uniform neutral contributions scaled to the given side
    /// totals.
    #[cfg(test)]
    pub(crate) fn from_sides(bullish: f64, bearish: f64) -> Self {
        let bullish = bullish.clamp(0.0, 1.0);
        let bearish = bearish.clamp(0.0, 1.0);
        let weight = 1.0 / Factor::COUNT as f64;
        let contributions = FactorMap::from_fn(|_| FactorContribution {
            reading: Reading::neutral(bullish.max(bearish)),
            weight,
            bullish: bullish * weight,
            bearish: bearish * weight,
        });
        Self {
            value: bullish.max(bearish),
            bullish,
            bearish,
            contributions,
            model_contribution: 2.0 * weight * bullish.max(bearish),
        }
    }

    pub fn side(&self, side: Side) -> f64 {
        match side {
            Side::Bullish => self.bullish,
            Side::Bearish => self.bearish,
        }
    }

    /// Side with the larger total; bullish on an exact tie.
    pub fn leading_side(&self) -> Side {
        if self.bearish > self.bullish {
            Side::Bearish
        } else {
            Side::Bullish
        }
    }
}

/// Reading of a model factor from its score.
///
/// The pattern model has no direction, so its probability supports both
/// sides. The trend model predicts a signed return: its bias is the sign of
/// the prediction and its strength is the distance of the normalised score
/// from the neutral 0.5 mirrored into [0.5, 1].
fn model_reading(factor: Factor, score: &ModelScore) -> Reading {
    match factor {
        Factor::TrendModel => {
            let n = score.normalized;
            Reading::new(n.max(1.0 - n), Bias::from_sign(score.raw))
        }
        _ => Reading::neutral(score.normalized),
    }
}

/// Combine factor readings and model scores under `weights`.
pub fn aggregate(
    pattern: &ModelScore,
    trend: &ModelScore,
    vector: &FeatureVector,
    weights: &FactorWeights,
) -> ConfidenceScore {
    let contributions = FactorMap::from_fn(|f| {
        let reading = match f {
            Factor::PatternModel => model_reading(f, pattern),
            Factor::TrendModel => model_reading(f, trend),
            _ => market_reading(f, vector).unwrap_or_else(|| Reading::neutral(0.0)),
        };
        FactorContribution::new(reading, weights.get(f))
    });

    let bullish: f64 = contributions.values().iter().map(|c| c.bullish).sum();
    let bearish: f64 = contributions.values().iter().map(|c| c.bearish).sum();
    let bullish = bullish.clamp(0.0, 1.0);
    let bearish = bearish.clamp(0.0, 1.0);

    let mut score = ConfidenceScore {
        value: bullish.max(bearish),
        bullish,
        bearish,
        contributions,
        model_contribution: 0.0,
    };
    let lead = score.leading_side();
    score.model_contribution = [Factor::PatternModel, Factor::TrendModel]
        .iter()
        .map(|f| score.contributions[*f].on_side(lead))
        .sum();
    score
}
