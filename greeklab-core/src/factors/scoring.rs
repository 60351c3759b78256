//! Hand-tuned banded scores for the market factors.
//!
//! Each market factor maps one feature to a contribution in [0, 1] plus a
//! directional bias. Model factors are scored by the models themselves and
//! return `None` here.

use serde::{Deserialize, Serialize};

use super::{Bias, Factor};
use crate::features::{Feature, FeatureVector};

/// A single factor's contribution before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Contribution, clamped to [0, 1].
    pub value: f64,
    pub bias: Bias,
}

impl Reading {
    pub fn new(value: f64, bias: Bias) -> Self {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        Self { value, bias }
    }

    pub fn neutral(value: f64) -> Self {
        Self::new(value, Bias::Neutral)
    }
}

/// First band whose predicate holds, else `fallback`.
fn band(x: f64, cmp: fn(f64, f64) -> bool, bands: &[(f64, f64)], fallback: f64) -> f64 {
    bands
        .iter()
        .find(|(edge, _)| cmp(x, *edge))
        .map_or(fallback, |(_, score)| *score)
}

fn gt(x: f64, edge: f64) -> bool {
    x > edge
}

fn ge(x: f64, edge: f64) -> bool {
    x >= edge
}

fn lt(x: f64, edge: f64) -> bool {
    x < edge
}

/// Score one market factor from a feature vector.
pub fn market_reading(factor: Factor, v: &FeatureVector) -> Option<Reading> {
    let reading = match factor {
        Factor::Delta => {
            let delta = v.get(Feature::Delta);
            let score = band(delta.abs(), gt, &[(0.7, 0.9), (0.5, 0.7), (0.3, 0.5)], 0.2);
            Reading::new(score, Bias::from_sign(delta))
        }
        Factor::OiChange => {
            let r = v.get(Feature::OiChangeRatio).abs();
            Reading::neutral(band(r, gt, &[(0.20, 0.9), (0.10, 0.7), (0.05, 0.5)], 0.3))
        }
        Factor::Volume => {
            let r = v.get(Feature::VolumeRatio);
            Reading::neutral(band(r, ge, &[(2.0, 0.9), (1.5, 0.7), (1.0, 0.5)], 0.3))
        }
        Factor::Momentum => {
            let m = v.get(Feature::Momentum);
            let score = band(m.abs(), ge, &[(0.10, 0.9), (0.05, 0.7), (0.02, 0.5)], 0.3);
            let bias = if m.abs() >= 0.02 { Bias::from_sign(m) } else { Bias::Neutral };
            Reading::new(score, bias)
        }
        Factor::Iv => {
            let iv = v.get(Feature::ImpliedVolatility);
            Reading::neutral(band(iv, lt, &[(15.0, 0.3), (25.0, 0.7), (35.0, 0.5)], 0.2))
        }
        Factor::Spread => {
            let s = v.get(Feature::SpreadRatio);
            Reading::neutral(band(s, lt, &[(0.02, 0.9), (0.05, 0.7), (0.10, 0.5)], 0.2))
        }
        Factor::Liquidity => Reading::neutral(v.get(Feature::LiquidityScore)),
        Factor::PatternModel | Factor::TrendModel => return None,
    };
    Some(reading)
}

/// Qualitative wording for a reading, used in signal reasoning.
pub fn describe(factor: Factor, reading: &Reading) -> &'static str {
    let strong = reading.value >= 0.7;
    let weak = reading.value < 0.35;
    match factor {
        Factor::Delta if strong => "strong directional exposure",
        Factor::Delta if weak => "weak directional exposure",
        Factor::OiChange if strong => "significant open-interest build-up",
        Factor::OiChange if weak => "little open-interest activity",
        Factor::Volume if strong => "volume well above baseline",
        Factor::Volume if weak => "volume below baseline",
        Factor::Momentum if strong => "strong price momentum",
        Factor::Momentum if weak => "flat price momentum",
        Factor::Iv if strong => "implied volatility in the entry band",
        Factor::Iv if weak => "implied volatility outside the entry band",
        Factor::Spread if strong => "tight bid-ask spread",
        Factor::Spread if weak => "wide bid-ask spread",
        Factor::Liquidity if strong => "deep book",
        Factor::Liquidity if weak => "thin book",
        Factor::PatternModel if strong => "matches profitable historical setups",
        Factor::PatternModel if weak => "resembles losing historical setups",
        Factor::TrendModel if strong => "positive expected forward return",
        Factor::TrendModel if weak => "negative expected forward return",
        _ => "moderate",
    }
}
