//! Feature vectors — the fixed, versioned numeric view of a snapshot.
//!
//! Feature order is part of the schema. A model trained under one schema
//! version must never score a vector built under another; every vector and
//! every trained model carries the version so the mismatch is detected at
//! scoring time instead of silently producing garbage.

pub mod extractor;

pub use extractor::{FeatureExtractor, ExtractorConfig};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DataSource, OptionType};
use crate::error::{EngineError, EngineResult};

/// Current feature schema version. Bump whenever [`Feature::ALL`] changes.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Number of features in the current schema.
pub const FEATURE_COUNT: usize = 12;

/// Features of schema v1, in vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Delta,
    Gamma,
    Theta,
    Vega,
    OiChangeRatio,
    VolumeRatio,
    ImpliedVolatility,
    SpreadRatio,
    Moneyness,
    TimeDecay,
    Momentum,
    LiquidityScore,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Delta,
        Feature::Gamma,
        Feature::Theta,
        Feature::Vega,
        Feature::OiChangeRatio,
        Feature::VolumeRatio,
        Feature::ImpliedVolatility,
        Feature::SpreadRatio,
        Feature::Moneyness,
        Feature::TimeDecay,
        Feature::Momentum,
        Feature::LiquidityScore,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Feature::Delta => "delta",
            Feature::Gamma => "gamma",
            Feature::Theta => "theta",
            Feature::Vega => "vega",
            Feature::OiChangeRatio => "oi_change_ratio",
            Feature::VolumeRatio => "volume_ratio",
            Feature::ImpliedVolatility => "implied_volatility",
            Feature::SpreadRatio => "spread_ratio",
            Feature::Moneyness => "moneyness",
            Feature::TimeDecay => "time_decay",
            Feature::Momentum => "momentum",
            Feature::LiquidityScore => "liquidity_score",
        }
    }
}

/// Identity of the snapshot a vector was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub source: DataSource,
    pub option_type: OptionType,
}

/// Raw liquidity figures carried alongside the model inputs for the
/// decision gate's precondition stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidityStats {
    pub volume: f64,
    pub open_interest: f64,
}

/// Ordered feature values plus the schema they were built under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub schema_version: u32,
    pub values: [f64; FEATURE_COUNT],
    pub provenance: Provenance,
    pub liquidity: LiquidityStats,
}

impl FeatureVector {
    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn symbol(&self) -> &str {
        &self.provenance.symbol
    }

    /// Reject vectors built under a different schema version.
    pub fn ensure_schema(&self, expected: u32) -> EngineResult<()> {
        if self.schema_version != expected {
            return Err(EngineError::SchemaMismatch {
                expected,
                found: self.schema_version,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_indices_follow_declaration_order() {
        for (i, f) in Feature::ALL.iter().enumerate() {
            assert_eq!(f.index(), i, "{} out of order", f.name());
        }
    }

    #[test]
    fn at_least_twelve_features() {
        assert!(FEATURE_COUNT >= 12);
    }
}
