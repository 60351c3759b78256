//! Snapshot → feature vector extraction.
//!
//! Pure: the same snapshot always yields the same vector. Ratios against a
//! zero baseline are defined as 0 so downstream scoring stays total.

use serde::{Deserialize, Serialize};

use crate::domain::{MarketSnapshot, OptionType};
use crate::error::EngineResult;

use super::{Feature, FeatureVector, LiquidityStats, Provenance, FEATURE_COUNT, FEATURE_SCHEMA_VERSION};

/// Normalisation constants for the derived features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Volume at which the volume half of the liquidity score saturates.
    pub liquidity_volume_norm: f64,
    /// Open interest at which the OI half of the liquidity score saturates.
    pub liquidity_oi_norm: f64,
    /// e-folding horizon (days) of the time-decay feature.
    pub expiry_decay_days: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            liquidity_volume_norm: 1_000.0,
            liquidity_oi_norm: 5_000.0,
            expiry_decay_days: 30.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn schema_version(&self) -> u32 {
        FEATURE_SCHEMA_VERSION
    }

    /// Build the schema-v1 vector for one snapshot.
    pub fn extract(&self, snapshot: &MarketSnapshot) -> EngineResult<FeatureVector> {
        snapshot.validate()?;
        let greeks = snapshot.effective_greeks()?;
        let base = &snapshot.baseline;

        let mut values = [0.0; FEATURE_COUNT];
        values[Feature::Delta.index()] = greeks.delta;
        values[Feature::Gamma.index()] = greeks.gamma;
        values[Feature::Theta.index()] = greeks.theta;
        values[Feature::Vega.index()] = greeks.vega;
        values[Feature::OiChangeRatio.index()] = ratio(snapshot.oi_change, base.open_interest);
        values[Feature::VolumeRatio.index()] = ratio(snapshot.volume, base.volume);
        values[Feature::ImpliedVolatility.index()] = snapshot.implied_volatility;
        values[Feature::SpreadRatio.index()] = ratio(snapshot.bid_ask_spread, base.price);
        values[Feature::Moneyness.index()] = moneyness(snapshot);
        values[Feature::TimeDecay.index()] = self.time_decay(snapshot);
        values[Feature::Momentum.index()] = ratio(snapshot.price - base.price, base.price);
        values[Feature::LiquidityScore.index()] = self.liquidity_score(snapshot);

        Ok(FeatureVector {
            schema_version: FEATURE_SCHEMA_VERSION,
            values,
            provenance: Provenance {
                symbol: snapshot.symbol.clone(),
                timestamp: snapshot.timestamp,
                source: snapshot.source,
                option_type: snapshot.option_type,
            },
            liquidity: LiquidityStats {
                volume: snapshot.volume,
                open_interest: snapshot.open_interest,
            },
        })
    }

    fn time_decay(&self, snapshot: &MarketSnapshot) -> f64 {
        if !snapshot.option_type.is_option() || self.config.expiry_decay_days <= 0.0 {
            return 0.0;
        }
        match snapshot.days_to_expiry {
            Some(days) => (-days.max(0.0) / self.config.expiry_decay_days).exp(),
            None => 0.0,
        }
    }

    fn liquidity_score(&self, snapshot: &MarketSnapshot) -> f64 {
        let vol = saturate(snapshot.volume, self.config.liquidity_volume_norm);
        let oi = saturate(snapshot.open_interest, self.config.liquidity_oi_norm);
        0.5 * vol + 0.5 * oi
    }
}

/// `num / den`, or 0 when the baseline is zero.
fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn saturate(value: f64, norm: f64) -> f64 {
    if norm <= 0.0 {
        return 0.0;
    }
    (value / norm).clamp(0.0, 1.0)
}

fn moneyness(snapshot: &MarketSnapshot) -> f64 {
    match (snapshot.option_type, snapshot.strike) {
        (OptionType::None, _) | (_, None) => 0.0,
        (_, Some(strike)) => ratio(snapshot.spot - strike, snapshot.spot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::fixtures::call_snapshot;
    use crate::error::EngineError;

    fn extract(snap: &MarketSnapshot) -> FeatureVector {
        FeatureExtractor::default().extract(snap).unwrap()
    }

    #[test]
    fn ratios_against_baseline() {
        let v = extract(&call_snapshot());
        assert!((v.get(Feature::OiChangeRatio) - 0.12).abs() < 1e-12);
        assert!((v.get(Feature::VolumeRatio) - 2.0).abs() < 1e-12);
        assert!((v.get(Feature::SpreadRatio) - 0.005).abs() < 1e-12);
        assert_eq!(v.get(Feature::Momentum), 0.0);
    }

    #[test]
    fn greeks_copied_in_order() {
        let v = extract(&call_snapshot());
        assert_eq!(v.get(Feature::Delta), 0.55);
        assert_eq!(v.get(Feature::Gamma), 0.002);
        assert_eq!(v.get(Feature::Theta), -3.0);
        assert_eq!(v.get(Feature::Vega), 12.0);
    }

    #[test]
    fn moneyness_for_call() {
        let v = extract(&call_snapshot());
        let expected = (22_000.0 - 21_900.0) / 22_000.0;
        assert!((v.get(Feature::Moneyness) - expected).abs() < 1e-12);
    }

    #[test]
    fn moneyness_zero_for_linear_instrument() {
        let mut snap = call_snapshot();
        snap.option_type = OptionType::None;
        snap.strike = None;
        snap.greeks = None;
        let v = extract(&snap);
        assert_eq!(v.get(Feature::Moneyness), 0.0);
        assert_eq!(v.get(Feature::TimeDecay), 0.0);
        assert_eq!(v.get(Feature::Delta), 1.0);
    }

    #[test]
    fn zero_baselines_yield_zero_ratios() {
        let mut snap = call_snapshot();
        snap.baseline.volume = 0.0;
        snap.baseline.open_interest = 0.0;
        snap.baseline.price = 0.0;
        let v = extract(&snap);
        assert_eq!(v.get(Feature::VolumeRatio), 0.0);
        assert_eq!(v.get(Feature::OiChangeRatio), 0.0);
        assert_eq!(v.get(Feature::SpreadRatio), 0.0);
        assert_eq!(v.get(Feature::Momentum), 0.0);
        assert!(v.values.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn liquidity_score_saturates() {
        let v = extract(&call_snapshot());
        assert_eq!(v.get(Feature::LiquidityScore), 1.0);

        let mut thin = call_snapshot();
        thin.volume = 500.0;
        thin.open_interest = 2_500.0;
        let v = extract(&thin);
        assert!((v.get(Feature::LiquidityScore) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn time_decay_increases_towards_expiry() {
        let mut near = call_snapshot();
        near.days_to_expiry = Some(1.0);
        let mut far = call_snapshot();
        far.days_to_expiry = Some(60.0);
        assert!(extract(&near).get(Feature::TimeDecay) > extract(&far).get(Feature::TimeDecay));
    }

    #[test]
    fn non_finite_input_rejected() {
        let mut snap = call_snapshot();
        snap.implied_volatility = f64::NAN;
        let err = FeatureExtractor::default().extract(&snap).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSnapshot { .. }));
    }

    #[test]
    fn extraction_is_deterministic() {
        let snap = call_snapshot();
        assert_eq!(extract(&snap), extract(&snap));
    }

    #[test]
    fn provenance_carried() {
        let v = extract(&call_snapshot());
        assert_eq!(v.symbol(), "NIFTY");
        assert_eq!(v.schema_version, FEATURE_SCHEMA_VERSION);
        assert_eq!(v.liquidity.volume, 5_000.0);
    }
}
