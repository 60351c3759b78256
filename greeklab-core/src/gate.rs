//! DecisionGate — turns a confidence score into a BUY/SELL/HOLD signal.
//!
//! Two stages. The precondition stage blocks on risk or liquidity failures
//! regardless of confidence. The threshold stage emits the side whose
//! confidence clears the threshold; when both clear, the strictly larger one
//! wins and an exact tie holds.

use serde::{Deserialize, Serialize};

use crate::confidence::ConfidenceScore;
use crate::domain::{Action, Contribution, MarketSnapshot, ReasonCode, Signal, SignalId};
use crate::error::{EngineError, EngineResult};
use crate::factors::scoring::describe;
use crate::factors::Side;
use crate::features::{Feature, FeatureVector};

/// External risk gate: position limits, loss caps, trading hours.
pub trait RiskPrecheck: Send + Sync {
    fn check(&self, symbol: &str, snapshot: &MarketSnapshot) -> RiskVerdict;
}

/// Outcome of a risk precheck. Empty `failures` means pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub failures: Vec<String>,
}

impl RiskVerdict {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            failures: vec![reason.into()],
        }
    }

    pub fn is_pass(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Precheck that never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRiskLimits;

impl RiskPrecheck for NoRiskLimits {
    fn check(&self, _symbol: &str, _snapshot: &MarketSnapshot) -> RiskVerdict {
        RiskVerdict::pass()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// A side clears when its confidence is at least this value.
    pub threshold: f64,
    pub min_volume: f64,
    pub min_open_interest: f64,
    /// Largest acceptable spread as a fraction of the reference premium.
    pub max_spread_ratio: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: 0.60,
            min_volume: 100.0,
            min_open_interest: 500.0,
            max_spread_ratio: 0.05,
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "gate threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.min_volume < 0.0 || self.min_open_interest < 0.0 || self.max_spread_ratio <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "gate liquidity limits must be non-negative and max_spread_ratio positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecisionGate {
    config: GateConfig,
}

impl DecisionGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Liquidity failures for a vector, in check order.
    pub fn liquidity_failures(&self, vector: &FeatureVector) -> Vec<String> {
        let mut failures = Vec::new();
        let liq = &vector.liquidity;
        if liq.volume < self.config.min_volume {
            failures.push(format!(
                "volume {:.0} below minimum {:.0}",
                liq.volume, self.config.min_volume
            ));
        }
        if liq.open_interest < self.config.min_open_interest {
            failures.push(format!(
                "open interest {:.0} below minimum {:.0}",
                liq.open_interest, self.config.min_open_interest
            ));
        }
        let spread = vector.get(Feature::SpreadRatio);
        if spread > self.config.max_spread_ratio {
            failures.push(format!(
                "spread {:.2}% above maximum {:.2}%",
                spread * 100.0,
                self.config.max_spread_ratio * 100.0
            ));
        }
        failures
    }

    /// Decide on an entry signal.
    pub fn decide(
        &self,
        confidence: &ConfidenceScore,
        vector: &FeatureVector,
        risk: &RiskVerdict,
        state_version: u64,
    ) -> Signal {
        let mut failures = risk.failures.clone();
        failures.extend(self.liquidity_failures(vector));

        let lead = confidence.leading_side();
        let (action, side, reason) = if !failures.is_empty() {
            (Action::Hold, lead, ReasonCode::RiskBlocked)
        } else {
            self.threshold_stage(confidence)
        };

        let mut reasoning = Vec::new();
        match reason {
            ReasonCode::RiskBlocked => {
                reasoning.push(ReasonCode::RiskBlocked.as_str().to_string());
                reasoning.extend(failures);
            }
            ReasonCode::ConflictTie => reasoning.push(format!(
                "{}: bullish and bearish evidence tied at {:.4}",
                reason, confidence.bullish
            )),
            _ => reasoning.push(format!(
                "{}: {} confidence {:.4} vs threshold {:.2}",
                reason,
                side.as_str(),
                confidence.side(side),
                self.config.threshold
            )),
        }
        reasoning.extend(explain(confidence, side));

        let signal_confidence = if action == Action::Hold {
            confidence.value
        } else {
            confidence.side(side)
        };

        let provenance = &vector.provenance;
        Signal {
            id: SignalId::derive(&provenance.symbol, provenance.timestamp, action),
            symbol: provenance.symbol.clone(),
            action,
            confidence: signal_confidence,
            reason,
            reasoning,
            contributions: contributions(confidence, side),
            generated_at: provenance.timestamp,
            source: provenance.source,
            state_version,
        }
    }

    fn threshold_stage(&self, c: &ConfidenceScore) -> (Action, Side, ReasonCode) {
        let t = self.config.threshold;
        let bull = c.bullish >= t;
        let bear = c.bearish >= t;
        let buy = (Action::Buy, Side::Bullish, ReasonCode::BullishSetup);
        let sell = (Action::Sell, Side::Bearish, ReasonCode::BearishSetup);
        match (bull, bear) {
            (true, false) => buy,
            (false, true) => sell,
            (true, true) if c.bullish > c.bearish => buy,
            (true, true) if c.bearish > c.bullish => sell,
            (true, true) => (Action::Hold, Side::Bullish, ReasonCode::ConflictTie),
            (false, false) => (Action::Hold, c.leading_side(), ReasonCode::BelowThreshold),
        }
    }
}

/// One reasoning line per factor, strongest weighted contribution first.
fn explain(confidence: &ConfidenceScore, side: Side) -> Vec<String> {
    let mut lines: Vec<_> = confidence.contributions.iter().collect();
    lines.sort_by(|(fa, a), (fb, b)| {
        b.on_side(side)
            .total_cmp(&a.on_side(side))
            .then(fa.cmp(fb))
    });
    lines
        .into_iter()
        .map(|(f, c)| {
            format!(
                "{} {:.2} x {:.3} = {:.4} ({}): {}",
                f.label(),
                c.reading.value,
                c.weight,
                c.on_side(side),
                c.reading.bias.as_str(),
                describe(f, &c.reading)
            )
        })
        .collect()
}

/// Numeric audit trail, in fixed factor order.
fn contributions(confidence: &ConfidenceScore, side: Side) -> Vec<Contribution> {
    confidence
        .contributions
        .iter()
        .map(|(f, c)| Contribution {
            label: f.name().to_string(),
            raw: c.reading.value,
            weight: c.weight,
            weighted: c.on_side(side),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::aggregate;
    use crate::domain::snapshot::fixtures::call_snapshot;
    use crate::factors::FactorWeights;
    use crate::features::FeatureExtractor;
    use crate::models::{ModelId, ModelScore};

    fn vector() -> FeatureVector {
        FeatureExtractor::default().extract(&call_snapshot()).unwrap()
    }

    fn gate() -> DecisionGate {
        DecisionGate::default()
    }

    #[test]
    fn fixture_is_a_buy() {
        let v = vector();
        let c = aggregate(
            &ModelScore::neutral(ModelId::Pattern),
            &ModelScore::neutral(ModelId::Trend),
            &v,
            &FactorWeights::default(),
        );
        let s = gate().decide(&c, &v, &RiskVerdict::pass(), 1);
        assert_eq!(s.action, Action::Buy);
        assert_eq!(s.reason, ReasonCode::BullishSetup);
        assert!(s.confidence >= 0.60);
        assert_eq!(s.contributions.len(), 9);
        assert_eq!(s.generated_at, v.provenance.timestamp);
        assert_eq!(s.state_version, 1);
        // headline + one line per factor
        assert_eq!(s.reasoning.len(), 10);
    }

    #[test]
    fn exact_threshold_clears() {
        let s = gate().decide(&ConfidenceScore::from_sides(0.60, 0.1), &vector(), &RiskVerdict::pass(), 0);
        assert_eq!(s.action, Action::Buy);
        assert_eq!(s.confidence, 0.60);
    }

    #[test]
    fn just_below_threshold_holds() {
        let below = 0.60 - 1e-9;
        let s = gate().decide(&ConfidenceScore::from_sides(below, 0.1), &vector(), &RiskVerdict::pass(), 0);
        assert_eq!(s.action, Action::Hold);
        assert_eq!(s.reason, ReasonCode::BelowThreshold);
    }

    #[test]
    fn bearish_side_sells() {
        let s = gate().decide(&ConfidenceScore::from_sides(0.3, 0.7), &vector(), &RiskVerdict::pass(), 0);
        assert_eq!(s.action, Action::Sell);
        assert_eq!(s.reason, ReasonCode::BearishSetup);
        assert_eq!(s.confidence, 0.7);
    }

    #[test]
    fn conflicting_sides_strictly_larger_wins() {
        let s = gate().decide(&ConfidenceScore::from_sides(0.65, 0.7), &vector(), &RiskVerdict::pass(), 0);
        assert_eq!(s.action, Action::Sell);
    }

    #[test]
    fn exact_tie_holds() {
        let s = gate().decide(&ConfidenceScore::from_sides(0.7, 0.7), &vector(), &RiskVerdict::pass(), 0);
        assert_eq!(s.action, Action::Hold);
        assert_eq!(s.reason, ReasonCode::ConflictTie);
    }

    #[test]
    fn thin_volume_blocks_regardless_of_confidence() {
        let mut snap = call_snapshot();
        snap.volume = 50.0;
        let v = FeatureExtractor::default().extract(&snap).unwrap();
        let s = gate().decide(&ConfidenceScore::from_sides(0.99, 0.0), &v, &RiskVerdict::pass(), 0);
        assert_eq!(s.action, Action::Hold);
        assert_eq!(s.reason, ReasonCode::RiskBlocked);
        assert_eq!(s.reasoning[0], "risk-blocked");
        assert!(s.reasoning[1].starts_with("volume 50"));
    }

    #[test]
    fn external_risk_failure_blocks() {
        let s = gate().decide(
            &ConfidenceScore::from_sides(0.9, 0.0),
            &vector(),
            &RiskVerdict::fail("outside trading hours"),
            0,
        );
        assert_eq!(s.reason, ReasonCode::RiskBlocked);
        assert_eq!(s.reasoning[1], "outside trading hours");
    }

    #[test]
    fn wide_spread_blocks() {
        let mut v = vector();
        v.values[Feature::SpreadRatio.index()] = 0.08;
        assert_eq!(gate().liquidity_failures(&v).len(), 1);
    }

    #[test]
    fn config_validation() {
        assert!(GateConfig::default().validate().is_ok());
        let bad = GateConfig {
            threshold: 1.5,
            ..GateConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
