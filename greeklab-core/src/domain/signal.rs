//! Signal — the engine's only persisted output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::SignalId;
use super::snapshot::DataSource;

/// What the engine recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }

    pub fn is_actionable(self) -> bool {
        self != Action::Hold
    }
}

/// Machine-readable reason attached to every signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    BullishSetup,
    BearishSetup,
    BelowThreshold,
    RiskBlocked,
    /// Both sides cleared the threshold with identical weighted evidence.
    ConflictTie,
    StopLoss,
    ProfitTarget,
    ThetaDecay,
    IvCollapse,
    Illiquid,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::BullishSetup => "bullish-setup",
            ReasonCode::BearishSetup => "bearish-setup",
            ReasonCode::BelowThreshold => "below-threshold",
            ReasonCode::RiskBlocked => "risk-blocked",
            ReasonCode::ConflictTie => "conflict-tie",
            ReasonCode::StopLoss => "stop-loss",
            ReasonCode::ProfitTarget => "profit-target",
            ReasonCode::ThetaDecay => "theta-decay",
            ReasonCode::IvCollapse => "iv-collapse",
            ReasonCode::Illiquid => "illiquid",
        }
    }

    pub fn is_exit(self) -> bool {
        matches!(
            self,
            ReasonCode::StopLoss
                | ReasonCode::ProfitTarget
                | ReasonCode::ThetaDecay
                | ReasonCode::IvCollapse
                | ReasonCode::Illiquid
        )
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One numeric line of a signal's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub label: String,
    /// Contribution in [0, 1] before weighting.
    pub raw: f64,
    pub weight: f64,
    /// `raw * weight`, as counted towards the emitted side.
    pub weighted: f64,
}

/// A BUY/SELL/HOLD recommendation with its full justification.
///
/// Immutable once created. Consumed by the execution engine and the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub symbol: String,
    pub action: Action,
    pub confidence: f64,
    pub reason: ReasonCode,
    /// Ordered human-readable explanations.
    pub reasoning: Vec<String>,
    /// Ordered numeric audit trail backing `confidence`.
    pub contributions: Vec<Contribution>,
    pub generated_at: DateTime<Utc>,
    pub source: DataSource,
    /// Engine state version the signal was computed against.
    pub state_version: u64,
}

impl Signal {
    pub fn is_actionable(&self) -> bool {
        self.action.is_actionable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Action::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&Action::Hold).unwrap(), "\"HOLD\"");
    }

    #[test]
    fn reason_code_serializes_kebab() {
        assert_eq!(
            serde_json::to_string(&ReasonCode::RiskBlocked).unwrap(),
            "\"risk-blocked\""
        );
        assert_eq!(
            serde_json::to_string(&ReasonCode::ProfitTarget).unwrap(),
            format!("\"{}\"", ReasonCode::ProfitTarget.as_str())
        );
    }

    #[test]
    fn exit_codes() {
        assert!(ReasonCode::StopLoss.is_exit());
        assert!(ReasonCode::Illiquid.is_exit());
        assert!(!ReasonCode::RiskBlocked.is_exit());
        assert!(!ReasonCode::BullishSetup.is_exit());
    }
}
