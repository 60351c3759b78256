//! TradeOutcome — the realized result of a closed position.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::PositionId;
use super::position::{Position, PositionSide};
use super::signal::ReasonCode;
use crate::factors::{Factor, FactorMap};
use crate::features::FeatureVector;

/// What the engine saw when the position was opened.
///
/// The feature vector is the model training input; the per-factor readings
/// drive the weight optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub features: FeatureVector,
    /// Unweighted factor contributions in [0, 1] at entry.
    pub readings: FactorMap<f64>,
}

impl EntrySnapshot {
    pub fn reading(&self, factor: Factor) -> f64 {
        self.readings[factor]
    }
}

/// Result of one round trip, consumed once by the feedback loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    // ── Identification ──
    pub position_ref: PositionId,
    pub symbol: String,
    pub side: PositionSide,

    // ── Prices ──
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,

    // ── Result ──
    pub realized_pnl: f64,
    /// Side-aware return as a fraction of entry price.
    pub return_pct: f64,
    pub direction_correct: bool,

    // ── Timing ──
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub hold_secs: i64,

    pub exit_reason: Option<ReasonCode>,
    pub entry: EntrySnapshot,
}

impl TradeOutcome {
    /// Build the outcome of closing `position` at `exit_price`.
    pub fn from_closed(
        position: &Position,
        exit_price: f64,
        closed_at: DateTime<Utc>,
        exit_reason: Option<ReasonCode>,
        entry: EntrySnapshot,
    ) -> Self {
        let return_pct = position.return_pct(exit_price);
        let hold_secs = (closed_at - position.entry_time).num_seconds().max(0);
        Self {
            position_ref: position.id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            realized_pnl: position.unrealized_pnl(exit_price),
            return_pct,
            direction_correct: return_pct > 0.0,
            opened_at: position.entry_time,
            closed_at,
            hold_secs,
            exit_reason,
            entry,
        }
    }

    pub fn hold_duration(&self) -> Duration {
        Duration::seconds(self.hold_secs)
    }

    pub fn is_winner(&self) -> bool {
        self.realized_pnl > 0.0
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::position::PositionStatus;
    use crate::domain::snapshot::fixtures::call_snapshot;
    use crate::features::FeatureExtractor;

    /// A closed long trade on the fixture snapshot with the given return.
    pub fn outcome_with_return(id: u64, ret: f64) -> TradeOutcome {
        let snap = call_snapshot();
        let features = FeatureExtractor::default().extract(&snap).unwrap_or_else(|e| panic!("{e}"));
        let position = Position {
            id: PositionId::from(id),
            symbol: snap.symbol.clone(),
            entry_price: 100.0,
            entry_time: snap.timestamp,
            quantity: 1.0,
            side: PositionSide::Long,
            stop_loss: None,
            take_profit: None,
            status: PositionStatus::Closed,
        };
        let entry = EntrySnapshot {
            features,
            readings: FactorMap::splat(0.5),
        };
        TradeOutcome::from_closed(
            &position,
            100.0 * (1.0 + ret),
            snap.timestamp + Duration::minutes(30),
            None,
            entry,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::outcome_with_return;
    use super::*;

    #[test]
    fn winning_long() {
        let o = outcome_with_return(1, 0.2);
        assert!((o.return_pct - 0.2).abs() < 1e-12);
        assert!((o.realized_pnl - 20.0).abs() < 1e-9);
        assert!(o.direction_correct);
        assert!(o.is_winner());
        assert_eq!(o.hold_duration(), Duration::minutes(30));
    }

    #[test]
    fn losing_long() {
        let o = outcome_with_return(2, -0.1);
        assert!(!o.direction_correct);
        assert!(o.realized_pnl < 0.0);
    }

    #[test]
    fn serde_keeps_entry_snapshot() {
        let o = outcome_with_return(3, 0.05);
        let json = serde_json::to_string(&o).unwrap();
        let back: TradeOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back.position_ref, o.position_ref);
        assert_eq!(back.entry.features.schema_version, o.entry.features.schema_version);
        assert_eq!(back.entry.readings[Factor::Spread], 0.5);
        assert!((back.return_pct - o.return_pct).abs() < 1e-12);
    }
}
