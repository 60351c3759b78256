use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::PositionId;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// A position owned by the external trading engine.
///
/// The exit monitor only reads positions; changes are applied by the owner in
/// response to exit signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub quantity: f64,
    pub side: PositionSide,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub status: PositionStatus,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Side-aware return as a fraction of entry price.
    pub fn return_pct(&self, current_price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        let raw = (current_price - self.entry_price) / self.entry_price;
        match self.side {
            PositionSide::Long => raw,
            PositionSide::Short => -raw,
        }
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        let per_unit = match self.side {
            PositionSide::Long => current_price - self.entry_price,
            PositionSide::Short => self.entry_price - current_price,
        };
        per_unit * self.quantity
    }

    /// Whether the price has crossed the protective stop, if one is set.
    pub fn stop_crossed(&self, current_price: f64) -> bool {
        match (self.side, self.stop_loss) {
            (PositionSide::Long, Some(stop)) => current_price <= stop,
            (PositionSide::Short, Some(stop)) => current_price >= stop,
            (_, None) => false,
        }
    }

    /// Whether the price has reached the take-profit level, if one is set.
    pub fn target_reached(&self, current_price: f64) -> bool {
        match (self.side, self.take_profit) {
            (PositionSide::Long, Some(target)) => current_price >= target,
            (PositionSide::Short, Some(target)) => current_price <= target,
            (_, None) => false,
        }
    }
}
