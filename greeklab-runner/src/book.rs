//! Paper position book — the owner that opens positions on entry signals,
//! applies exit signals, and produces trade outcomes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use greeklab_core::domain::{
    Action, EntrySnapshot, Position, PositionId, PositionSide, PositionStatus, Signal, SignalId,
    TradeOutcome,
};
use greeklab_core::engine::Evaluation;

use crate::config::BookConfig;
use crate::risk::RiskLedger;

/// An open position with what the engine saw when it was opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookEntry {
    pub position: Position,
    pub opened_by: SignalId,
    pub entry: EntrySnapshot,
}

#[derive(Debug)]
pub struct PaperBook {
    config: BookConfig,
    ledger: Arc<RiskLedger>,
    next_id: u64,
    open: Vec<BookEntry>,
    closed: Vec<TradeOutcome>,
}

impl PaperBook {
    pub fn new(config: BookConfig, ledger: Arc<RiskLedger>) -> Self {
        Self {
            config,
            ledger,
            next_id: 1,
            open: Vec::new(),
            closed: Vec::new(),
        }
    }

    /// Open a position on an actionable entry evaluation. BUY opens long,
    /// SELL opens short; HOLD opens nothing.
    pub fn open_from(&mut self, evaluation: &Evaluation) -> Option<&Position> {
        let side = match evaluation.signal.action {
            Action::Buy => PositionSide::Long,
            Action::Sell => PositionSide::Short,
            Action::Hold => return None,
        };
        let price = evaluation.snapshot.price;
        let (stop, target) = match side {
            PositionSide::Long => (
                price * (1.0 - self.config.stop_loss_pct),
                price * (1.0 + self.config.take_profit_pct),
            ),
            PositionSide::Short => (
                price * (1.0 + self.config.stop_loss_pct),
                (price * (1.0 - self.config.take_profit_pct)).max(0.0),
            ),
        };
        let position = Position {
            id: PositionId::from(self.next_id),
            symbol: evaluation.signal.symbol.clone(),
            entry_price: price,
            entry_time: evaluation.snapshot.timestamp,
            quantity: self.config.quantity,
            side,
            stop_loss: Some(stop),
            take_profit: Some(target),
            status: PositionStatus::Open,
        };
        self.next_id += 1;
        self.ledger.on_open(&position.symbol);
        info!(
            id = %position.id,
            symbol = %position.symbol,
            side = ?side,
            price,
            confidence = evaluation.signal.confidence,
            "opened paper position"
        );
        self.open.push(BookEntry {
            position,
            opened_by: evaluation.signal.id.clone(),
            entry: evaluation.entry.clone(),
        });
        self.open.last().map(|e| &e.position)
    }

    /// Close `id` in response to an exit signal. `None` if it is not open.
    pub fn apply_exit(
        &mut self,
        id: &PositionId,
        signal: &Signal,
        exit_price: f64,
        closed_at: DateTime<Utc>,
    ) -> Option<TradeOutcome> {
        let idx = self.open.iter().position(|e| &e.position.id == id)?;
        let BookEntry { mut position, entry, .. } = self.open.remove(idx);
        position.status = PositionStatus::Closed;
        let outcome = TradeOutcome::from_closed(&position, exit_price, closed_at, Some(signal.reason), entry);
        self.ledger.on_close(&position.symbol, outcome.realized_pnl, closed_at);
        info!(
            id = %position.id,
            symbol = %position.symbol,
            reason = %signal.reason,
            pnl = outcome.realized_pnl,
            "closed paper position"
        );
        self.closed.push(outcome.clone());
        Some(outcome)
    }

    /// Close every open position for `symbol` at `price` (session end).
    pub fn flatten(&mut self, symbol: &str, price: f64, at: DateTime<Utc>) -> Vec<TradeOutcome> {
        let ids: Vec<PositionId> = self
            .open
            .iter()
            .filter(|e| e.position.symbol == symbol)
            .map(|e| e.position.id.clone())
            .collect();
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(idx) = self.open.iter().position(|e| e.position.id == id) else {
                continue;
            };
            let BookEntry { mut position, entry, .. } = self.open.remove(idx);
            position.status = PositionStatus::Closed;
            let outcome = TradeOutcome::from_closed(&position, price, at, None, entry);
            self.ledger.on_close(symbol, outcome.realized_pnl, at);
            debug!(id = %position.id, symbol, pnl = outcome.realized_pnl, "flattened");
            self.closed.push(outcome.clone());
            outcomes.push(outcome);
        }
        outcomes
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> + '_ {
        self.open.iter().map(|e| &e.position)
    }

    pub fn open_entries(&self) -> &[BookEntry] {
        &self.open
    }

    pub fn closed(&self) -> &[TradeOutcome] {
        &self.closed
    }

    pub fn realized_pnl(&self) -> f64 {
        self.closed.iter().map(|o| o.realized_pnl).sum()
    }

    pub fn unrealized_pnl(&self, price_of: impl Fn(&str) -> Option<f64>) -> f64 {
        self.open
            .iter()
            .filter_map(|e| price_of(&e.position.symbol).map(|p| e.position.unrealized_pnl(p)))
            .sum()
    }
}
