//! External collaborators the engine consumes.
//!
//! Implementations live outside the core (quote feeds, journals on disk).
//! Every call is fallible and the engine propagates failures instead of
//! retrying inside a scoring cycle.

use chrono::{DateTime, Utc};

use crate::domain::{MarketSnapshot, Signal, TradeOutcome};
use crate::error::EngineResult;

/// Source of the latest quote for a symbol.
///
/// Failures surface as `EngineError::DataUnavailable` and mark that symbol
/// as skipped for the cycle.
pub trait SnapshotProvider: Send + Sync {
    fn get_snapshot(&self, symbol: &str) -> EngineResult<MarketSnapshot>;
}

/// Append/query store for signals and outcomes.
pub trait Journal: Send + Sync {
    fn append_outcome(&self, outcome: &TradeOutcome) -> EngineResult<()>;

    fn append_signal(&self, signal: &Signal) -> EngineResult<()>;

    /// Outcomes closed at or after `since`, oldest first.
    fn query_outcomes(&self, since: DateTime<Utc>) -> EngineResult<Vec<TradeOutcome>>;
}
