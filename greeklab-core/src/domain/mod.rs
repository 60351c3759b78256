//! Domain types shared by every engine component.

pub mod ids;
pub mod outcome;
pub mod position;
pub mod signal;
pub mod snapshot;

pub use ids::{PositionId, SignalId};
pub use outcome::{EntrySnapshot, TradeOutcome};
pub use position::{Position, PositionSide, PositionStatus};
pub use signal::{Action, Contribution, ReasonCode, Signal};
pub use snapshot::{Baseline, DataSource, Greeks, MarketSnapshot, OptionType};
