//! GreekLab Runner — the adapters around the signal engine.
//!
//! This crate builds on `greeklab-core` to provide:
//! - TOML lab configuration
//! - JSONL journal of signals and outcomes, with CSV/Markdown export
//! - Atomic on-disk store for the persisted engine state
//! - Deterministic synthetic option quotes
//! - Trading-hours, position-count and daily-loss risk limits
//! - Paper position book that opens on entries and closes on exit signals
//! - The periodic scan session tying them together

pub mod book;
pub mod config;
pub mod export;
pub mod journal;
pub mod risk;
pub mod scan;
pub mod store;
pub mod synthetic;

pub use book::{BookEntry, PaperBook};
pub use config::{BookConfig, ConfigError, LabConfig, LimitsConfig, PathsConfig, ScanConfig, SyntheticConfig};
pub use export::{export_outcomes_csv, export_signals_csv, generate_learning_report, save_exports};
pub use journal::{JournalError, JournalRecord, JsonlJournal};
pub use risk::{LimitsPrecheck, RiskLedger};
pub use scan::{CycleSummary, Pace, ScanError, Session, SessionConfig, SessionReport};
pub use store::{StateStore, StoreError};
pub use synthetic::SyntheticProvider;


#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn shared_adapters_are_send_sync() {
        assert_send::<JsonlJournal>();
        assert_sync::<JsonlJournal>();
        assert_send::<SyntheticProvider>();
        assert_sync::<SyntheticProvider>();
        assert_send::<LimitsPrecheck>();
        assert_sync::<LimitsPrecheck>();
        assert_send::<RiskLedger>();
        assert_sync::<RiskLedger>();
        assert_send::<PaperBook>();
        assert_send::<LabConfig>();
    }
}
