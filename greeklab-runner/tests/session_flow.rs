//! End-to-end sessions: synthetic quotes through the engine, paper book,
//! journal and state store.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use greeklab_core::domain::DataSource;
use greeklab_core::engine::Journal;
use greeklab_core::gate::RiskPrecheck;
use greeklab_core::models::{PatternParams, TrendParams};
use greeklab_core::{EngineConfig, SignalEngine, TrainingMode};
use greeklab_runner::{
    BookConfig, JournalRecord, JsonlJournal, LimitsConfig, LimitsPrecheck, PaperBook, Pace,
    RiskLedger, Session, SessionConfig, SessionReport, StateStore, SyntheticProvider,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn engine_config() -> EngineConfig {
    EngineConfig {
        pattern: PatternParams {
            n_trees: 8,
            ..PatternParams::default()
        },
        trend: TrendParams {
            n_stages: 12,
            ..TrendParams::default()
        },
        ..EngineConfig::default()
    }
}

struct Rig {
    session: Session,
    journal: Arc<JsonlJournal>,
    clock: Arc<SyntheticProvider>,
}

fn rig(dir: &std::path::Path, failure_rate: f64, mode: TrainingMode) -> Rig {
    let limits = LimitsConfig::default();
    let ledger = Arc::new(RiskLedger::new(limits.utc_offset_secs));
    let risk: Arc<dyn RiskPrecheck> = Arc::new(LimitsPrecheck::new(limits, Arc::clone(&ledger)));
    let clock = Arc::new(SyntheticProvider::new(
        21,
        failure_rate,
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
        300,
    ));
    let journal = Arc::new(JsonlJournal::new(dir.join("journal.jsonl")));
    let engine = SignalEngine::new(engine_config(), mode)
        .unwrap()
        .with_provider(clock.clone())
        .with_journal(journal.clone())
        .with_risk(Arc::clone(&risk));
    let session = Session::new(Arc::new(engine), risk, PaperBook::new(BookConfig::default(), ledger))
        .with_journal(journal.clone())
        .with_clock(clock.clone())
        .with_store(StateStore::new(dir.join("state.json")));
    Rig {
        session,
        journal,
        clock,
    }
}

fn symbols() -> Vec<String> {
    ["NIFTY", "BANKNIFTY", "FINNIFTY", "RELIANCE", "TCS", "INFY"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn replay(cycles: u64) -> SessionConfig {
    SessionConfig {
        symbols: symbols(),
        cycles: Some(cycles),
        interval: Duration::from_secs(300),
        pace: Pace::Replay,
        flatten_at_end: true,
    }
}

fn run(dir: &std::path::Path, cycles: u64) -> (SessionReport, Rig) {
    let mut rig = rig(dir, 0.05, TrainingMode::Inline);
    let report = rig.session.run(&replay(cycles), None, None).unwrap();
    (report, rig)
}

// ── Journal ──────────────────────────────────────────────────────────

#[test]
fn journal_holds_every_signal_and_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let (report, rig) = run(dir.path(), 150);

    let records = rig.journal.read_all().unwrap();
    let outcomes: Vec<_> = records
        .iter()
        .filter(|r| matches!(r, JournalRecord::Outcome(_)))
        .collect();
    assert_eq!(outcomes.len(), report.closed);

    let entry_signals: usize = report.cycles.iter().map(|c| c.evaluated).sum();
    let signals = rig.journal.signals().unwrap();
    assert!(signals.len() >= entry_signals);
    assert!(signals.iter().all(|s| s.source == DataSource::Mock));
}

#[test]
fn failed_quotes_are_skipped_not_fabricated() {
    let dir = tempfile::tempdir().unwrap();
    let (report, _) = run(dir.path(), 80);
    let skipped: usize = report.cycles.iter().map(|c| c.skipped.len()).sum();
    assert!(skipped > 0);
    for c in &report.cycles {
        assert_eq!(c.evaluated + c.skipped.len(), symbols().len());
        assert!(c.skipped.iter().all(|s| s.code == "data-unavailable"));
    }
}

// ── Limits ───────────────────────────────────────────────────────────

#[test]
fn positions_never_exceed_limits() {
    let dir = tempfile::tempdir().unwrap();
    let (report, _) = run(dir.path(), 150);
    for c in &report.cycles {
        assert!(c.open_positions <= 10, "cycle {} has {}", c.cycle, c.open_positions);
    }
}

// ── Reproducibility ──────────────────────────────────────────────────

#[test]
fn replay_is_reproducible() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let (ra, _) = run(a.path(), 120);
    let (rb, _) = run(b.path(), 120);
    assert_eq!(ra.cycles, rb.cycles);
    assert_eq!(ra.realized_pnl, rb.realized_pnl);
    assert_eq!(
        std::fs::read(a.path().join("journal.jsonl")).unwrap(),
        std::fs::read(b.path().join("journal.jsonl")).unwrap()
    );
}

// ── Restart ──────────────────────────────────────────────────────────

#[test]
fn restart_restores_state_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let (report, first) = run(dir.path(), 200);
    let saved_weights = first.session.engine().current_weights();
    assert!(dir.path().join("state.json").exists());

    let second = rig(dir.path(), 0.05, TrainingMode::Inline);
    let engine = second.session.engine();
    StateStore::new(dir.path().join("state.json"))
        .restore_into(engine)
        .unwrap()
        .unwrap();
    assert!(engine.current_weights().max_abs_diff(&saved_weights) < 1e-12);

    let since = DateTime::<Utc>::MIN_UTC;
    assert_eq!(engine.warm_start(since).unwrap(), report.closed);
    assert_eq!(second.journal.query_outcomes(since).unwrap().len(), report.closed);
}

// ── Background training ──────────────────────────────────────────────

#[test]
fn background_session_keeps_scanning_while_training() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = rig(dir.path(), 0.0, TrainingMode::Background);
    let cancel = AtomicBool::new(false);
    let report = rig.session.run(&replay(150), None, Some(&cancel)).unwrap();
    assert_eq!(report.cycles.len(), 150);
    assert_eq!(rig.clock.cycle(), 150);
    for c in &report.cycles {
        assert!(c.state_version <= report.final_state_version);
    }
    while rig
        .session
        .engine()
        .wait_for_trainer(Duration::from_secs(5))
        .is_some()
    {}
}
