//! Periodic scan session.
//!
//! Each cycle:
//! 1. Scan every symbol against one published engine state
//! 2. Check open positions against the cycle's quotes and close on exit signals
//! 3. Feed closed trades back to the engine
//! 4. Open positions on actionable entries that still pass the risk limits
//!
//! Cancellation is checked at symbol boundaries inside the scan and between
//! cycles. A cancelled cycle never leaves a half-applied exit: positions are
//! closed and their outcomes recorded one at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use greeklab_core::domain::Position;
use greeklab_core::engine::{Journal, JournalFailure, SkippedSymbol, TrainerEvent};
use greeklab_core::gate::RiskPrecheck;
use greeklab_core::{EngineError, SignalEngine};

use crate::book::PaperBook;
use crate::store::{StateStore, StoreError};
use crate::synthetic::SyntheticProvider;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no symbols to scan")]
    NoSymbols,
    #[error("outcome rejected: {0}")]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How cycles are spaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pace {
    /// Sleep the interval between cycles.
    Live,
    /// Back to back; only the synthetic clock advances.
    Replay,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub symbols: Vec<String>,
    pub cycles: Option<u64>,
    pub interval: StdDuration,
    pub pace: Pace,
    /// Close whatever is still open at the last seen price when the session ends.
    pub flatten_at_end: bool,
}

/// Per-cycle progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub state_version: u64,
    pub evaluated: usize,
    pub actionable: usize,
    pub skipped: Vec<SkippedSymbol>,
    pub opened: usize,
    pub closed: usize,
    pub open_positions: usize,
    pub published: usize,
    pub cancelled: bool,
    /// Entry and exit signals the journal refused this cycle.
    pub journal_failures: Vec<JournalFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub cycles: Vec<CycleSummary>,
    pub opened: usize,
    pub closed: usize,
    pub realized_pnl: f64,
    pub final_state_version: u64,
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

pub struct Session {
    engine: Arc<SignalEngine>,
    risk: Arc<dyn RiskPrecheck>,
    book: PaperBook,
    journal: Option<Arc<dyn Journal>>,
    clock: Option<Arc<SyntheticProvider>>,
    store: Option<StateStore>,
    last_quote: HashMap<String, (f64, DateTime<Utc>)>,
}

impl Session {
    /// `risk` is re-checked before each entry, so limits also hold for
    /// positions opened earlier in the same cycle.
    pub fn new(engine: Arc<SignalEngine>, risk: Arc<dyn RiskPrecheck>, book: PaperBook) -> Self {
        Self {
            engine,
            risk,
            book,
            journal: None,
            clock: None,
            store: None,
            last_quote: HashMap::new(),
        }
    }

    /// Journal for exit signals. Entry signals and outcomes are journaled by
    /// the engine's own journal.
    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Synthetic clock, set to the cycle number before each scan.
    pub fn with_clock(mut self, clock: Arc<SyntheticProvider>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Save the engine state here when the session ends.
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn book(&self) -> &PaperBook {
        &self.book
    }

    pub fn engine(&self) -> &Arc<SignalEngine> {
        &self.engine
    }

    /// Run one cycle.
    pub fn run_cycle(&mut self, cycle: u64, symbols: &[String], cancel: &AtomicBool) -> Result<CycleSummary, ScanError> {
        if let Some(clock) = &self.clock {
            clock.set_cycle(cycle);
        }
        let report = self.engine.scan(symbols, cancel);
        for e in &report.evaluations {
            self.last_quote
                .insert(e.snapshot.symbol.clone(), (e.snapshot.price, e.snapshot.timestamp));
        }

        // ── Exits ──
        let quotes: HashMap<&str, _> = report
            .evaluations
            .iter()
            .map(|e| (e.snapshot.symbol.as_str(), &e.snapshot))
            .collect();
        let open: Vec<Position> = self.book.open_positions().cloned().collect();
        let mut journal_failures = report.journal_failures.clone();
        let mut closed = 0;
        for position in open {
            let Some(snapshot) = quotes.get(position.symbol.as_str()) else {
                continue;
            };
            let signal = match self.engine.evaluate_exit(&position, snapshot) {
                Ok(Some(signal)) => signal,
                Ok(None) => continue,
                Err(e) => {
                    warn!(id = %position.id, symbol = %position.symbol, error = %e, "exit check failed");
                    continue;
                }
            };
            if let Some(journal) = &self.journal {
                if let Err(e) = journal.append_signal(&signal) {
                    warn!(id = %signal.id, error = %e, "exit signal not journaled");
                    journal_failures.push(JournalFailure::new(&signal, &e));
                }
            }
            if let Some(outcome) = self
                .book
                .apply_exit(&position.id, &signal, snapshot.price, snapshot.timestamp)
            {
                self.engine.record_outcome(outcome)?;
                closed += 1;
            }
        }

        // ── Entries ──
        let mut opened = 0;
        let cancelled = cancel.load(Ordering::Relaxed) || !report.cancelled.is_empty();
        if !cancelled {
            for evaluation in report.actionable() {
                let verdict = self.risk.check(&evaluation.signal.symbol, &evaluation.snapshot);
                if !verdict.is_pass() {
                    debug!(symbol = %evaluation.signal.symbol, failures = ?verdict.failures, "entry blocked");
                    continue;
                }
                if self.book.open_from(evaluation).is_some() {
                    opened += 1;
                }
            }
        }

        let published = self
            .engine
            .trainer_events()
            .iter()
            .filter(|e| matches!(e, TrainerEvent::Published { .. }))
            .count();

        let summary = CycleSummary {
            cycle,
            state_version: report.state_version,
            evaluated: report.evaluations.len(),
            actionable: report.actionable().count(),
            skipped: report.skipped.clone(),
            opened,
            closed,
            open_positions: self.book.open_positions().count(),
            published,
            cancelled,
            journal_failures,
        };
        info!(
            cycle,
            state_version = summary.state_version,
            evaluated = summary.evaluated,
            skipped = summary.skipped.len(),
            opened,
            closed,
            open = summary.open_positions,
            journal_failures = summary.journal_failures.len(),
            "cycle complete"
        );
        Ok(summary)
    }

    /// Run cycles until the limit is reached or `cancel` is set.
    ///
    /// - `progress_cb`: called after every cycle
    /// - `cancel`: cooperative stop flag
    pub fn run(
        &mut self,
        config: &SessionConfig,
        progress_cb: Option<&dyn Fn(&CycleSummary)>,
        cancel: Option<&AtomicBool>,
    ) -> Result<SessionReport, ScanError> {
        if config.symbols.is_empty() {
            return Err(ScanError::NoSymbols);
        }
        let start_time = Instant::now();
        let never = AtomicBool::new(false);
        let cancel = cancel.unwrap_or(&never);
        let first_cycle = self.clock.as_ref().map_or(0, |c| c.cycle());

        let mut cycles = Vec::new();
        let mut cycle = first_cycle;
        loop {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            if let Some(max) = config.cycles {
                if cycle - first_cycle >= max {
                    break;
                }
            }
            let summary = self.run_cycle(cycle, &config.symbols, cancel)?;
            if let Some(cb) = progress_cb {
                cb(&summary);
            }
            cycles.push(summary);
            cycle += 1;

            let last = config.cycles.is_some_and(|max| cycle - first_cycle >= max);
            if config.pace == Pace::Live && !last {
                sleep_interruptible(config.interval, cancel);
            }
        }
        if let Some(clock) = &self.clock {
            clock.set_cycle(cycle);
        }

        if config.flatten_at_end {
            self.flatten()?;
        }
        if let Some(store) = &self.store {
            store.save_engine(&self.engine)?;
        }

        let report = SessionReport {
            opened: cycles.iter().map(|c| c.opened).sum(),
            closed: self.book.closed().len(),
            realized_pnl: self.book.realized_pnl(),
            final_state_version: self.engine.state().version,
            cancelled: cancel.load(Ordering::Relaxed),
            elapsed_secs: start_time.elapsed().as_secs_f64(),
            cycles,
        };
        info!(
            cycles = report.cycles.len(),
            opened = report.opened,
            closed = report.closed,
            pnl = report.realized_pnl,
            state_version = report.final_state_version,
            "session complete"
        );
        Ok(report)
    }

    /// Close every open position at its last seen quote.
    fn flatten(&mut self) -> Result<usize, ScanError> {
        let symbols: Vec<String> = self.book.open_positions().map(|p| p.symbol.clone()).collect();
        let mut closed = 0;
        for symbol in symbols {
            let Some(&(price, at)) = self.last_quote.get(&symbol) else {
                continue;
            };
            for outcome in self.book.flatten(&symbol, price, at) {
                self.engine.record_outcome(outcome)?;
                closed += 1;
            }
        }
        Ok(closed)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("engine", &self.engine)
            .field("book", &self.book)
            .field("clock", &self.clock)
            .finish()
    }
}

fn sleep_interruptible(total: StdDuration, cancel: &AtomicBool) {
    let slice = StdDuration::from_millis(100);
    let deadline = Instant::now() + total;
    while !cancel.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(slice.min(deadline - now));
    }
}
