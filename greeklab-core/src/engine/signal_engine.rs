//! SignalEngine — the surface the execution layer talks to.
//!
//! Entry scoring and exit checks read one published state snapshot per call
//! (per cycle for `scan`). Outcomes feed the learning loop, which either runs
//! inline or on the trainer thread and publishes a new snapshot on success.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::learner::{Learner, LearningJob};
use super::ports::{Journal, SnapshotProvider};
use super::state::{EngineState, StateCell, TrainingRecord};
use super::trainer::{self, TrainerEvent, TrainerHandle, TrainingMode};
use crate::confidence::{aggregate, ConfidenceScore};
use crate::config::EngineConfig;
use crate::domain::{EntrySnapshot, MarketSnapshot, Position, Signal, SignalId, TradeOutcome};
use crate::error::{EngineError, EngineResult};
use crate::exit::ExitMonitor;
use crate::factors::FactorWeights;
use crate::features::FeatureExtractor;
use crate::feedback::{FeedbackDue, LearningInsights, OutcomeFeedback};
use crate::gate::{DecisionGate, NoRiskLimits, RiskPrecheck};
use crate::models::EnsembleModel;
use crate::persist::PersistedState;

/// Entry evaluation with the context needed to open a position on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub signal: Signal,
    pub confidence: ConfidenceScore,
    /// Features and factor readings at entry, kept for the outcome record.
    pub entry: EntrySnapshot,
    pub snapshot: MarketSnapshot,
}

/// Symbol left out of a scan cycle, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub code: String,
    pub reason: String,
}

impl SkippedSymbol {
    fn new(symbol: &str, error: &EngineError) -> Self {
        Self {
            symbol: symbol.to_string(),
            code: error.code().to_string(),
            reason: error.to_string(),
        }
    }
}

/// Signal the journal refused to store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalFailure {
    pub signal: SignalId,
    pub reason: String,
}

impl JournalFailure {
    pub fn new(signal: &Signal, error: &EngineError) -> Self {
        Self {
            signal: signal.id.clone(),
            reason: error.to_string(),
        }
    }
}

/// Result of one scan cycle.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Version of the state snapshot every evaluation used.
    pub state_version: u64,
    /// In input symbol order.
    pub evaluations: Vec<Evaluation>,
    pub skipped: Vec<SkippedSymbol>,
    /// Symbols not reached because the cycle was cancelled.
    pub cancelled: Vec<String>,
    /// Emitted signals that did not reach the journal.
    pub journal_failures: Vec<JournalFailure>,
}

impl ScanReport {
    pub fn signals(&self) -> impl Iterator<Item = &Signal> + '_ {
        self.evaluations.iter().map(|e| &e.signal)
    }

    pub fn actionable(&self) -> impl Iterator<Item = &Evaluation> + '_ {
        self.evaluations.iter().filter(|e| e.signal.is_actionable())
    }
}

pub struct SignalEngine {
    config: EngineConfig,
    extractor: FeatureExtractor,
    gate: DecisionGate,
    exits: ExitMonitor,
    risk: Arc<dyn RiskPrecheck>,
    provider: Option<Arc<dyn SnapshotProvider>>,
    journal: Option<Arc<dyn Journal>>,
    cell: Arc<StateCell>,
    feedback: Mutex<OutcomeFeedback>,
    learner: Learner,
    trainer: Option<TrainerHandle>,
}

impl SignalEngine {
    pub fn new(config: EngineConfig, mode: TrainingMode) -> EngineResult<Self> {
        config.validate()?;
        let cell = Arc::new(StateCell::new(EngineState::initial(&config)));
        let learner = Learner::new(&config);
        let trainer = match mode {
            TrainingMode::Inline => None,
            TrainingMode::Background => Some(TrainerHandle::spawn(learner.clone(), Arc::clone(&cell))),
        };
        Ok(Self {
            extractor: FeatureExtractor::new(config.extractor.clone()),
            gate: DecisionGate::new(config.gate.clone()),
            exits: ExitMonitor::new(config.exit.clone()),
            risk: Arc::new(NoRiskLimits),
            provider: None,
            journal: None,
            feedback: Mutex::new(OutcomeFeedback::new(config.feedback.clone())),
            cell,
            learner,
            trainer,
            config,
        })
    }

    pub fn with_provider(mut self, provider: Arc<dyn SnapshotProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_risk(mut self, risk: Arc<dyn RiskPrecheck>) -> Self {
        self.risk = risk;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn training_mode(&self) -> TrainingMode {
        if self.trainer.is_some() {
            TrainingMode::Background
        } else {
            TrainingMode::Inline
        }
    }

    // ── Entry path ──────────────────────────────────────────────────────

    /// Fetch the latest snapshot for `symbol` and evaluate it.
    pub fn evaluate(&self, symbol: &str) -> EngineResult<Signal> {
        let snapshot = self.fetch(symbol)?;
        self.evaluate_snapshot(&snapshot)
    }

    pub fn evaluate_snapshot(&self, snapshot: &MarketSnapshot) -> EngineResult<Signal> {
        self.evaluate_detailed(snapshot).map(|e| e.signal)
    }

    pub fn evaluate_detailed(&self, snapshot: &MarketSnapshot) -> EngineResult<Evaluation> {
        let state = self.cell.load();
        self.evaluate_with(&state, snapshot)
    }

    fn evaluate_with(&self, state: &EngineState, snapshot: &MarketSnapshot) -> EngineResult<Evaluation> {
        let vector = self.extractor.extract(snapshot)?;
        let pattern = state.pattern.score(&vector)?;
        let trend = state.trend.score(&vector)?;
        let confidence = aggregate(&pattern, &trend, &vector, &state.weights);
        let risk = self.risk.check(&snapshot.symbol, snapshot);
        let signal = self.gate.decide(&confidence, &vector, &risk, state.version);
        let entry = EntrySnapshot {
            readings: confidence.contributions.map(|_, c| c.reading.value),
            features: vector,
        };
        Ok(Evaluation {
            signal,
            confidence,
            entry,
            snapshot: snapshot.clone(),
        })
    }

    /// Evaluate every symbol against one state snapshot.
    ///
    /// Symbols are independent: a failed fetch or a malformed snapshot skips
    /// that symbol only. Setting `cancel` stops the cycle at the next symbol
    /// boundary. Emitted signals are journaled in symbol order when a journal
    /// is attached.
    pub fn scan(&self, symbols: &[String], cancel: &AtomicBool) -> ScanReport {
        let state = self.cell.load();
        let results: Vec<(&String, Option<EngineResult<Evaluation>>)> = symbols
            .par_iter()
            .map(|symbol| {
                if cancel.load(Ordering::Relaxed) {
                    return (symbol, None);
                }
                let result = self
                    .fetch(symbol)
                    .and_then(|snapshot| self.evaluate_with(&state, &snapshot));
                (symbol, Some(result))
            })
            .collect();

        let mut report = ScanReport {
            state_version: state.version,
            ..ScanReport::default()
        };
        for (symbol, result) in results {
            match result {
                None => report.cancelled.push(symbol.clone()),
                Some(Ok(evaluation)) => report.evaluations.push(evaluation),
                Some(Err(e)) => {
                    warn!(symbol = %symbol, error = %e, "symbol skipped");
                    report.skipped.push(SkippedSymbol::new(symbol, &e));
                }
            }
        }

        if let Some(journal) = &self.journal {
            let failures: Vec<JournalFailure> = report
                .signals()
                .filter_map(|signal| {
                    let e = journal.append_signal(signal).err()?;
                    warn!(signal = %signal.id, error = %e, "signal not journaled");
                    Some(JournalFailure::new(signal, &e))
                })
                .collect();
            report.journal_failures = failures;
        }

        info!(
            state_version = report.state_version,
            evaluated = report.evaluations.len(),
            actionable = report.actionable().count(),
            skipped = report.skipped.len(),
            cancelled = report.cancelled.len(),
            journal_failures = report.journal_failures.len(),
            "scan cycle complete"
        );
        report
    }

    fn fetch(&self, symbol: &str) -> EngineResult<MarketSnapshot> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| EngineError::data_unavailable(symbol, "no snapshot provider attached"))?;
        provider.get_snapshot(symbol)
    }

    // ── Exit path ───────────────────────────────────────────────────────

    pub fn evaluate_exit(&self, position: &Position, snapshot: &MarketSnapshot) -> EngineResult<Option<Signal>> {
        let state = self.cell.load();
        self.exits.evaluate(position, snapshot, state.version)
    }

    // ── Feedback path ───────────────────────────────────────────────────

    /// Journal the outcome, add it to the history and start whatever
    /// learning it made due. A journal failure rejects the outcome so the
    /// caller can retry without double counting.
    pub fn record_outcome(&self, outcome: TradeOutcome) -> EngineResult<FeedbackDue> {
        if let Some(journal) = &self.journal {
            journal.append_outcome(&outcome)?;
        }
        let requested_at = outcome.closed_at;
        let mut feedback = self.feedback.lock().unwrap_or_else(PoisonError::into_inner);
        let due = feedback.record(outcome);
        if !due.any() {
            return Ok(due);
        }

        let job = LearningJob {
            history: feedback.history(),
            reweight: due.reweight,
            retrain: due.retrain,
            requested_at,
        };
        match &self.trainer {
            Some(trainer) => trainer.submit(job)?,
            None => {
                let never = AtomicBool::new(false);
                trainer::run_job(&self.learner, &self.cell, &job, &never);
            }
        }
        if due.reweight {
            feedback.weights_accepted(requested_at);
        }
        if due.retrain {
            feedback.training_accepted();
        }
        debug!(reweight = due.reweight, retrain = due.retrain, "learning job accepted");
        Ok(due)
    }

    /// Reload outcomes closed since `since` from the journal into the
    /// feedback history. Returns how many were loaded.
    pub fn warm_start(&self, since: DateTime<Utc>) -> EngineResult<usize> {
        let Some(journal) = &self.journal else {
            return Ok(0);
        };
        let outcomes = journal.query_outcomes(since)?;
        let n = outcomes.len();
        self.feedback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .seed(outcomes);
        info!(outcomes = n, "feedback history restored from journal");
        Ok(n)
    }

    /// Force a learning pass over the current history.
    pub fn learn_now(&self, reweight: bool, retrain: bool) -> EngineResult<TrainerEvent> {
        let mut feedback = self.feedback.lock().unwrap_or_else(PoisonError::into_inner);
        let history = feedback.history();
        let requested_at = history.last().map(|o| o.closed_at).unwrap_or_else(Utc::now);
        let job = LearningJob {
            history,
            reweight,
            retrain,
            requested_at,
        };
        let never = AtomicBool::new(false);
        let event = trainer::run_job(&self.learner, &self.cell, &job, &never);
        if reweight {
            feedback.weights_accepted(requested_at);
        }
        if retrain {
            feedback.training_accepted();
        }
        Ok(event)
    }

    /// Trainer events since the last call. Empty in inline mode.
    pub fn trainer_events(&self) -> Vec<TrainerEvent> {
        self.trainer.as_ref().map(TrainerHandle::drain).unwrap_or_default()
    }

    /// Block for the next trainer event. `None` in inline mode or on timeout.
    pub fn wait_for_trainer(&self, timeout: std::time::Duration) -> Option<TrainerEvent> {
        self.trainer.as_ref().and_then(|t| t.next_event(timeout))
    }

    // ── Inspection & persistence ────────────────────────────────────────

    pub fn current_weights(&self) -> FactorWeights {
        self.cell.load().weights.clone()
    }

    pub fn state(&self) -> Arc<EngineState> {
        self.cell.load()
    }

    pub fn learning_curve(&self) -> Vec<TrainingRecord> {
        self.cell.load().training_history.clone()
    }

    pub fn outcome_history(&self) -> Vec<TradeOutcome> {
        self.feedback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history()
    }

    pub fn insights(&self) -> Option<LearningInsights> {
        let history = self.outcome_history();
        LearningInsights::from_history(&history, &self.current_weights())
    }

    pub fn persisted(&self, saved_at: DateTime<Utc>) -> PersistedState {
        PersistedState::capture(&self.cell.load(), saved_at)
    }

    /// Publish a previously saved state. Fails without side effects on a
    /// schema mismatch.
    pub fn restore(&self, persisted: PersistedState) -> EngineResult<u64> {
        let state = persisted.into_state()?;
        let version = self.cell.publish(state);
        info!(version, "engine state restored");
        Ok(version)
    }
}

impl std::fmt::Debug for SignalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalEngine")
            .field("state_version", &self.cell.load().version)
            .field("mode", &self.training_mode())
            .field("provider", &self.provider.is_some())
            .field("journal", &self.journal.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::domain::outcome::fixtures::outcome_with_return;
    use crate::domain::snapshot::fixtures::call_snapshot;
    use crate::domain::{Action, ReasonCode};
    use crate::gate::RiskVerdict;

    struct MapProvider(HashMap<String, MarketSnapshot>);

    impl SnapshotProvider for MapProvider {
        fn get_snapshot(&self, symbol: &str) -> EngineResult<MarketSnapshot> {
            self.0
                .get(symbol)
                .cloned()
                .ok_or_else(|| EngineError::data_unavailable(symbol, "no quote"))
        }
    }

    struct Closed;

    impl RiskPrecheck for Closed {
        fn check(&self, _symbol: &str, _snapshot: &MarketSnapshot) -> RiskVerdict {
            RiskVerdict::fail("outside trading hours")
        }
    }

    fn engine() -> SignalEngine {
        let mut quotes = HashMap::new();
        quotes.insert("NIFTY".to_string(), call_snapshot());
        let mut bad = call_snapshot();
        bad.symbol = "BROKEN".into();
        bad.price = f64::NAN;
        quotes.insert("BROKEN".to_string(), bad);
        SignalEngine::new(EngineConfig::default(), TrainingMode::Inline)
            .unwrap()
            .with_provider(Arc::new(MapProvider(quotes)))
    }

    #[test]
    fn evaluate_fixture_buys() {
        let s = engine().evaluate("NIFTY").unwrap();
        assert_eq!(s.action, Action::Buy);
        assert_eq!(s.state_version, 0);
    }

    #[test]
    fn evaluate_is_reproducible() {
        let e = engine();
        assert_eq!(e.evaluate("NIFTY").unwrap(), e.evaluate("NIFTY").unwrap());
    }

    #[test]
    fn missing_provider_is_data_unavailable() {
        let e = SignalEngine::new(EngineConfig::default(), TrainingMode::Inline).unwrap();
        assert!(matches!(e.evaluate("NIFTY"), Err(EngineError::DataUnavailable { .. })));
    }

    #[test]
    fn scan_isolates_failures() {
        let e = engine();
        let symbols: Vec<String> = ["NIFTY", "BROKEN", "MISSING"].iter().map(|s| s.to_string()).collect();
        let report = e.scan(&symbols, &AtomicBool::new(false));
        assert_eq!(report.evaluations.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].symbol, "BROKEN");
        assert_eq!(report.skipped[1].code, EngineError::data_unavailable("", "").code());
    }

    #[test]
    fn cancelled_scan_evaluates_nothing() {
        let e = engine();
        let report = e.scan(&["NIFTY".to_string()], &AtomicBool::new(true));
        assert!(report.evaluations.is_empty());
        assert_eq!(report.cancelled, vec!["NIFTY".to_string()]);
    }

    #[test]
    fn risk_precheck_blocks() {
        let e = engine().with_risk(Arc::new(Closed));
        let s = e.evaluate("NIFTY").unwrap();
        assert_eq!(s.reason, ReasonCode::RiskBlocked);
    }

    #[test]
    fn inline_reweight_publishes_bounded_change() {
        let mut config = EngineConfig::default();
        config.feedback.weight_update_every = 20;
        config.feedback.retrain_batch = 1_000;
        let e = SignalEngine::new(config, TrainingMode::Inline).unwrap();
        let before = e.current_weights();
        for i in 0..20 {
            let mut o = outcome_with_return(i, if i % 2 == 0 { 0.1 } else { -0.1 });
            // delta reading tracks the winners
            o.entry.readings[crate::factors::Factor::Delta] = if i % 2 == 0 { 0.9 } else { 0.2 };
            e.record_outcome(o).unwrap();
        }
        let after = e.current_weights();
        assert_eq!(e.state().version, 1);
        assert!(after.max_abs_diff(&before) <= 0.05 + 1e-12);
        assert!(after.get(crate::factors::Factor::Delta) > before.get(crate::factors::Factor::Delta));
    }

    #[test]
    fn restore_rejects_stale_schema() {
        let e = engine();
        let mut p = e.persisted(Utc::now());
        p.feature_schema_version += 1;
        assert!(matches!(e.restore(p), Err(EngineError::SchemaMismatch { .. })));
        assert_eq!(e.state().version, 0);
    }
}
