//! Background trainer thread.
//!
//! Jobs arrive over an `mpsc` channel. The thread loads the current state,
//! builds the successor off-lock, and publishes it with one swap. Scoring
//! never waits on it. Events go back over a second channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::learner::{LearnReport, Learner, LearningJob};
use super::state::{EngineState, StateCell};
use crate::error::{EngineError, EngineResult};

/// Where learning jobs run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    /// On the caller's thread, before `record_outcome` returns.
    Inline,
    /// On a dedicated trainer thread.
    #[default]
    Background,
}

#[derive(Debug)]
pub enum TrainerCommand {
    Learn(LearningJob),
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum TrainerEvent {
    Published { version: u64, report: LearnReport },
    Unchanged { report: LearnReport },
    /// Job finished after cancellation was requested; result discarded.
    Discarded,
    /// The state kept moving under the job (restores, forced passes) and it
    /// gave up without publishing.
    Superseded,
}

/// Rebuilds allowed when another publish lands while a job is running.
const PUBLISH_ATTEMPTS: usize = 3;

/// Spawn the trainer thread.
pub fn spawn_trainer(
    learner: Learner,
    cell: Arc<StateCell>,
    rx: Receiver<TrainerCommand>,
    tx: Sender<TrainerEvent>,
    cancel: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("greeklab-trainer".into())
        .spawn(move || trainer_loop(learner, cell, rx, tx, cancel))
        .expect("failed to spawn trainer thread")
}

fn trainer_loop(
    learner: Learner,
    cell: Arc<StateCell>,
    rx: Receiver<TrainerCommand>,
    tx: Sender<TrainerEvent>,
    cancel: Arc<AtomicBool>,
) {
    loop {
        match rx.recv() {
            Ok(TrainerCommand::Shutdown) | Err(_) => break,
            Ok(TrainerCommand::Learn(job)) => {
                let event = run_job(&learner, &cell, &job, &cancel);
                let _ = tx.send(event);
            }
        }
    }
    debug!("trainer thread exiting");
}

/// Apply one job against the current state and publish if anything changed.
pub(crate) fn run_job(
    learner: &Learner,
    cell: &StateCell,
    job: &LearningJob,
    cancel: &AtomicBool,
) -> TrainerEvent {
    publish_successor(cell, cancel, job.history.len(), |current| learner.apply(current, job))
}

/// Build a successor of the current state and publish it against the
/// version it was built from. A publish that lost the race is rebuilt on the
/// newer state so nothing published in between is overwritten.
fn publish_successor(
    cell: &StateCell,
    cancel: &AtomicBool,
    samples: usize,
    build: impl Fn(&EngineState) -> (EngineState, LearnReport),
) -> TrainerEvent {
    for _ in 0..PUBLISH_ATTEMPTS {
        let current = cell.load();
        let (next, report) = build(&current);
        if cancel.load(Ordering::Relaxed) {
            debug!("learning job discarded after cancel");
            return TrainerEvent::Discarded;
        }
        if !report.changed() {
            return TrainerEvent::Unchanged { report };
        }
        match cell.publish_from(current.version, next) {
            Some(version) => {
                info!(version, samples, "engine state published");
                return TrainerEvent::Published { version, report };
            }
            None => debug!(base = current.version, "state moved during learning job, rebuilding"),
        }
    }
    warn!(samples, "learning job superseded");
    TrainerEvent::Superseded
}

/// Owning handle: submit jobs, drain events, shut down on drop.
#[derive(Debug)]
pub struct TrainerHandle {
    commands: Sender<TrainerCommand>,
    events: std::sync::Mutex<Receiver<TrainerEvent>>,
    cancel: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl TrainerHandle {
    pub fn spawn(learner: Learner, cell: Arc<StateCell>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (evt_tx, evt_rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let join = spawn_trainer(learner, cell, cmd_rx, evt_tx, Arc::clone(&cancel));
        Self {
            commands: cmd_tx,
            events: std::sync::Mutex::new(evt_rx),
            cancel,
            join: Some(join),
        }
    }

    pub fn submit(&self, job: LearningJob) -> EngineResult<()> {
        self.commands
            .send(TrainerCommand::Learn(job))
            .map_err(|_| EngineError::TrainerUnavailable)
    }

    /// Events produced since the last call.
    pub fn drain(&self) -> Vec<TrainerEvent> {
        match self.events.lock() {
            Ok(rx) => rx.try_iter().collect(),
            Err(poisoned) => poisoned.into_inner().try_iter().collect(),
        }
    }

    /// Block until the next event or `timeout`.
    pub fn next_event(&self, timeout: std::time::Duration) -> Option<TrainerEvent> {
        let rx = self.events.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        rx.recv_timeout(timeout).ok()
    }

    /// Stop the thread. In-flight work is discarded rather than published.
    pub fn shutdown(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        let _ = self.commands.send(TrainerCommand::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for TrainerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
