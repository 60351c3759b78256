//! Engine runtime — published state, learning, and the public facade.
//!
//! - `state`: immutable `EngineState` snapshots behind a swap cell
//! - `learner`: builds the next state from an outcome history
//! - `trainer`: background thread running learning jobs off the scoring path
//! - `ports`: traits for the quote provider and the journal
//! - `signal_engine`: `SignalEngine`, the entry/exit/feedback surface

pub mod learner;
pub mod ports;
pub mod signal_engine;
pub mod state;
pub mod trainer;

pub use learner::{LearnReport, Learner, LearningJob};
pub use ports::{Journal, SnapshotProvider};
pub use signal_engine::{Evaluation, JournalFailure, ScanReport, SignalEngine, SkippedSymbol};
pub use state::{EngineState, StateCell, TrainingRecord};
pub use trainer::{TrainerCommand, TrainerEvent, TrainerHandle, TrainingMode};
