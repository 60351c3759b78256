//! GreekLab Core — adaptive signal and learning engine for option quotes.
//!
//! This crate contains the decision logic:
//! - Domain types (snapshots, signals, positions, outcomes)
//! - Feature extraction under a versioned schema
//! - Closed factor set with hand-tuned scoring bands and adaptive weights
//! - Bagged-tree pattern model and boosted trend model
//! - Confidence aggregation, the BUY/SELL/HOLD gate, and the exit monitor
//! - Outcome feedback driving background reweighting and retraining
//!
//! No disk or network I/O happens here; quotes and journals come in through
//! the traits in [`engine::ports`].

pub mod confidence;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exit;
pub mod factors;
pub mod features;
pub mod feedback;
pub mod gate;
pub mod models;
pub mod persist;
pub mod rng;
pub mod weights;

pub use config::EngineConfig;
pub use engine::{SignalEngine, TrainingMode};
pub use error::{EngineError, EngineResult};
