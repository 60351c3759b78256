//! Append-only JSONL journal of signals and trade outcomes.
//!
//! One tagged JSON object per line. Appends are serialised behind a mutex so
//! concurrent writers never interleave partial lines. Reads skip malformed
//! lines, so a torn final write never hides the rest of the journal.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use greeklab_core::domain::{Signal, TradeOutcome};
use greeklab_core::engine::Journal;
use greeklab_core::{EngineError, EngineResult};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O: {0}")]
    Io(#[from] io::Error),
    #[error("journal JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<JournalError> for EngineError {
    fn from(e: JournalError) -> Self {
        EngineError::Journal(e.to_string())
    }
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalRecord {
    Signal(Signal),
    Outcome(TradeOutcome),
}

impl JournalRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JournalRecord::Signal(s) => s.generated_at,
            JournalRecord::Outcome(o) => o.closed_at,
        }
    }
}

pub struct JsonlJournal {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &JournalRecord) -> Result<(), JournalError> {
        let json = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        Ok(())
    }

    /// Every well-formed record, in file order.
    pub fn read_all(&self) -> Result<Vec<JournalRecord>, JournalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut records = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %self.path.display(), line = n + 1, error = %e, "skipping malformed journal line"),
            }
        }
        Ok(records)
    }

    pub fn signals(&self) -> Result<Vec<Signal>, JournalError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter_map(|r| match r {
                JournalRecord::Signal(s) => Some(s),
                JournalRecord::Outcome(_) => None,
            })
            .collect())
    }

    /// Outcomes closed at or after `since`, in file order.
    pub fn outcomes_since(&self, since: DateTime<Utc>) -> Result<Vec<TradeOutcome>, JournalError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter_map(|r| match r {
                JournalRecord::Outcome(o) if o.closed_at >= since => Some(o),
                _ => None,
            })
            .collect())
    }
}

impl Journal for JsonlJournal {
    fn append_outcome(&self, outcome: &TradeOutcome) -> EngineResult<()> {
        Ok(self.append(&JournalRecord::Outcome(outcome.clone()))?)
    }

    fn append_signal(&self, signal: &Signal) -> EngineResult<()> {
        Ok(self.append(&JournalRecord::Signal(signal.clone()))?)
    }

    fn query_outcomes(&self, since: DateTime<Utc>) -> EngineResult<Vec<TradeOutcome>> {
        Ok(self.outcomes_since(since)?)
    }
}

impl std::fmt::Debug for JsonlJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlJournal").field("path", &self.path).finish()
    }
}
