//! On-disk persisted engine state.
//!
//! - One JSON document holding a `PersistedState` envelope
//! - Atomic writes (write to .tmp, rename into place)
//! - Schema checks happen when the envelope is restored into an engine

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use greeklab_core::persist::PersistedState;
use greeklab_core::{EngineError, SignalEngine};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store I/O at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("state store JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the envelope atomically.
    pub fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err(parent))?;
            }
        }
        let json = serde_json::to_vec_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(io_err(&tmp_path))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_err(&self.path)(e)
        })?;
        Ok(())
    }

    /// Read the envelope. `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&self.path)(e)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Capture the engine's current state and save it.
    pub fn save_engine(&self, engine: &SignalEngine) -> Result<PersistedState, StoreError> {
        let persisted = engine.persisted(Utc::now());
        self.save(&persisted)?;
        info!(
            path = %self.path.display(),
            state_version = persisted.state_version,
            "saved engine state"
        );
        Ok(persisted)
    }

    /// Restore the saved state into `engine`, if any. Returns the new state
    /// version. A schema mismatch leaves the engine untouched.
    pub fn restore_into(&self, engine: &SignalEngine) -> Result<Option<u64>, StoreError> {
        let Some(persisted) = self.load()? else {
            return Ok(None);
        };
        let version = engine.restore(persisted)?;
        info!(path = %self.path.display(), state_version = version, "restored engine state");
        Ok(Some(version))
    }
}
