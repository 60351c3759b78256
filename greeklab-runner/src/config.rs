//! Lab configuration — one TOML document for a scan or simulation session.
//!
//! Every table is optional; missing keys fall back to defaults, so an empty
//! file is a valid config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use greeklab_core::{EngineConfig, EngineError, TrainingMode};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Scan loop cadence and universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub symbols: Vec<String>,
    /// Seconds between cycles in live mode; also the synthetic clock step.
    pub interval_secs: u64,
    /// Stop after this many cycles. `None` runs until cancelled.
    pub cycles: Option<u64>,
    pub training_mode: TrainingMode,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            symbols: ["NIFTY", "BANKNIFTY", "FINNIFTY", "RELIANCE", "TCS", "HDFCBANK", "INFY"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            interval_secs: 300,
            cycles: None,
            training_mode: TrainingMode::Background,
        }
    }
}

/// Position and loss limits applied before any entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_daily_loss: f64,
    pub max_positions_per_symbol: usize,
    pub max_total_positions: usize,
    /// Exchange-local minutes after midnight.
    pub session_open_minute: u32,
    pub session_close_minute: u32,
    /// Exchange offset from UTC in seconds (IST by default).
    pub utc_offset_secs: i32,
    pub weekdays_only: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_daily_loss: 15_000.0,
            max_positions_per_symbol: 3,
            max_total_positions: 10,
            session_open_minute: 9 * 60 + 20,
            session_close_minute: 15 * 60 + 15,
            utc_offset_secs: 5 * 3600 + 1800,
            weekdays_only: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub journal: PathBuf,
    pub state: PathBuf,
    pub export_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            journal: PathBuf::from("greeklab-data/journal.jsonl"),
            state: PathBuf::from("greeklab-data/state.json"),
            export_dir: PathBuf::from("greeklab-data/export"),
        }
    }
}

/// Deterministic quote generator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub seed: u64,
    /// Probability that a quote request fails with `DataUnavailable`.
    pub failure_rate: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            failure_rate: 0.02,
        }
    }
}

/// Paper book sizing and protective levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    pub quantity: f64,
    /// Stop distance as a fraction of entry.
    pub stop_loss_pct: f64,
    /// Target distance as a fraction of entry.
    pub take_profit_pct: f64,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            quantity: 75.0,
            stop_loss_pct: 0.10,
            take_profit_pct: 0.20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub engine: EngineConfig,
    pub scan: ScanConfig,
    pub risk: LimitsConfig,
    pub paths: PathsConfig,
    pub synthetic: SyntheticConfig,
    pub book: BookConfig,
}

impl LabConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.scan.symbols.is_empty() {
            return Err(ConfigError::Invalid("scan.symbols is empty".into()));
        }
        let r = &self.risk;
        if r.max_daily_loss <= 0.0 || r.max_positions_per_symbol == 0 || r.max_total_positions == 0 {
            return Err(ConfigError::Invalid(
                "risk limits must be positive".into(),
            ));
        }
        if r.session_open_minute >= r.session_close_minute || r.session_close_minute > 24 * 60 {
            return Err(ConfigError::Invalid(format!(
                "session window {}..{} is empty or past midnight",
                r.session_open_minute, r.session_close_minute
            )));
        }
        if r.utc_offset_secs.abs() >= 86_400 {
            return Err(ConfigError::Invalid(format!(
                "risk.utc_offset_secs {} out of range",
                r.utc_offset_secs
            )));
        }
        if !(0.0..1.0).contains(&self.synthetic.failure_rate) {
            return Err(ConfigError::Invalid(format!(
                "synthetic.failure_rate {} outside [0, 1)",
                self.synthetic.failure_rate
            )));
        }
        let b = &self.book;
        if b.quantity <= 0.0 || !(0.0..1.0).contains(&b.stop_loss_pct) || b.take_profit_pct <= 0.0 {
            return Err(ConfigError::Invalid(
                "book quantity and levels must be positive, stop below 100%".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = LabConfig::from_toml("").unwrap();
        assert_eq!(config, LabConfig::default());
        assert_eq!(config.scan.interval_secs, 300);
        assert_eq!(config.risk.max_total_positions, 10);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = LabConfig::from_toml(
            r#"
            [scan]
            symbols = ["NIFTY"]
            cycles = 3
            training_mode = "inline"

            [engine.gate]
            threshold = 0.7
            "#,
        )
        .unwrap();
        assert_eq!(config.scan.symbols, vec!["NIFTY".to_string()]);
        assert_eq!(config.scan.cycles, Some(3));
        assert_eq!(config.scan.training_mode, TrainingMode::Inline);
        assert_eq!(config.engine.gate.threshold, 0.7);
        assert_eq!(config.engine.gate.min_volume, EngineConfig::default().gate.min_volume);
        assert_eq!(config.risk, LimitsConfig::default());
    }

    #[test]
    fn toml_roundtrip() {
        let config = LabConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(LabConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            LabConfig::from_toml("[scan]\nsymbols = []"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            LabConfig::from_toml("[synthetic]\nfailure_rate = 1.5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            LabConfig::from_toml("[engine.gate]\nthreshold = 2.0"),
            Err(ConfigError::Engine(_))
        ));
        assert!(matches!(LabConfig::from_toml("scan = 3"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_names_path() {
        let err = LabConfig::from_file(Path::new("/nonexistent/greeklab.toml")).unwrap_err();
        assert!(err.to_string().contains("greeklab.toml"));
    }
}
