//! Market snapshot — one immutable quote + Greeks observation for a symbol.
//!
//! Produced by an external provider, borrowed by the engine for exactly one
//! evaluation cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Option type of the quoted instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
    /// Non-derivative instrument (index, future, equity).
    #[serde(rename = "NONE")]
    None,
}

impl OptionType {
    pub fn is_option(self) -> bool {
        !matches!(self, OptionType::None)
    }
}

/// Where the snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Mock,
    BrokerUnsupported,
    BrokerError,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Live => "live",
            DataSource::Mock => "mock",
            DataSource::BrokerUnsupported => "broker_unsupported",
            DataSource::BrokerError => "broker_error",
        }
    }
}

/// Option sensitivities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
}

impl Greeks {
    /// Greeks of a linear (non-derivative) instrument.
    pub fn linear() -> Self {
        Self {
            delta: 1.0,
            gamma: 0.0,
            theta: 0.0,
            vega: 0.0,
        }
    }
}

/// Rolling reference values the ratio features are measured against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Average traded volume over the rolling window.
    pub volume: f64,
    /// Reference open interest for OI-change ratios.
    pub open_interest: f64,
    /// Reference premium for spread and momentum ratios.
    pub price: f64,
}

/// One quote + Greeks observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Last traded price of the quoted instrument (the premium for options).
    pub price: f64,
    /// Underlying spot price.
    pub spot: f64,
    pub strike: Option<f64>,
    pub option_type: OptionType,
    pub greeks: Option<Greeks>,
    pub open_interest: f64,
    pub oi_change: f64,
    pub volume: f64,
    /// Implied volatility in percent points (18.0 means 18%).
    pub implied_volatility: f64,
    /// Absolute bid-ask spread.
    pub bid_ask_spread: f64,
    pub days_to_expiry: Option<f64>,
    pub source: DataSource,
    pub baseline: Baseline,
}

impl MarketSnapshot {
    /// Greeks to use for this instrument.
    ///
    /// Options must carry Greeks; linear instruments fall back to delta 1.
    pub fn effective_greeks(&self) -> EngineResult<Greeks> {
        match (self.option_type, self.greeks) {
            (_, Some(g)) => Ok(g),
            (OptionType::None, None) => Ok(Greeks::linear()),
            (_, None) => Err(EngineError::invalid_snapshot(
                &self.symbol,
                "greeks",
                "missing for option contract",
            )),
        }
    }

    /// Validate every numeric field the engine reads.
    pub fn validate(&self) -> EngineResult<()> {
        let fields: [(&'static str, f64); 10] = [
            ("price", self.price),
            ("spot", self.spot),
            ("open_interest", self.open_interest),
            ("oi_change", self.oi_change),
            ("volume", self.volume),
            ("implied_volatility", self.implied_volatility),
            ("bid_ask_spread", self.bid_ask_spread),
            ("baseline.volume", self.baseline.volume),
            ("baseline.open_interest", self.baseline.open_interest),
            ("baseline.price", self.baseline.price),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(EngineError::invalid_snapshot(&self.symbol, field, "is not finite"));
            }
        }
        if self.price <= 0.0 {
            return Err(EngineError::invalid_snapshot(&self.symbol, "price", "must be positive"));
        }
        if self.volume < 0.0 || self.open_interest < 0.0 {
            return Err(EngineError::invalid_snapshot(
                &self.symbol,
                "volume",
                "volume and open interest must be non-negative",
            ));
        }

        if self.option_type.is_option() {
            match self.strike {
                Some(k) if k.is_finite() && k > 0.0 => {}
                _ => {
                    return Err(EngineError::invalid_snapshot(
                        &self.symbol,
                        "strike",
                        "missing or non-positive for option contract",
                    ))
                }
            }
            if self.spot <= 0.0 {
                return Err(EngineError::invalid_snapshot(&self.symbol, "spot", "must be positive"));
            }
        }

        let g = self.effective_greeks()?;
        for (field, value) in [
            ("delta", g.delta),
            ("gamma", g.gamma),
            ("theta", g.theta),
            ("vega", g.vega),
        ] {
            if !value.is_finite() {
                return Err(EngineError::invalid_snapshot(&self.symbol, field, "is not finite"));
            }
        }

        if let Some(days) = self.days_to_expiry {
            if !days.is_finite() {
                return Err(EngineError::invalid_snapshot(
                    &self.symbol,
                    "days_to_expiry",
                    "is not finite",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// A healthy at-the-money call, used across the crate's unit tests.
    pub fn call_snapshot() -> MarketSnapshot {
        MarketSnapshot {
            symbol: "NIFTY".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 4, 30, 0).unwrap(),
            price: 120.0,
            spot: 22_000.0,
            strike: Some(21_900.0),
            option_type: OptionType::Call,
            greeks: Some(Greeks {
                delta: 0.55,
                gamma: 0.002,
                theta: -3.0,
                vega: 12.0,
            }),
            open_interest: 50_000.0,
            oi_change: 6_000.0,
            volume: 5_000.0,
            implied_volatility: 18.0,
            bid_ask_spread: 0.6,
            days_to_expiry: Some(7.0),
            source: DataSource::Mock,
            baseline: Baseline {
                volume: 2_500.0,
                open_interest: 50_000.0,
                price: 120.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::call_snapshot;
    use super::*;

    #[test]
    fn healthy_snapshot_validates() {
        assert!(call_snapshot().validate().is_ok());
    }

    #[test]
    fn nan_delta_rejected() {
        let mut snap = call_snapshot();
        snap.greeks.as_mut().unwrap().delta = f64::NAN;
        let err = snap.validate().unwrap_err();
        assert!(matches!(err, EngineError::InvalidSnapshot { field: "delta", .. }));
    }

    #[test]
    fn option_without_greeks_rejected() {
        let mut snap = call_snapshot();
        snap.greeks = None;
        assert!(matches!(
            snap.validate(),
            Err(EngineError::InvalidSnapshot { field: "greeks", .. })
        ));
    }

    #[test]
    fn linear_instrument_without_greeks_is_fine() {
        let mut snap = call_snapshot();
        snap.option_type = OptionType::None;
        snap.strike = None;
        snap.greeks = None;
        assert!(snap.validate().is_ok());
        assert_eq!(snap.effective_greeks().unwrap(), Greeks::linear());
    }

    #[test]
    fn infinite_price_rejected() {
        let mut snap = call_snapshot();
        snap.price = f64::INFINITY;
        assert!(snap.validate().is_err());
    }

    #[test]
    fn option_type_serializes_as_exchange_codes() {
        assert_eq!(serde_json::to_string(&OptionType::Call).unwrap(), "\"CE\"");
        assert_eq!(serde_json::to_string(&OptionType::Put).unwrap(), "\"PE\"");
        assert_eq!(
            serde_json::to_string(&DataSource::BrokerUnsupported).unwrap(),
            "\"broker_unsupported\""
        );
    }
}
