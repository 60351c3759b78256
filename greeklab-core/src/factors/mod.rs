//! Closed set of scoring factors.
//!
//! Every weight, contribution and reasoning line is keyed by [`Factor`], a
//! closed enum. A misspelt factor is a compile error, never a silently
//! zero-weighted entry in a dictionary.

pub mod map;
pub mod scoring;
pub mod table;

pub use map::FactorMap;
pub use scoring::{market_reading, Reading};
pub use table::FactorWeights;

use serde::{Deserialize, Serialize};

/// Factors blended into the confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    Delta,
    OiChange,
    Volume,
    Momentum,
    Iv,
    Spread,
    Liquidity,
    PatternModel,
    TrendModel,
}

impl Factor {
    pub const COUNT: usize = 9;

    pub const ALL: [Factor; Factor::COUNT] = [
        Factor::Delta,
        Factor::OiChange,
        Factor::Volume,
        Factor::Momentum,
        Factor::Iv,
        Factor::Spread,
        Factor::Liquidity,
        Factor::PatternModel,
        Factor::TrendModel,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable snake_case key, as used in persisted weight tables.
    pub fn name(self) -> &'static str {
        match self {
            Factor::Delta => "delta",
            Factor::OiChange => "oi_change",
            Factor::Volume => "volume",
            Factor::Momentum => "momentum",
            Factor::Iv => "iv",
            Factor::Spread => "spread",
            Factor::Liquidity => "liquidity",
            Factor::PatternModel => "pattern_model",
            Factor::TrendModel => "trend_model",
        }
    }

    /// Display label used in reasoning lines.
    pub fn label(self) -> &'static str {
        match self {
            Factor::Delta => "Delta",
            Factor::OiChange => "OI change",
            Factor::Volume => "Volume",
            Factor::Momentum => "Momentum",
            Factor::Iv => "IV",
            Factor::Spread => "Spread",
            Factor::Liquidity => "Liquidity",
            Factor::PatternModel => "Pattern model",
            Factor::TrendModel => "Trend model",
        }
    }

    pub fn is_model(self) -> bool {
        matches!(self, Factor::PatternModel | Factor::TrendModel)
    }

    pub fn from_name(name: &str) -> Option<Factor> {
        Factor::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl std::fmt::Display for Factor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which way a candidate setup leans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Bullish,
    Bearish,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Bullish, Side::Bearish];

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Bullish => "bullish",
            Side::Bearish => "bearish",
        }
    }
}

/// Directional lean of a single factor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Bias {
    /// Bias from the sign of a directional quantity; zero is neutral.
    pub fn from_sign(x: f64) -> Bias {
        if x > 0.0 {
            Bias::Bullish
        } else if x < 0.0 {
            Bias::Bearish
        } else {
            Bias::Neutral
        }
    }

    /// Whether the reading counts towards `side`. Neutral readings count
    /// towards both sides.
    pub fn supports(self, side: Side) -> bool {
        match self {
            Bias::Neutral => true,
            Bias::Bullish => side == Side::Bullish,
            Bias::Bearish => side == Side::Bearish,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Bias::Bullish => "bullish",
            Bias::Bearish => "bearish",
            Bias::Neutral => "neutral",
        }
    }
}
