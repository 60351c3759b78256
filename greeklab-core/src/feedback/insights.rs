//! Learning insights: a readable summary of the outcome history.

use std::collections::BTreeMap;

use chrono::{Duration, Timelike};
use serde::{Deserialize, Serialize};

use crate::domain::TradeOutcome;
use crate::factors::{Factor, FactorWeights};

/// Outcomes needed before insights are reported.
pub const MIN_INSIGHT_OUTCOMES: usize = 20;
/// Size of the "recent" window.
pub const RECENT_WINDOW: usize = 20;
/// Trades a symbol needs before it can be named best.
const MIN_SYMBOL_TRADES: usize = 5;
/// Trades an entry hour needs before it can be named best.
const MIN_HOUR_TRADES: usize = 3;
/// Exchange clock (IST) used to bucket entry hours.
const EXCHANGE_UTC_OFFSET_SECS: i64 = 5 * 3600 + 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTrend {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningInsights {
    pub total_trades: usize,
    /// Fraction of winning trades, 0..1.
    pub win_rate: f64,
    pub recent_win_rate: f64,
    pub average_pnl: f64,
    pub average_return: f64,
    pub best_pnl: f64,
    pub worst_pnl: f64,
    pub best_symbol: Option<String>,
    /// Exchange-time entry hour with the highest win rate.
    pub best_hour: Option<u32>,
    pub trend: PerformanceTrend,
    pub top_factor: Factor,
    pub lines: Vec<String>,
}

impl LearningInsights {
    /// Summarise `history` (oldest first). `None` below
    /// [`MIN_INSIGHT_OUTCOMES`].
    pub fn from_history(history: &[TradeOutcome], weights: &FactorWeights) -> Option<Self> {
        if history.len() < MIN_INSIGHT_OUTCOMES {
            return None;
        }
        let n = history.len() as f64;
        let win_rate = history.iter().filter(|o| o.is_winner()).count() as f64 / n;
        let recent = &history[history.len().saturating_sub(RECENT_WINDOW)..];
        let recent_win_rate =
            recent.iter().filter(|o| o.is_winner()).count() as f64 / recent.len() as f64;

        let trend = if recent_win_rate > win_rate {
            PerformanceTrend::Improving
        } else if recent_win_rate < win_rate - 0.10 {
            PerformanceTrend::Declining
        } else {
            PerformanceTrend::Stable
        };

        let mut by_symbol: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for o in history {
            let e = by_symbol.entry(o.symbol.as_str()).or_default();
            e.0 += o.realized_pnl;
            e.1 += 1;
        }
        let best_symbol = by_symbol
            .iter()
            .filter(|(_, (_, count))| *count >= MIN_SYMBOL_TRADES)
            .map(|(sym, (sum, count))| (*sym, sum / *count as f64))
            .fold(None::<(&str, f64)>, |best, cand| match best {
                Some(b) if b.1 >= cand.1 => Some(b),
                _ => Some(cand),
            })
            .map(|(sym, _)| sym.to_string());

        let mut by_hour: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
        for o in history {
            let hour = (o.opened_at + Duration::seconds(EXCHANGE_UTC_OFFSET_SECS)).hour();
            let e = by_hour.entry(hour).or_default();
            e.0 += usize::from(o.is_winner());
            e.1 += 1;
        }
        // Earliest hour wins a tie.
        let best_hour = by_hour
            .iter()
            .filter(|(_, (_, count))| *count >= MIN_HOUR_TRADES)
            .map(|(hour, (wins, count))| (*hour, *wins as f64 / *count as f64))
            .fold(None::<(u32, f64)>, |best, cand| match best {
                Some(b) if b.1 >= cand.1 => Some(b),
                _ => Some(cand),
            })
            .map(|(hour, _)| hour);

        let pnl = history.iter().map(|o| o.realized_pnl);
        let best_pnl = pnl.clone().fold(f64::NEG_INFINITY, f64::max);
        let worst_pnl = pnl.fold(f64::INFINITY, f64::min);
        let average_pnl = history.iter().map(|o| o.realized_pnl).sum::<f64>() / n;
        let average_return = history.iter().map(|o| o.return_pct).sum::<f64>() / n;
        let top_factor = weights.top_factor();

        let mut lines = vec![format!("Win rate {:.1}% over {} trades", win_rate * 100.0, history.len())];
        if let Some(sym) = &best_symbol {
            lines.push(format!("Best performing symbol: {sym}"));
        }
        if let Some(hour) = best_hour {
            lines.push(format!("Most profitable entry hour: {hour:02}:00"));
        }
        lines.push(format!("Heaviest factor: {}", top_factor.label()));
        lines.push(match trend {
            PerformanceTrend::Improving => "Performance is improving recently".to_string(),
            PerformanceTrend::Declining => "Performance has declined recently".to_string(),
            PerformanceTrend::Stable => "Performance is stable".to_string(),
        });

        Some(Self {
            total_trades: history.len(),
            win_rate,
            recent_win_rate,
            average_pnl,
            average_return,
            best_pnl,
            worst_pnl,
            best_symbol,
            best_hour,
            trend,
            top_factor,
            lines,
        })
    }
}
