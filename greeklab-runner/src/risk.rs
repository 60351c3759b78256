//! Limits-based risk precheck: trading hours, position counts, daily loss cap.
//!
//! The ledger is shared with the paper book, which reports opens and closes.
//! The precheck only reads it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Timelike, Utc, Weekday};

use greeklab_core::domain::MarketSnapshot;
use greeklab_core::gate::{RiskPrecheck, RiskVerdict};

use crate::config::LimitsConfig;

#[derive(Debug, Default)]
struct LedgerState {
    open_by_symbol: HashMap<String, usize>,
    realized_by_day: HashMap<NaiveDate, f64>,
}

/// Open position counts and realized P&L per exchange day.
#[derive(Debug)]
pub struct RiskLedger {
    offset: FixedOffset,
    state: Mutex<LedgerState>,
}

impl RiskLedger {
    /// Offsets outside ±24h fall back to UTC.
    pub fn new(utc_offset_secs: i32) -> Self {
        Self {
            offset: FixedOffset::east_opt(utc_offset_secs).unwrap_or_else(|| Utc.fix()),
            state: Mutex::new(LedgerState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn exchange_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    pub fn on_open(&self, symbol: &str) {
        *self.lock().open_by_symbol.entry(symbol.to_string()).or_insert(0) += 1;
    }

    pub fn on_close(&self, symbol: &str, realized_pnl: f64, closed_at: DateTime<Utc>) {
        let day = self.exchange_date(closed_at);
        let mut state = self.lock();
        if let Some(n) = state.open_by_symbol.get_mut(symbol) {
            *n = n.saturating_sub(1);
        }
        *state.realized_by_day.entry(day).or_insert(0.0) += realized_pnl;
    }

    pub fn open_for(&self, symbol: &str) -> usize {
        self.lock().open_by_symbol.get(symbol).copied().unwrap_or(0)
    }

    pub fn total_open(&self) -> usize {
        self.lock().open_by_symbol.values().sum()
    }

    /// Realized P&L on the exchange day containing `at`.
    pub fn realized_on(&self, at: DateTime<Utc>) -> f64 {
        let day = self.exchange_date(at);
        self.lock().realized_by_day.get(&day).copied().unwrap_or(0.0)
    }
}

pub struct LimitsPrecheck {
    limits: LimitsConfig,
    ledger: Arc<RiskLedger>,
}

impl LimitsPrecheck {
    pub fn new(limits: LimitsConfig, ledger: Arc<RiskLedger>) -> Self {
        Self { limits, ledger }
    }

    pub fn ledger(&self) -> &Arc<RiskLedger> {
        &self.ledger
    }

    fn session_failure(&self, at: DateTime<Utc>) -> Option<String> {
        let local = at.with_timezone(&self.ledger.offset);
        if self.limits.weekdays_only && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return Some(format!("market closed on {}", local.weekday()));
        }
        let minute = local.hour() * 60 + local.minute();
        let (open, close) = (self.limits.session_open_minute, self.limits.session_close_minute);
        if minute < open || minute > close {
            return Some(format!(
                "outside trading window {:02}:{:02}-{:02}:{:02} (at {:02}:{:02})",
                open / 60,
                open % 60,
                close / 60,
                close % 60,
                local.hour(),
                local.minute()
            ));
        }
        None
    }
}

impl RiskPrecheck for LimitsPrecheck {
    fn check(&self, symbol: &str, snapshot: &MarketSnapshot) -> RiskVerdict {
        let mut failures = Vec::new();
        if let Some(reason) = self.session_failure(snapshot.timestamp) {
            failures.push(reason);
        }
        let per_symbol = self.ledger.open_for(symbol);
        if per_symbol >= self.limits.max_positions_per_symbol {
            failures.push(format!(
                "{symbol} has {per_symbol} open positions (limit {})",
                self.limits.max_positions_per_symbol
            ));
        }
        let total = self.ledger.total_open();
        if total >= self.limits.max_total_positions {
            failures.push(format!(
                "{total} open positions (limit {})",
                self.limits.max_total_positions
            ));
        }
        let realized = self.ledger.realized_on(snapshot.timestamp);
        if -realized >= self.limits.max_daily_loss {
            failures.push(format!(
                "daily loss {:.2} reached cap {:.2}",
                -realized, self.limits.max_daily_loss
            ));
        }
        RiskVerdict { failures }
    }
}

impl std::fmt::Debug for LimitsPrecheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitsPrecheck")
            .field("limits", &self.limits)
            .field("ledger", &self.ledger)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use chrono::TimeZone;

    fn precheck() -> LimitsPrecheck {
        let limits = LimitsConfig::default();
        let ledger = Arc::new(RiskLedger::new(limits.utc_offset_secs));
        LimitsPrecheck::new(limits, ledger)
    }

    fn at(snapshot_utc: DateTime<Utc>) -> MarketSnapshot {
        let mut snap = fixtures::snapshot("NIFTY", 100.0);
        snap.timestamp = snapshot_utc;
        snap
    }

    // Friday 2024-03-01; 04:30 UTC is 10:00 IST.
    fn mid_session() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 4, 30, 0).unwrap()
    }

    #[test]
    fn passes_inside_window() {
        assert!(precheck().check("NIFTY", &at(mid_session())).is_pass());
    }

    #[test]
    fn window_edges_are_inclusive() {
        let p = precheck();
        // 09:20 and 15:15 IST
        assert!(p.check("NIFTY", &at(Utc.with_ymd_and_hms(2024, 3, 1, 3, 50, 0).unwrap())).is_pass());
        assert!(p.check("NIFTY", &at(Utc.with_ymd_and_hms(2024, 3, 1, 9, 45, 0).unwrap())).is_pass());
        // 09:19 and 15:16 IST
        assert!(!p.check("NIFTY", &at(Utc.with_ymd_and_hms(2024, 3, 1, 3, 49, 0).unwrap())).is_pass());
        assert!(!p.check("NIFTY", &at(Utc.with_ymd_and_hms(2024, 3, 1, 9, 46, 0).unwrap())).is_pass());
    }

    #[test]
    fn weekend_is_closed() {
        let saturday = Utc.with_ymd_and_hms(2024, 3, 2, 4, 30, 0).unwrap();
        let verdict = precheck().check("NIFTY", &at(saturday));
        assert!(verdict.failures[0].contains("closed"));
    }

    #[test]
    fn position_limits() {
        let p = precheck();
        for _ in 0..3 {
            p.ledger().on_open("NIFTY");
        }
        let verdict = p.check("NIFTY", &at(mid_session()));
        assert_eq!(verdict.failures.len(), 1);
        assert!(p.check("TCS", &at(mid_session())).is_pass());

        for s in ["TCS", "INFY", "SBIN", "ITC", "LT", "TITAN", "ONGC"] {
            p.ledger().on_open(s);
        }
        assert_eq!(p.ledger().total_open(), 10);
        assert!(!p.check("WIPRO", &at(mid_session())).is_pass());

        p.ledger().on_close("NIFTY", 100.0, mid_session());
        assert_eq!(p.ledger().open_for("NIFTY"), 2);
        assert!(p.check("NIFTY", &at(mid_session())).is_pass());
    }

    #[test]
    fn daily_loss_cap_resets_next_day() {
        let p = precheck();
        p.ledger().on_open("NIFTY");
        p.ledger().on_close("NIFTY", -15_000.0, mid_session());
        let verdict = p.check("TCS", &at(mid_session()));
        assert!(verdict.failures[0].starts_with("daily loss"));

        let monday = Utc.with_ymd_and_hms(2024, 3, 4, 4, 30, 0).unwrap();
        assert!(p.check("TCS", &at(monday)).is_pass());
    }

    #[test]
    fn exchange_day_follows_offset() {
        let ledger = RiskLedger::new(LimitsConfig::default().utc_offset_secs);
        // 20:00 UTC is already the next day in IST
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        assert_eq!(ledger.exchange_date(late), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }
}
