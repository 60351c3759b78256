//! Synthetic option quotes for offline runs and tests.
//!
//! Each symbol gets a fixed contract (strike, call/put, baseline liquidity)
//! seeded from the symbol name. Each cycle's quote is seeded from
//! `(symbol, cycle)`, so a quote never depends on which other symbols were
//! requested or in what order. Quotes are clearly tagged `DataSource::Mock`.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use rand::Rng;

use greeklab_core::domain::{Baseline, DataSource, Greeks, MarketSnapshot, OptionType};
use greeklab_core::engine::SnapshotProvider;
use greeklab_core::rng::RngHierarchy;
use greeklab_core::{EngineError, EngineResult};

/// Quoted session: 09:15 to 15:30 exchange time.
const SESSION_OPEN: (u32, u32) = (9, 15);
const SESSION_SECS: i64 = 375 * 60;
/// IST offset from UTC.
const EXCHANGE_OFFSET_SECS: i64 = 5 * 3600 + 1800;

/// Per-symbol contract, fixed for the provider's lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Contract {
    base_spot: f64,
    strike: f64,
    option_type: OptionType,
    /// Premium of the contract at the base spot.
    reference_premium: f64,
    baseline_volume: f64,
    baseline_oi: f64,
    phase: f64,
}

pub struct SyntheticProvider {
    rng: RngHierarchy,
    failure_rate: f64,
    first_session: NaiveDate,
    step_secs: i64,
    cycle: AtomicU64,
}

impl SyntheticProvider {
    /// Clock starts at the open of the first weekday on or after `first_session`.
    pub fn new(seed: u64, failure_rate: f64, first_session: NaiveDate, step_secs: u64) -> Self {
        let mut day = first_session;
        while is_weekend(day) {
            day = day.succ_opt().unwrap_or(day);
        }
        Self {
            rng: RngHierarchy::new(seed),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            first_session: day,
            step_secs: step_secs.max(1) as i64,
            cycle: AtomicU64::new(0),
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle.load(Ordering::SeqCst)
    }

    /// Move the clock to the next cycle. Returns the new cycle number.
    pub fn advance(&self) -> u64 {
        self.cycle.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn set_cycle(&self, cycle: u64) {
        self.cycle.store(cycle, Ordering::SeqCst);
    }

    /// Quote time of `cycle`. Cycles fill trading sessions back to back and
    /// skip weekends.
    pub fn timestamp_for(&self, cycle: u64) -> DateTime<Utc> {
        let elapsed = cycle as i64 * self.step_secs;
        let mut day = self.first_session;
        for _ in 0..elapsed / SESSION_SECS {
            day = next_weekday(day);
        }
        let open = NaiveTime::from_hms_opt(SESSION_OPEN.0, SESSION_OPEN.1, 0).unwrap_or_default();
        let local = day.and_time(open) + Duration::seconds(elapsed % SESSION_SECS);
        Utc.from_utc_datetime(&(local - Duration::seconds(EXCHANGE_OFFSET_SECS)))
    }

    fn contract(&self, symbol: &str) -> Contract {
        let mut rng = self.rng.rng_for(&format!("contract:{symbol}"), 0, 0);
        let base_spot = match symbol {
            "NIFTY" => 22_000.0,
            "BANKNIFTY" => 48_000.0,
            "FINNIFTY" => 21_000.0,
            "SENSEX" => 73_000.0,
            _ => rng.gen_range(500.0..4_000.0),
        };
        let strike_step = if base_spot > 10_000.0 { 50.0 } else { 10.0 };
        let offset = rng.gen_range(-2i32..=2) as f64 * strike_step;
        let strike = (base_spot / strike_step).round() * strike_step + offset;
        let option_type = if rng.gen_bool(0.5) { OptionType::Call } else { OptionType::Put };
        let reference_premium = base_spot * rng.gen_range(0.004..0.008);
        Contract {
            base_spot,
            strike,
            option_type,
            reference_premium,
            baseline_volume: rng.gen_range(1_000.0..5_000.0),
            baseline_oi: rng.gen_range(20_000.0..80_000.0),
            phase: rng.gen_range(0.0..std::f64::consts::TAU),
        }
    }

    /// Quote for `symbol` at `cycle`, independent of the provider clock.
    pub fn quote(&self, symbol: &str, cycle: u64) -> EngineResult<MarketSnapshot> {
        let mut rng = self.rng.rng_for(symbol, cycle, 0);
        if rng.gen::<f64>() < self.failure_rate {
            return Err(EngineError::data_unavailable(symbol, "synthetic feed dropped the quote"));
        }
        let c = self.contract(symbol);
        let timestamp = self.timestamp_for(cycle);

        let drift = 0.012 * (cycle as f64 * 0.05 + c.phase).sin();
        let spot = c.base_spot * (1.0 + drift + rng.gen_range(-0.002..0.002));
        let days_to_expiry = days_to_thursday_close(timestamp);

        let moneyness = (spot - c.strike) / (c.base_spot * 0.02);
        let call_delta = (0.5 + 0.45 * moneyness.tanh()).clamp(0.02, 0.98);
        let (delta, intrinsic) = match c.option_type {
            OptionType::Put => (call_delta - 1.0, (c.strike - spot).max(0.0)),
            _ => (call_delta, (spot - c.strike).max(0.0)),
        };
        let time_value = c.reference_premium * (days_to_expiry / 7.0).sqrt().max(0.2);
        let price = (intrinsic + time_value).max(0.05);

        let volume = c.baseline_volume * rng.gen_range(0.02..2.5);
        let oi_change = rng.gen_range(-10_000.0..10_000.0) * (c.baseline_oi / 80_000.0);

        Ok(MarketSnapshot {
            symbol: symbol.to_string(),
            timestamp,
            price,
            spot,
            strike: Some(c.strike),
            option_type: c.option_type,
            greeks: Some(Greeks {
                delta,
                gamma: rng.gen_range(0.0001..0.01),
                theta: -rng.gen_range(1.0..10.0),
                vega: rng.gen_range(5.0..50.0),
            }),
            open_interest: (c.baseline_oi + oi_change).max(0.0),
            oi_change,
            volume,
            implied_volatility: rng.gen_range(12.0..35.0),
            bid_ask_spread: rng.gen_range(0.5..2.0),
            days_to_expiry: Some(days_to_expiry),
            source: DataSource::Mock,
            baseline: Baseline {
                volume: c.baseline_volume,
                open_interest: c.baseline_oi,
                price: c.reference_premium,
            },
        })
    }
}

impl SnapshotProvider for SyntheticProvider {
    fn get_snapshot(&self, symbol: &str) -> EngineResult<MarketSnapshot> {
        self.quote(symbol, self.cycle())
    }
}

impl std::fmt::Debug for SyntheticProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticProvider")
            .field("seed", &self.rng.master_seed())
            .field("failure_rate", &self.failure_rate)
            .field("cycle", &self.cycle())
            .finish()
    }
}

fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

fn next_weekday(day: NaiveDate) -> NaiveDate {
    let mut next = day.succ_opt().unwrap_or(day);
    while is_weekend(next) {
        next = next.succ_opt().unwrap_or(next);
    }
    next
}

/// Days until the weekly expiry (Thursday 15:30 exchange time).
fn days_to_thursday_close(at: DateTime<Utc>) -> f64 {
    let local = at.naive_utc() + Duration::seconds(EXCHANGE_OFFSET_SECS);
    let ahead = (Weekday::Thu.num_days_from_monday() as i64
        - local.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    let close = NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default();
    let expiry = (local.date() + Duration::days(ahead)).and_time(close);
    let days = (expiry - local).num_seconds() as f64 / 86_400.0;
    if days <= 0.0 {
        days + 7.0
    } else {
        days
    }
}
