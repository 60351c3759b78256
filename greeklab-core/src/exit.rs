//! ExitMonitor — ordered exit rules for open positions.
//!
//! Rules are a fixed table of (predicate, priority, reason, weight) evaluated
//! in order. The emitted signal carries the reason of the first fired rule of
//! the highest fired priority; confidence sums the weights of every fired rule
//! (capped at 1). The monitor never mutates a position; the owner applies the
//! signal.

use serde::{Deserialize, Serialize};

use crate::domain::{
    Action, Contribution, MarketSnapshot, Position, PositionSide, ReasonCode, Signal, SignalId,
};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPriority {
    Low,
    Medium,
    Highest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub profit_target_pct: f64,
    pub stop_loss_pct: f64,
    /// Absolute theta above which time decay forces an exit.
    pub theta_limit: f64,
    /// Implied volatility (percent points) below which the position exits.
    pub iv_floor: f64,
    pub min_volume: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            profit_target_pct: 0.20,
            stop_loss_pct: 0.10,
            theta_limit: 5.0,
            iv_floor: 15.0,
            min_volume: 100.0,
        }
    }
}

impl ExitConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.profit_target_pct <= 0.0 || self.stop_loss_pct <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "exit profit target and stop loss must be positive".into(),
            ));
        }
        if self.theta_limit < 0.0 || self.iv_floor < 0.0 || self.min_volume < 0.0 {
            return Err(EngineError::InvalidConfig(
                "exit theta limit, IV floor and volume minimum must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Everything a rule looks at for one position in one cycle.
pub struct ExitContext<'a> {
    pub position: &'a Position,
    pub snapshot: &'a MarketSnapshot,
    pub return_pct: f64,
    pub theta: f64,
}

/// Returns a detail line when the rule fires.
pub type ExitPredicate = fn(&ExitContext<'_>, &ExitConfig) -> Option<String>;

#[derive(Clone, Copy)]
pub struct ExitRule {
    pub reason: ReasonCode,
    pub priority: ExitPriority,
    pub weight: f64,
    pub predicate: ExitPredicate,
}

impl std::fmt::Debug for ExitRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitRule")
            .field("reason", &self.reason)
            .field("priority", &self.priority)
            .field("weight", &self.weight)
            .finish()
    }
}

fn stop_loss(ctx: &ExitContext<'_>, cfg: &ExitConfig) -> Option<String> {
    let price = ctx.snapshot.price;
    if ctx.return_pct <= -cfg.stop_loss_pct {
        Some(format!(
            "return {:.1}% at or below -{:.1}%",
            ctx.return_pct * 100.0,
            cfg.stop_loss_pct * 100.0
        ))
    } else if ctx.position.stop_crossed(price) {
        Some(format!("price {price:.2} crossed stop {:.2}", ctx.position.stop_loss.unwrap_or(0.0)))
    } else {
        None
    }
}

fn profit_target(ctx: &ExitContext<'_>, cfg: &ExitConfig) -> Option<String> {
    let price = ctx.snapshot.price;
    if ctx.return_pct >= cfg.profit_target_pct {
        Some(format!(
            "return {:.1}% at or above {:.1}%",
            ctx.return_pct * 100.0,
            cfg.profit_target_pct * 100.0
        ))
    } else if ctx.position.target_reached(price) {
        Some(format!(
            "price {price:.2} reached target {:.2}",
            ctx.position.take_profit.unwrap_or(0.0)
        ))
    } else {
        None
    }
}

fn theta_decay(ctx: &ExitContext<'_>, cfg: &ExitConfig) -> Option<String> {
    (ctx.theta.abs() > cfg.theta_limit)
        .then(|| format!("|theta| {:.2} above {:.2}", ctx.theta.abs(), cfg.theta_limit))
}

fn iv_collapse(ctx: &ExitContext<'_>, cfg: &ExitConfig) -> Option<String> {
    let iv = ctx.snapshot.implied_volatility;
    (iv < cfg.iv_floor).then(|| format!("IV {iv:.1} below {:.1}", cfg.iv_floor))
}

fn illiquid(ctx: &ExitContext<'_>, cfg: &ExitConfig) -> Option<String> {
    let vol = ctx.snapshot.volume;
    (vol < cfg.min_volume).then(|| format!("volume {vol:.0} below {:.0}", cfg.min_volume))
}

/// The default rule table, in evaluation order.
pub fn default_rules() -> Vec<ExitRule> {
    vec![
        ExitRule {
            reason: ReasonCode::StopLoss,
            priority: ExitPriority::Highest,
            weight: 0.50,
            predicate: stop_loss,
        },
        ExitRule {
            reason: ReasonCode::ProfitTarget,
            priority: ExitPriority::Highest,
            weight: 0.40,
            predicate: profit_target,
        },
        ExitRule {
            reason: ReasonCode::ThetaDecay,
            priority: ExitPriority::Medium,
            weight: 0.20,
            predicate: theta_decay,
        },
        ExitRule {
            reason: ReasonCode::IvCollapse,
            priority: ExitPriority::Medium,
            weight: 0.15,
            predicate: iv_collapse,
        },
        ExitRule {
            reason: ReasonCode::Illiquid,
            priority: ExitPriority::Low,
            weight: 0.10,
            predicate: illiquid,
        },
    ]
}

#[derive(Debug, Clone)]
pub struct ExitMonitor {
    config: ExitConfig,
    rules: Vec<ExitRule>,
}

impl Default for ExitMonitor {
    fn default() -> Self {
        Self::new(ExitConfig::default())
    }
}

impl ExitMonitor {
    pub fn new(config: ExitConfig) -> Self {
        Self::with_rules(config, default_rules())
    }

    pub fn with_rules(config: ExitConfig, rules: Vec<ExitRule>) -> Self {
        Self { config, rules }
    }

    pub fn rules(&self) -> &[ExitRule] {
        &self.rules
    }

    /// Rules that fire for this position, in table order, with their details.
    pub fn fired<'r>(&'r self, ctx: &ExitContext<'_>) -> Vec<(&'r ExitRule, String)> {
        self.rules
            .iter()
            .filter_map(|rule| (rule.predicate)(ctx, &self.config).map(|detail| (rule, detail)))
            .collect()
    }

    /// Exit signal for an open position, or `None` when no rule fires.
    ///
    /// Closed positions and snapshots of another symbol yield `None`.
    pub fn evaluate(
        &self,
        position: &Position,
        snapshot: &MarketSnapshot,
        state_version: u64,
    ) -> EngineResult<Option<Signal>> {
        if !position.is_open() || position.symbol != snapshot.symbol {
            return Ok(None);
        }
        snapshot.validate()?;
        let theta = snapshot.effective_greeks()?.theta;
        let ctx = ExitContext {
            position,
            snapshot,
            return_pct: position.return_pct(snapshot.price),
            theta,
        };

        let fired = self.fired(&ctx);
        // First fired rule of the highest fired priority.
        let Some((lead, _)) = fired.iter().fold(None::<&(&ExitRule, String)>, |best, cand| {
            match best {
                Some(b) if b.0.priority >= cand.0.priority => Some(b),
                _ => Some(cand),
            }
        }) else {
            return Ok(None);
        };

        let action = match position.side {
            PositionSide::Long => Action::Sell,
            PositionSide::Short => Action::Buy,
        };
        let confidence = fired.iter().map(|(r, _)| r.weight).sum::<f64>().min(1.0);
        let reasoning = fired
            .iter()
            .map(|(r, detail)| format!("{}: {}", r.reason, detail))
            .collect();
        let contributions = fired
            .iter()
            .map(|(r, _)| Contribution {
                label: r.reason.as_str().to_string(),
                raw: 1.0,
                weight: r.weight,
                weighted: r.weight,
            })
            .collect();

        Ok(Some(Signal {
            id: SignalId::derive_exit(&position.id, snapshot.timestamp, action),
            symbol: position.symbol.clone(),
            action,
            confidence,
            reason: lead.reason,
            reasoning,
            contributions,
            generated_at: snapshot.timestamp,
            source: snapshot.source,
            state_version,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::fixtures::call_snapshot;
    use crate::domain::{PositionId, PositionStatus};

    fn position(entry: f64, side: PositionSide) -> Position {
        Position {
            id: PositionId::from(1),
            symbol: "NIFTY".into(),
            entry_price: entry,
            entry_time: call_snapshot().timestamp,
            quantity: 50.0,
            side,
            stop_loss: None,
            take_profit: None,
            status: PositionStatus::Open,
        }
    }

    fn theta(snap: &mut MarketSnapshot, theta: f64) {
        if let Some(g) = snap.greeks.as_mut() {
            g.theta = theta;
        }
    }

    #[test]
    fn quiet_position_emits_nothing() {
        let out = ExitMonitor::default()
            .evaluate(&position(120.0, PositionSide::Long), &call_snapshot(), 0)
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn profit_target_beats_theta_when_theta_small() {
        let mut snap = call_snapshot();
        snap.price = 150.0;
        theta(&mut snap, -3.0);
        let s = ExitMonitor::default()
            .evaluate(&position(120.0, PositionSide::Long), &snap, 0)
            .unwrap()
            .unwrap();
        assert_eq!(s.reason, ReasonCode::ProfitTarget);
        assert_eq!(s.action, Action::Sell);
        assert!((s.confidence - 0.40).abs() < 1e-12);
    }

    #[test]
    fn profit_target_outranks_theta_decay() {
        let mut snap = call_snapshot();
        snap.price = 150.0;
        theta(&mut snap, -8.0);
        let s = ExitMonitor::default()
            .evaluate(&position(120.0, PositionSide::Long), &snap, 0)
            .unwrap()
            .unwrap();
        assert_eq!(s.reason, ReasonCode::ProfitTarget);
        assert!((s.confidence - 0.60).abs() < 1e-12);
        assert_eq!(s.reasoning.len(), 2);
    }

    #[test]
    fn stop_loss_dominates_profit_target() {
        // Return breaches the stop while the position's own take-profit
        // level (set below entry) also reads as reached.
        let mut pos = position(120.0, PositionSide::Long);
        pos.take_profit = Some(100.0);
        let mut snap = call_snapshot();
        snap.price = 100.0;
        let s = ExitMonitor::default().evaluate(&pos, &snap, 0).unwrap().unwrap();
        assert_eq!(s.reason, ReasonCode::StopLoss);
        assert!((s.confidence - 0.90).abs() < 1e-12);
    }

    #[test]
    fn medium_rule_beats_low_rule() {
        let mut snap = call_snapshot();
        snap.implied_volatility = 12.0;
        snap.volume = 40.0;
        let s = ExitMonitor::default()
            .evaluate(&position(120.0, PositionSide::Long), &snap, 0)
            .unwrap()
            .unwrap();
        assert_eq!(s.reason, ReasonCode::IvCollapse);
        assert!((s.confidence - 0.25).abs() < 1e-12);
    }

    #[test]
    fn short_position_covers_with_buy() {
        let mut snap = call_snapshot();
        snap.price = 90.0;
        let s = ExitMonitor::default()
            .evaluate(&position(120.0, PositionSide::Short), &snap, 0)
            .unwrap()
            .unwrap();
        assert_eq!(s.action, Action::Buy);
        assert_eq!(s.reason, ReasonCode::ProfitTarget);
    }

    #[test]
    fn closed_or_foreign_positions_ignored() {
        let mut snap = call_snapshot();
        snap.price = 10.0;
        let mut closed = position(120.0, PositionSide::Long);
        closed.status = PositionStatus::Closed;
        assert!(ExitMonitor::default().evaluate(&closed, &snap, 0).unwrap().is_none());

        let mut other = position(120.0, PositionSide::Long);
        other.symbol = "BANKNIFTY".into();
        assert!(ExitMonitor::default().evaluate(&other, &snap, 0).unwrap().is_none());
    }

    #[test]
    fn confidence_capped_at_one() {
        let mut pos = position(120.0, PositionSide::Long);
        pos.take_profit = Some(50.0);
        let mut snap = call_snapshot();
        snap.price = 60.0;
        snap.implied_volatility = 10.0;
        snap.volume = 10.0;
        theta(&mut snap, -9.0);
        let s = ExitMonitor::default().evaluate(&pos, &snap, 0).unwrap().unwrap();
        assert_eq!(s.confidence, 1.0);
        assert_eq!(s.reason, ReasonCode::StopLoss);
    }

    #[test]
    fn rule_table_order_is_fixed() {
        let reasons: Vec<_> = default_rules().iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                ReasonCode::StopLoss,
                ReasonCode::ProfitTarget,
                ReasonCode::ThetaDecay,
                ReasonCode::IvCollapse,
                ReasonCode::Illiquid
            ]
        );
    }
}
