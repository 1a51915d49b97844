//! Kill switch, cooldown, notional caps, and the non-blocking busy lock.
//! Mirrors the shape of the grounding repo's `DataSourceKillSwitch` (armed
//! failure threshold + consecutive-failure counter) generalized to cover
//! every pre-flight guard the execution engine must clear before it is
//! allowed to touch either venue.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::arb::edge::Opportunity;
use crate::arb::error::GuardFailure;
use crate::arb::interval::Clock;
use crate::arb::position::PositionTracker;
use crate::arb::quote::Venue;

#[derive(Debug, Clone, Copy)]
pub struct RiskConfig {
    pub daily_loss_cap: f64,
    pub max_open_notional: f64,
    pub cooldown_secs: i64,
    pub consecutive_failure_threshold: u32,
    pub max_open_orders_per_venue: usize,
    pub rollover_guard_ms: i64,
    pub max_stale_quote_ms: i64,
    pub position_imbalance_tolerance: f64,
}

/// Non-blocking mutual-exclusion primitive: `try_acquire` either wins
/// immediately or fails immediately. There is no blocking wait anywhere in
/// the execution path, since a stuck waiter would itself be a risk.
#[derive(Debug, Default)]
pub struct BusyLock(AtomicBool);

pub struct BusyLockGuard<'a>(&'a BusyLock);

impl BusyLock {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn try_acquire(&self) -> Result<BusyLockGuard<'_>, GuardFailure> {
        match self
            .0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(BusyLockGuard(self)),
            Err(_) => Err(GuardFailure::BusyLockHeld),
        }
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Drop for BusyLockGuard<'_> {
    fn drop(&mut self) {
        self.0 .0.store(false, Ordering::Release);
    }
}

/// Mutable risk bookkeeping, held behind a `tokio::sync::Mutex` by the
/// coordinator. Every field here is something a single execution attempt
/// can move the needle on.
#[derive(Debug, Default)]
pub struct RiskState {
    pub kill_switch_triggered: bool,
    pub consecutive_failures: u32,
    pub daily_realized_pnl: f64,
    pub total_notional: f64,
    pub last_failure_ts: Option<i64>,
    pub last_execution_end_ts: Option<i64>,
}

impl RiskState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_notional(&mut self, amount: f64) {
        self.total_notional += amount;
    }

    pub fn release_notional(&mut self, amount: f64) {
        self.total_notional = (self.total_notional - amount).max(0.0);
    }

    pub fn record_success(&mut self, realized_pnl: f64, now_ts: i64) {
        self.consecutive_failures = 0;
        self.daily_realized_pnl += realized_pnl;
        self.last_execution_end_ts = Some(now_ts);
    }

    pub fn record_failure(&mut self, now_ts: i64, cfg: &RiskConfig) {
        self.consecutive_failures += 1;
        self.last_failure_ts = Some(now_ts);
        self.last_execution_end_ts = Some(now_ts);
        if self.consecutive_failures >= cfg.consecutive_failure_threshold {
            self.kill_switch_triggered = true;
        }
    }

    pub fn reset_daily_pnl(&mut self) {
        self.daily_realized_pnl = 0.0;
    }

    pub fn disable_kill_switch(&mut self) {
        self.kill_switch_triggered = false;
        self.consecutive_failures = 0;
    }

    fn in_cooldown(&self, now_ts: i64, cfg: &RiskConfig) -> Option<i64> {
        let last_failure = self.last_failure_ts?;
        let until = last_failure + cfg.cooldown_secs;
        if now_ts < until {
            Some(until)
        } else {
            None
        }
    }
}

/// Evaluate every pre-flight guard against a candidate opportunity, in the
/// load-bearing order from cheapest/most-global to most-specific: kill
/// switch, cooldown, edge floor, size floor, notional cap, daily loss cap,
/// open-order bounds, rollover proximity, quote staleness, position
/// balance. Returns the first failure encountered.
#[allow(clippy::too_many_arguments)]
pub fn check_guards(
    opp: &Opportunity,
    min_edge_net: f64,
    min_qty: f64,
    state: &RiskState,
    cfg: &RiskConfig,
    positions: &PositionTracker,
    clock: &dyn Clock,
    quote_age_p_ms: i64,
    quote_age_k_ms: i64,
    open_notional: f64,
) -> Result<(), GuardFailure> {
    if state.kill_switch_triggered {
        return Err(GuardFailure::KillSwitchTriggered);
    }

    let now_ts = clock.now().timestamp();
    if let Some(until) = state.in_cooldown(now_ts, cfg) {
        return Err(GuardFailure::InCooldown { until });
    }

    if opp.edge_net < min_edge_net {
        return Err(GuardFailure::EdgeBelowFloor {
            edge_net: opp.edge_net,
            min_edge_net,
        });
    }

    if opp.qty < min_qty {
        return Err(GuardFailure::SizeBelowMinimum {
            qty: opp.qty,
            min_qty,
        });
    }

    let projected_notional = open_notional + opp.qty * opp.cost;
    if projected_notional > cfg.max_open_notional {
        return Err(GuardFailure::NotionalCapExceeded {
            notional: projected_notional,
            cap: cfg.max_open_notional,
        });
    }

    if state.daily_realized_pnl < -cfg.daily_loss_cap {
        return Err(GuardFailure::DailyLossCapExceeded {
            loss: -state.daily_realized_pnl,
            cap: cfg.daily_loss_cap,
        });
    }

    for venue in [Venue::P, Venue::K] {
        let count = positions.open_order_count(venue);
        if count >= cfg.max_open_orders_per_venue {
            return Err(GuardFailure::OpenOrderCountExceeded {
                venue: venue.as_str(),
                count,
                bound: cfg.max_open_orders_per_venue,
            });
        }
    }

    let remaining_ms = crate::arb::interval::ms_until_rollover(clock);
    if remaining_ms < cfg.rollover_guard_ms {
        return Err(GuardFailure::TooCloseToRollover {
            remaining_ms,
            min_ms: cfg.rollover_guard_ms,
        });
    }

    if quote_age_p_ms > cfg.max_stale_quote_ms {
        return Err(GuardFailure::StaleQuote {
            venue: "P",
            age_ms: quote_age_p_ms,
        });
    }
    if quote_age_k_ms > cfg.max_stale_quote_ms {
        return Err(GuardFailure::StaleQuote {
            venue: "K",
            age_ms: quote_age_k_ms,
        });
    }

    check_position_balance(positions, cfg)?;

    Ok(())
}

/// `Σ yes - Σ no` should be within fee-driven tolerance of zero outside an
/// in-flight execution attempt; a larger imbalance means a prior unwind left
/// the book lopsided and new entries should be blocked until reconciled.
pub fn check_position_balance(
    positions: &PositionTracker,
    cfg: &RiskConfig,
) -> Result<(), GuardFailure> {
    let delta = positions.net_yes_minus_no();
    if delta.abs() > cfg.position_imbalance_tolerance {
        return Err(GuardFailure::PositionImbalance { delta });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arb::edge::{ArbLeg, LegSide, LegVenue, Orientation};
    use crate::arb::interval::{FixedClock, IntervalKey};
    use chrono::{TimeZone, Utc};

    fn clock_at(ts: i64) -> FixedClock {
        FixedClock(Utc.timestamp_opt(ts, 0).unwrap())
    }

    fn cfg() -> RiskConfig {
        RiskConfig {
            daily_loss_cap: 100.0,
            max_open_notional: 1000.0,
            cooldown_secs: 60,
            consecutive_failure_threshold: 3,
            max_open_orders_per_venue: 2,
            rollover_guard_ms: 2_000,
            max_stale_quote_ms: 5_000,
            position_imbalance_tolerance: 0.01,
        }
    }

    fn opp(edge_net: f64, qty: f64) -> Opportunity {
        Opportunity {
            interval_key: IntervalKey { start_ts: 0, end_ts: 900 },
            timestamp: 0,
            legs: (
                ArbLeg { venue: LegVenue::P, side: LegSide::Yes, price: 0.46, available_size: 50.0 },
                ArbLeg { venue: LegVenue::K, side: LegSide::No, price: 0.52, available_size: 50.0 },
            ),
            cost: 0.98,
            edge_gross: 0.02,
            edge_net,
            qty,
            orientation: Orientation::PYesKNo,
            reason: "test".into(),
        }
    }

    #[test]
    fn busy_lock_is_exclusive_and_non_blocking() {
        let lock = BusyLock::new();
        let guard = lock.try_acquire().unwrap();
        assert!(lock.try_acquire().is_err());
        drop(guard);
        assert!(lock.try_acquire().is_ok());
    }

    #[test]
    fn kill_switch_blocks_everything() {
        let mut state = RiskState::new();
        let cfg = cfg();
        for _ in 0..cfg.consecutive_failure_threshold {
            state.record_failure(100, &cfg);
        }
        assert!(state.kill_switch_triggered);

        let positions = PositionTracker::new();
        let clock = clock_at(500);
        let result = check_guards(&opp(0.02, 10.0), 0.01, 1.0, &state, &cfg, &positions, &clock, 0, 0, 0.0);
        assert!(matches!(result, Err(GuardFailure::KillSwitchTriggered)));
    }

    #[test]
    fn cooldown_expires_after_window() {
        let mut state = RiskState::new();
        let cfg = cfg();
        state.record_failure(100, &cfg);
        let positions = PositionTracker::new();

        let still_cooling = clock_at(100 + cfg.cooldown_secs - 1);
        assert!(matches!(
            check_guards(&opp(0.02, 10.0), 0.01, 1.0, &state, &cfg, &positions, &still_cooling, 0, 0, 0.0),
            Err(GuardFailure::InCooldown { .. })
        ));

        let cooled = clock_at(100 + cfg.cooldown_secs + 1);
        assert!(check_guards(&opp(0.02, 10.0), 0.01, 1.0, &state, &cfg, &positions, &cooled, 0, 0, 0.0).is_ok());
    }

    #[test]
    fn notional_cap_rejects_oversized_trade() {
        let state = RiskState::new();
        let cfg = cfg();
        let positions = PositionTracker::new();
        let clock = clock_at(1000);
        let result = check_guards(&opp(0.02, 2000.0), 0.01, 1.0, &state, &cfg, &positions, &clock, 0, 0, 0.0);
        assert!(matches!(result, Err(GuardFailure::NotionalCapExceeded { .. })));
    }

    #[test]
    fn rollover_guard_blocks_near_boundary() {
        let state = RiskState::new();
        let cfg = cfg();
        let positions = PositionTracker::new();
        let key = IntervalKey::containing(1_000_000);
        let near_end = clock_at(key.end_ts - 1);
        let result = check_guards(&opp(0.02, 10.0), 0.01, 1.0, &state, &cfg, &positions, &near_end, 0, 0, 0.0);
        assert!(matches!(result, Err(GuardFailure::TooCloseToRollover { .. })));
    }

    #[test]
    fn stale_quote_is_rejected() {
        let state = RiskState::new();
        let cfg = cfg();
        let positions = PositionTracker::new();
        let clock = clock_at(1000);
        let result = check_guards(&opp(0.02, 10.0), 0.01, 1.0, &state, &cfg, &positions, &clock, 10_000, 0, 0.0);
        assert!(matches!(result, Err(GuardFailure::StaleQuote { venue: "P", .. })));
    }

    #[test]
    fn position_imbalance_blocks_new_entries() {
        let mut positions = PositionTracker::new();
        positions.record_fill(
            Venue::P,
            LegSide::Yes,
            crate::arb::position::OrderAction::Buy,
            10.0,
            0.46,
            IntervalKey { start_ts: 0, end_ts: 900 },
            "m".into(),
            1,
            "o1".into(),
            "c1".into(),
            1,
        );
        let cfg = cfg();
        assert!(matches!(
            check_position_balance(&positions, &cfg),
            Err(GuardFailure::PositionImbalance { .. })
        ));
    }
}
