//! Periodic background reconciliation: venue truth always wins over the
//! local tracker, and any residual imbalance is corrected by whichever of
//! "complete the missing leg" or "unwind the excess leg" yields the larger
//! PnL.

use tracing::{info, warn};

use crate::arb::edge::LegSide;
use crate::arb::error::VenueError;
use crate::arb::interval::Clock;
use crate::arb::mapping::MarketMapping;
use crate::arb::planner::TimeInForce;
use crate::arb::position::PositionTracker;
use crate::arb::quote::{NormalizedQuote, Venue};
use crate::arb::risk::{BusyLock, RiskState};
use crate::arb::venue::VenueAdapter;

/// Venue-specific reconciliation tolerance: K deals in whole contracts so
/// any drift is real; P's fractional tokens tolerate a one-cent-of-token
/// rounding slop.
pub fn tolerance_for(venue: Venue) -> f64 {
    match venue {
        Venue::K => 0.0,
        Venue::P => 0.01,
    }
}

/// Mismatches at or beyond this magnitude are logged as warnings even when
/// the override itself succeeds quietly.
pub const LARGE_MISMATCH_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Skipped,
    Balanced,
    CorrectiveOrderSubmitted,
    CorrectiveOrderDeferred,
    CorrectiveOrderFailed,
}

#[derive(Debug, Clone, Copy)]
pub enum CorrectiveAction {
    Complete { side: LegSide, venue: Venue, qty: f64 },
    Unwind { side: LegSide, venue: Venue, qty: f64 },
}

pub struct ReconcileContext<'a> {
    pub mapping: Option<&'a MarketMapping>,
    pub volatility_active: bool,
    pub in_grace_period: bool,
    pub quote_p: &'a NormalizedQuote,
    pub quote_k: &'a NormalizedQuote,
    pub fee_estimate_per_leg: f64,
}

#[allow(clippy::too_many_arguments)]
pub async fn reconcile_tick(
    ctx: ReconcileContext<'_>,
    positions: &mut PositionTracker,
    venue_p: &dyn VenueAdapter,
    venue_k: &dyn VenueAdapter,
    market_id_p: &str,
    market_id_k: &str,
    busy_lock: &BusyLock,
    risk_state: &mut RiskState,
    clock: &dyn Clock,
) -> ReconcileOutcome {
    if ctx.mapping.is_none() || ctx.volatility_active || ctx.in_grace_period {
        return ReconcileOutcome::Skipped;
    }

    let (report_p, report_k) =
        tokio::join!(venue_p.get_position(market_id_p), venue_k.get_position(market_id_k));

    if let Ok(report) = report_p {
        override_if_mismatched(positions, Venue::P, LegSide::Yes, report.yes_qty);
        override_if_mismatched(positions, Venue::P, LegSide::No, report.no_qty);
    }
    if let Ok(report) = report_k {
        override_if_mismatched(positions, Venue::K, LegSide::Yes, report.yes_qty);
        override_if_mismatched(positions, Venue::K, LegSide::No, report.no_qty);
    }

    let delta = positions.net_yes_minus_no();
    if delta.abs() <= 0.01 {
        return ReconcileOutcome::Balanced;
    }

    let action = plan_corrective_action(delta, &ctx, positions);

    match busy_lock.try_acquire() {
        Err(_) => ReconcileOutcome::CorrectiveOrderDeferred,
        Ok(_guard) => {
            let blocked_by_kill_switch = matches!(action, CorrectiveAction::Complete { .. }) && risk_state.kill_switch_triggered;
            if blocked_by_kill_switch {
                warn!("kill switch blocks completing the missing leg; unwind remains available");
                return ReconcileOutcome::CorrectiveOrderDeferred;
            }

            let result = submit_corrective(action, venue_p, venue_k).await;
            let now_ts = clock.now().timestamp();
            match result {
                Ok(()) => {
                    risk_state.last_execution_end_ts = Some(now_ts);
                    info!(?delta, "reconciler corrective order submitted");
                    ReconcileOutcome::CorrectiveOrderSubmitted
                }
                Err(e) => {
                    warn!(error = %e, "reconciler corrective order failed");
                    ReconcileOutcome::CorrectiveOrderFailed
                }
            }
        }
    }
}

fn override_if_mismatched(positions: &mut PositionTracker, venue: Venue, side: LegSide, reported_qty: f64) {
    let local = positions.position_qty(venue, side).unwrap_or(0.0);
    let diff = (reported_qty - local).abs();
    if diff > tolerance_for(venue) {
        if diff >= LARGE_MISMATCH_THRESHOLD {
            warn!(?venue, ?side, local, reported_qty, "large position mismatch, overriding with venue truth");
        }
        positions.override_position(venue, side, reported_qty);
    }
}

/// `delta = Σ yes − Σ no`. Positive means excess YES (missing a NO leg
/// somewhere); negative means excess NO. Compare completing the missing
/// side against unwinding the excess side and take whichever nets more.
fn plan_corrective_action(delta: f64, ctx: &ReconcileContext<'_>, positions: &PositionTracker) -> CorrectiveAction {
    let qty = delta.abs();

    if delta > 0.0 {
        // Excess YES. Complete by buying NO wherever it's cheaper to
        // source; unwind by selling the excess YES at its venue's bid.
        let ask_missing_no = ctx.quote_k.no_ask.price.min(ctx.quote_p.no_ask.price);
        let complete_pnl = (1.0 - ask_missing_no) * qty - ctx.fee_estimate_per_leg;

        let (yes_venue, bid_excess_yes) = if positions.position_qty(Venue::P, LegSide::Yes).is_some() {
            (Venue::P, ctx.quote_p.yes_bid.price)
        } else {
            (Venue::K, ctx.quote_k.yes_bid.price)
        };
        let unwind_recovery = bid_excess_yes * qty - ctx.fee_estimate_per_leg;

        if complete_pnl >= unwind_recovery {
            let complete_venue = if ctx.quote_k.no_ask.price <= ctx.quote_p.no_ask.price { Venue::K } else { Venue::P };
            CorrectiveAction::Complete { side: LegSide::No, venue: complete_venue, qty }
        } else {
            CorrectiveAction::Unwind { side: LegSide::Yes, venue: yes_venue, qty }
        }
    } else {
        let ask_missing_yes = ctx.quote_k.yes_ask.price.min(ctx.quote_p.yes_ask.price);
        let complete_pnl = (1.0 - ask_missing_yes) * qty - ctx.fee_estimate_per_leg;

        let (no_venue, bid_excess_no) = if positions.position_qty(Venue::P, LegSide::No).is_some() {
            (Venue::P, ctx.quote_p.no_bid.price)
        } else {
            (Venue::K, ctx.quote_k.no_bid.price)
        };
        let unwind_recovery = bid_excess_no * qty - ctx.fee_estimate_per_leg;

        if complete_pnl >= unwind_recovery {
            let complete_venue = if ctx.quote_k.yes_ask.price <= ctx.quote_p.yes_ask.price { Venue::K } else { Venue::P };
            CorrectiveAction::Complete { side: LegSide::Yes, venue: complete_venue, qty }
        } else {
            CorrectiveAction::Unwind { side: LegSide::No, venue: no_venue, qty }
        }
    }
}

async fn submit_corrective(
    action: CorrectiveAction,
    venue_p: &dyn VenueAdapter,
    venue_k: &dyn VenueAdapter,
) -> Result<(), VenueError> {
    match action {
        CorrectiveAction::Complete { side, venue, qty } => {
            let adapter = match venue {
                Venue::P => venue_p,
                Venue::K => venue_k,
            };
            let params = crate::arb::planner::LegParams {
                venue: match venue {
                    Venue::P => crate::arb::edge::LegVenue::P,
                    Venue::K => crate::arb::edge::LegVenue::K,
                },
                side,
                price: 0.99,
                qty,
                tif: TimeInForce::Ioc,
                client_order_id: format!("reconcile-complete-{}", qty),
                interval_key: crate::arb::interval::IntervalKey { start_ts: 0, end_ts: 900 },
            };
            adapter.place_order(&params).await.map(|_| ())
        }
        CorrectiveAction::Unwind { side, venue, qty } => {
            let adapter = match venue {
                Venue::P => venue_p,
                Venue::K => venue_k,
            };
            adapter
                .sell(&format!("reconcile-unwind-{qty}"), side, qty, 0.01, TimeInForce::Ioc)
                .await
                .map(|_| ())
        }
    }
}
