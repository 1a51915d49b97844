//! The two-phase sequential execution engine: leg A (venue P, IOC) then leg
//! B (venue K, FOK), cancel-then-verify on a timed-out leg B, unwind on any
//! leg-B failure. This is the one place in the core allowed to mutate
//! `RiskState.total_notional`, `PositionTracker`, and where `ExecutionRecord`
//! status transitions happen.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::arb::edge::{FeeConfig, LegSide, LegVenue, Opportunity};
use crate::arb::error::{ExecutionError, GuardFailure, VenueError};
use crate::arb::interval::Clock;
use crate::arb::mapping::MarketMapping;
use crate::arb::planner::{plan_execution, ExecutionPlan, LegParams, TimeInForce};
use crate::arb::position::{OpenOrder, OrderAction, PositionTracker};
use crate::arb::quote::{NormalizedQuote, Venue};
use crate::arb::risk::{check_guards, BusyLock, RiskConfig, RiskState};
use crate::arb::venue::{OrderAck, OrderStatus, VenueAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    LegASubmitting,
    LegAFailed,
    LegBSubmitting,
    Success,
    Unwinding,
    Unwound,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub opportunity: Opportunity,
    pub quote_p_snapshot: NormalizedQuote,
    pub quote_k_snapshot: NormalizedQuote,
    pub mapping: MarketMapping,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub id: String,
    pub opportunity: Opportunity,
    pub status: ExecutionStatus,
    pub leg_a: Option<OrderAck>,
    pub leg_b: Option<OrderAck>,
    pub unwind: Option<OrderAck>,
    pub start_ts: i64,
    pub end_ts: Option<i64>,
    pub realized_pnl: f64,
}

#[derive(Debug)]
pub struct ExecutionResult {
    pub success: bool,
    pub record: ExecutionRecord,
    pub should_enter_cooldown: bool,
    pub should_trigger_kill_switch: bool,
    pub error: Option<ExecutionError>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionConfig {
    pub leg_order_timeout_ms: u64,
    pub min_partial_fill_qty: f64,
    pub unwind_retry_attempts: u32,
    pub fees: FeeConfig,
}

fn empty_record(opp: &Opportunity, id: String, status: ExecutionStatus, now_ts: i64) -> ExecutionRecord {
    ExecutionRecord {
        id,
        opportunity: opp.clone(),
        status,
        leg_a: None,
        leg_b: None,
        unwind: None,
        start_ts: now_ts,
        end_ts: Some(now_ts),
        realized_pnl: 0.0,
    }
}

fn soft_abort(
    opp: &Opportunity,
    id: String,
    err: ExecutionError,
    now_ts: i64,
) -> ExecutionResult {
    ExecutionResult {
        success: false,
        record: empty_record(opp, id, ExecutionStatus::Aborted, now_ts),
        should_enter_cooldown: false,
        should_trigger_kill_switch: false,
        error: Some(err),
    }
}

/// Runs the full pre-flight + two-phase execution for `ctx`. `leg_venue_p`
/// and `leg_venue_k` are the concrete adapters for the two venues; which one
/// plays leg A vs leg B is determined per-opportunity by `plan_execution`
/// (always venue P as leg A).
#[allow(clippy::too_many_arguments)]
pub async fn execute(
    ctx: ExecutionContext,
    venue_p: &dyn VenueAdapter,
    venue_k: &dyn VenueAdapter,
    busy_lock: &BusyLock,
    risk_state: &mut RiskState,
    risk_cfg: &RiskConfig,
    positions: &mut PositionTracker,
    clock: &dyn Clock,
    exec_cfg: &ExecutionConfig,
    client_tag: &str,
) -> ExecutionResult {
    let opp = &ctx.opportunity;
    let id = format!("{}-{}", client_tag, opp.interval_key.to_key_string());
    let now_ts = clock.now().timestamp();

    // 1. mapping completeness
    if !ctx.mapping.is_complete() {
        return soft_abort(opp, id, GuardFailure::MappingIncomplete.into(), now_ts);
    }

    // 2 & 3. kill switch / cooldown are folded into check_guards below, but
    // the busy lock must be acquired first per the load-bearing order.
    if risk_state.kill_switch_triggered {
        return soft_abort(opp, id, GuardFailure::KillSwitchTriggered.into(), now_ts);
    }

    // 4. acquire busy lock (non-blocking)
    let _guard = match busy_lock.try_acquire() {
        Ok(g) => g,
        Err(_) => {
            return ExecutionResult {
                success: false,
                record: empty_record(opp, id, ExecutionStatus::Pending, now_ts),
                should_enter_cooldown: false,
                should_trigger_kill_switch: false,
                error: Some(ExecutionError::Deferred("busy lock held".into())),
            };
        }
    };

    // 5. qty capping to remaining notional headroom
    let remaining_notional = (risk_cfg.max_open_notional - risk_state.total_notional).max(0.0);
    let capped_qty = (remaining_notional / opp.cost).min(opp.qty).floor().max(0.0);
    if capped_qty <= 0.0 {
        return soft_abort(opp, id, GuardFailure::InsufficientNotionalHeadroom.into(), now_ts);
    }

    let mut opp = opp.clone();
    opp.qty = capped_qty;

    // 6. run all guards
    let quote_age_p = ctx.quote_p_snapshot.age_ms(now_ts * 1000);
    let quote_age_k = ctx.quote_k_snapshot.age_ms(now_ts * 1000);
    if let Err(e) = check_guards(
        &opp,
        0.0, // floor already enforced by the edge engine before Opportunity was emitted
        0.0,
        risk_state,
        risk_cfg,
        positions,
        clock,
        quote_age_p,
        quote_age_k,
        risk_state.total_notional,
    ) {
        return soft_abort(&opp, id, e.into(), now_ts);
    }

    // 7. position balance pre-check is part of check_guards already.

    if ctx.dry_run {
        return execute_dry_run(&opp, id, now_ts);
    }

    let plan = plan_execution(&opp, client_tag);
    execute_live(
        &opp,
        id,
        plan,
        venue_p,
        venue_k,
        risk_state,
        positions,
        now_ts,
        exec_cfg,
    )
    .await
}

fn execute_dry_run(opp: &Opportunity, id: String, now_ts: i64) -> ExecutionResult {
    let plan = plan_execution(opp, "dry");
    let record = ExecutionRecord {
        id,
        opportunity: opp.clone(),
        status: ExecutionStatus::Success,
        leg_a: Some(synth_ack(&plan.leg_a)),
        leg_b: Some(synth_ack(&plan.leg_b)),
        unwind: None,
        start_ts: now_ts,
        end_ts: Some(now_ts),
        realized_pnl: opp.edge_net * opp.qty,
    };
    ExecutionResult {
        success: true,
        record,
        should_enter_cooldown: false,
        should_trigger_kill_switch: false,
        error: None,
    }
}

fn synth_ack(leg: &LegParams) -> OrderAck {
    OrderAck {
        order_id: format!("dryrun-{}", leg.client_order_id),
        client_order_id: leg.client_order_id.clone(),
        status: OrderStatus::Filled,
        filled_qty: leg.qty,
        avg_fill_price: leg.price,
    }
}

async fn submit_with_timeout(
    adapter: &dyn VenueAdapter,
    params: &LegParams,
    timeout_ms: u64,
) -> Result<OrderAck, VenueError> {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), adapter.place_order(params)).await {
        Ok(inner) => inner,
        Err(_) => Err(VenueError::transient("leg order timed out")),
    }
}

#[allow(clippy::too_many_arguments)]
async fn execute_live(
    opp: &Opportunity,
    id: String,
    plan: ExecutionPlan,
    venue_p: &dyn VenueAdapter,
    venue_k: &dyn VenueAdapter,
    risk_state: &mut RiskState,
    positions: &mut PositionTracker,
    now_ts: i64,
    exec_cfg: &ExecutionConfig,
) -> ExecutionResult {
    // Phase A
    positions.open_order(open_order_for(&plan.leg_a, Venue::P, OrderAction::Buy, now_ts));
    let leg_a_result = submit_with_timeout(venue_p, &plan.leg_a, exec_cfg.leg_order_timeout_ms).await;
    positions.remove_open_order(&plan.leg_a.client_order_id);

    let ack_a = match leg_a_result {
        Ok(ack) if ack.filled_qty > 0.0 => ack,
        Ok(_) => {
            return finish_leg_a_failed(opp, id, now_ts, false, false);
        }
        Err(e) => {
            let permanent = e.is_permanent();
            return finish_leg_a_failed(opp, id, now_ts, permanent, permanent);
        }
    };

    let q_a_raw = ack_a.filled_qty;
    let q_b_target = q_a_raw.round();

    if q_b_target < exec_cfg.min_partial_fill_qty {
        return unwind_dust(opp, id, ack_a, venue_p, positions, risk_state, now_ts, &plan.leg_a).await;
    }

    risk_state.add_notional(ack_a.avg_fill_price * q_a_raw);

    let mut leg_b = plan.leg_b.clone();
    leg_b.qty = q_b_target;

    positions.open_order(open_order_for(&leg_b, Venue::K, OrderAction::Buy, now_ts));
    let leg_b_result = submit_with_timeout(venue_k, &leg_b, exec_cfg.leg_order_timeout_ms).await;
    positions.remove_open_order(&leg_b.client_order_id);

    let ack_b = match leg_b_result {
        Ok(ack) if ack.status == OrderStatus::Filled && ack.filled_qty >= q_b_target - 1e-9 => ack,
        Ok(_) => {
            return unwind_leg_a(
                opp, id, ack_a, venue_p, positions, risk_state, now_ts, &plan.leg_a, exec_cfg, false,
            )
            .await;
        }
        Err(e) => {
            // cancel-then-verify: the promise rejected (timeout); check the
            // venue's own record before concluding it never filled.
            let verified = venue_k.get_order_status(&leg_b.client_order_id).await.ok();
            match verified {
                Some(ack) if ack.status == OrderStatus::Filled && ack.filled_qty >= q_b_target - 1e-9 => ack,
                _ => {
                    let _ = venue_k.cancel_order(&leg_b.client_order_id).await;
                    return unwind_leg_a(
                        opp,
                        id,
                        ack_a,
                        venue_p,
                        positions,
                        risk_state,
                        now_ts,
                        &plan.leg_a,
                        exec_cfg,
                        e.is_permanent(),
                    )
                    .await;
                }
            }
        }
    };

    // Both filled.
    positions.record_fill(
        Venue::P,
        leg_side_for(venue_p.venue(), opp),
        OrderAction::Buy,
        ack_a.filled_qty,
        ack_a.avg_fill_price,
        opp.interval_key,
        plan.leg_a.client_order_id.clone(),
        now_ts,
        ack_a.order_id.clone(),
        plan.leg_a.client_order_id.clone(),
        now_ts,
    );
    positions.record_fill(
        Venue::K,
        leg_side_for(venue_k.venue(), opp),
        OrderAction::Buy,
        ack_b.filled_qty,
        ack_b.avg_fill_price,
        opp.interval_key,
        leg_b.client_order_id.clone(),
        now_ts,
        ack_b.order_id.clone(),
        leg_b.client_order_id.clone(),
        now_ts,
    );

    let fee_a = exec_cfg.fees.venue_p.fee_for(ack_a.avg_fill_price, ack_a.filled_qty);
    let fee_b = exec_cfg.fees.venue_k.fee_for(ack_b.avg_fill_price, ack_b.filled_qty);
    let realized_pnl_estimate =
        (1.0 * ack_b.filled_qty) - (ack_a.avg_fill_price * ack_a.filled_qty + ack_b.avg_fill_price * ack_b.filled_qty) - fee_a - fee_b;

    if q_a_raw > q_b_target + 1e-9 {
        let excess = q_a_raw - q_b_target;
        info!(excess, "leg A over-filled relative to venue K's integer size, trimming");
        let bid = plan.leg_a.price;
        let client_order_id = format!("{}-trim", plan.leg_a.client_order_id);
        // Outcome does not gate completion: a failed trim just leaves a
        // small excess for the reconciler to pick up next tick.
        let _ = venue_p
            .sell(&client_order_id, LegSide::Yes, excess, bid, TimeInForce::Ioc)
            .await;
    }

    ExecutionResult {
        success: true,
        record: ExecutionRecord {
            id,
            opportunity: opp.clone(),
            status: ExecutionStatus::Success,
            leg_a: Some(ack_a),
            leg_b: Some(ack_b),
            unwind: None,
            start_ts: now_ts,
            end_ts: Some(now_ts),
            realized_pnl: realized_pnl_estimate,
        },
        should_enter_cooldown: false,
        should_trigger_kill_switch: false,
        error: None,
    }
}

fn open_order_for(leg: &LegParams, venue: Venue, action: OrderAction, now_ts: i64) -> OpenOrder {
    OpenOrder {
        order_id: String::new(),
        client_order_id: leg.client_order_id.clone(),
        venue,
        side: leg.side,
        action,
        price: leg.price,
        qty: leg.qty,
        submit_ts: now_ts,
        interval_key: leg.interval_key,
    }
}

fn leg_side_for(venue: Venue, opp: &Opportunity) -> LegSide {
    let (a, b) = opp.legs;
    let target = match venue {
        Venue::P => LegVenue::P,
        Venue::K => LegVenue::K,
    };
    if a.venue == target {
        a.side
    } else {
        b.side
    }
}

fn finish_leg_a_failed(
    opp: &Opportunity,
    id: String,
    now_ts: i64,
    cooldown: bool,
    kill_switch: bool,
) -> ExecutionResult {
    ExecutionResult {
        success: false,
        record: ExecutionRecord {
            id,
            opportunity: opp.clone(),
            status: ExecutionStatus::LegAFailed,
            leg_a: None,
            leg_b: None,
            unwind: None,
            start_ts: now_ts,
            end_ts: Some(now_ts),
            realized_pnl: 0.0,
        },
        should_enter_cooldown: cooldown,
        should_trigger_kill_switch: kill_switch,
        error: None,
    }
}

async fn unwind_dust(
    opp: &Opportunity,
    id: String,
    ack_a: OrderAck,
    venue_p: &dyn VenueAdapter,
    positions: &mut PositionTracker,
    risk_state: &mut RiskState,
    now_ts: i64,
    leg_a: &LegParams,
) -> ExecutionResult {
    warn!(qty = ack_a.filled_qty, "leg A fill below min partial-fill floor, unwinding dust");
    // The dust path returns before `execute_live` adds leg-A's notional, so
    // `unwind_common` must add it here; the leg-B failure path below already
    // added it and must not add it again.
    unwind_common(opp, id, ack_a, venue_p, positions, risk_state, now_ts, leg_a, 1, false, true)
        .await
}

#[allow(clippy::too_many_arguments)]
async fn unwind_leg_a(
    opp: &Opportunity,
    id: String,
    ack_a: OrderAck,
    venue_p: &dyn VenueAdapter,
    positions: &mut PositionTracker,
    risk_state: &mut RiskState,
    now_ts: i64,
    leg_a: &LegParams,
    exec_cfg: &ExecutionConfig,
    leg_b_permanent: bool,
) -> ExecutionResult {
    let mut result = unwind_common(
        opp,
        id,
        ack_a,
        venue_p,
        positions,
        risk_state,
        now_ts,
        leg_a,
        exec_cfg.unwind_retry_attempts,
        true,
        false,
    )
    .await;
    if leg_b_permanent {
        result.should_trigger_kill_switch = true;
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn unwind_common(
    opp: &Opportunity,
    id: String,
    ack_a: OrderAck,
    venue_p: &dyn VenueAdapter,
    positions: &mut PositionTracker,
    risk_state: &mut RiskState,
    now_ts: i64,
    leg_a: &LegParams,
    retry_attempts: u32,
    enter_cooldown: bool,
    add_leg_a_notional: bool,
) -> ExecutionResult {
    positions.record_fill(
        Venue::P,
        leg_a.side,
        OrderAction::Buy,
        ack_a.filled_qty,
        ack_a.avg_fill_price,
        opp.interval_key,
        leg_a.client_order_id.clone(),
        now_ts,
        ack_a.order_id.clone(),
        leg_a.client_order_id.clone(),
        now_ts,
    );
    // The normal leg-B-failure path already recorded leg A's notional in
    // `execute_live` before submitting leg B; only the dust path needs it
    // added here, or it would be double-counted against `total_notional`.
    if add_leg_a_notional {
        risk_state.add_notional(ack_a.avg_fill_price * ack_a.filled_qty);
    }

    let sell_price = leg_a.price - 0.02; // conservative assumption: sell through the current bid
    let mut attempt = 0;
    let mut last_err: Option<VenueError> = None;
    let mut unwind_ack: Option<OrderAck> = None;
    while attempt <= retry_attempts {
        match venue_p
            .sell(&leg_a.client_order_id, leg_a.side, ack_a.filled_qty, sell_price, TimeInForce::Ioc)
            .await
        {
            Ok(ack) if ack.filled_qty > 0.0 => {
                unwind_ack = Some(ack);
                break;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        attempt += 1;
    }

    match unwind_ack {
        Some(ack) => {
            positions.record_unwind(
                Venue::P,
                leg_a.side,
                ack.filled_qty,
                ack.avg_fill_price,
                opp.interval_key,
                leg_a.client_order_id.clone(),
                now_ts,
                ack.order_id.clone(),
            );
            risk_state.release_notional(ack_a.avg_fill_price * ack.filled_qty);
            let realized_loss = (leg_a.price - ack.avg_fill_price) * ack.filled_qty;

            ExecutionResult {
                success: false,
                record: ExecutionRecord {
                    id,
                    opportunity: opp.clone(),
                    status: ExecutionStatus::Unwound,
                    leg_a: Some(ack_a),
                    leg_b: None,
                    unwind: Some(ack),
                    start_ts: now_ts,
                    end_ts: Some(now_ts),
                    realized_pnl: -realized_loss,
                },
                should_enter_cooldown: enter_cooldown,
                should_trigger_kill_switch: false,
                error: None,
            }
        }
        None => {
            error!(?last_err, "unwind failed after retries: unhedged exposure remains");
            ExecutionResult {
                success: false,
                record: ExecutionRecord {
                    id,
                    opportunity: opp.clone(),
                    status: ExecutionStatus::Unwinding,
                    leg_a: Some(ack_a),
                    leg_b: None,
                    unwind: None,
                    start_ts: now_ts,
                    end_ts: Some(now_ts),
                    realized_pnl: 0.0,
                },
                should_enter_cooldown: true,
                should_trigger_kill_switch: true,
                error: Some(ExecutionError::UnwindFailed(
                    last_err.map(|e| e.to_string()).unwrap_or_else(|| "no fill".into()),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arb::edge::{ArbLeg, Orientation};
    use crate::arb::interval::{FixedClock, IntervalKey};
    use crate::arb::mapping::{VenueKHalf, VenuePHalf};
    use crate::arb::venue::{PaperVenueAdapter, PaperVenueConfig};
    use chrono::{TimeZone, Utc};

    fn clock_at(ts: i64) -> FixedClock {
        FixedClock(Utc.timestamp_opt(ts, 0).unwrap())
    }

    fn opp() -> Opportunity {
        Opportunity {
            interval_key: IntervalKey::containing(1_000_000),
            timestamp: 1_000_000,
            legs: (
                ArbLeg { venue: LegVenue::P, side: LegSide::Yes, price: 0.46, available_size: 50.0 },
                ArbLeg { venue: LegVenue::K, side: LegSide::No, price: 0.52, available_size: 50.0 },
            ),
            cost: 0.98,
            edge_gross: 0.02,
            edge_net: 0.015,
            qty: 10.0,
            orientation: Orientation::PYesKNo,
            reason: "test".into(),
        }
    }

    fn complete_mapping(interval_key: IntervalKey) -> MarketMapping {
        MarketMapping {
            interval_key,
            venue_p: Some(VenuePHalf {
                up_token_id: "up".into(),
                down_token_id: "down".into(),
                slug: "btc-updown-15m-0".into(),
                reference_price: None,
            }),
            venue_k: Some(VenueKHalf {
                event_ticker: "e".into(),
                market_ticker: "m".into(),
                series_ticker: "s".into(),
                reference_price: None,
            }),
            discovered_at: 0,
        }
    }

    fn quote(yes_ask: f64, no_ask: f64) -> NormalizedQuote {
        use crate::arb::quote::BookSide;
        NormalizedQuote {
            yes_bid: BookSide { price: yes_ask - 0.02, size: 100.0 },
            yes_ask: BookSide { price: yes_ask, size: 100.0 },
            no_bid: BookSide { price: no_ask - 0.02, size: 100.0 },
            no_ask: BookSide { price: no_ask, size: 100.0 },
            ts_exchange: 1_000_000,
            ts_local: 1_000_000_000,
        }
    }

    fn risk_cfg() -> RiskConfig {
        RiskConfig {
            daily_loss_cap: 1000.0,
            max_open_notional: 10_000.0,
            cooldown_secs: 60,
            consecutive_failure_threshold: 3,
            max_open_orders_per_venue: 5,
            rollover_guard_ms: 2_000,
            max_stale_quote_ms: 120_000,
            position_imbalance_tolerance: 0.01,
        }
    }

    fn exec_cfg() -> ExecutionConfig {
        ExecutionConfig {
            leg_order_timeout_ms: 2_000,
            min_partial_fill_qty: 1.0,
            unwind_retry_attempts: 2,
            fees: FeeConfig {
                venue_p: crate::arb::edge::FeeSchedule::FixedBps { bps: 0.0 },
                venue_k: crate::arb::edge::FeeSchedule::FixedBps { bps: 0.0 },
            },
        }
    }

    #[tokio::test]
    async fn clean_arb_executes_successfully() {
        let venue_p = PaperVenueAdapter::new(Venue::P, PaperVenueConfig { fill_probability: 1.0, slippage_bps: 0.0, seed: 1 });
        let venue_k = PaperVenueAdapter::new(Venue::K, PaperVenueConfig { fill_probability: 1.0, slippage_bps: 0.0, seed: 2 });
        let lock = BusyLock::new();
        let mut state = RiskState::new();
        let mut positions = PositionTracker::new();
        let clock = clock_at(1_000_000);

        let ctx = ExecutionContext {
            opportunity: opp(),
            quote_p_snapshot: quote(0.46, 0.99),
            quote_k_snapshot: quote(0.99, 0.52),
            mapping: complete_mapping(opp().interval_key),
            dry_run: false,
        };

        let result = execute(
            ctx,
            &venue_p,
            &venue_k,
            &lock,
            &mut state,
            &risk_cfg(),
            &mut positions,
            &clock,
            &exec_cfg(),
            "bot",
        )
        .await;

        assert!(result.success);
        assert_eq!(result.record.status, ExecutionStatus::Success);
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn leg_b_rejection_triggers_unwind() {
        let venue_p = PaperVenueAdapter::new(Venue::P, PaperVenueConfig { fill_probability: 1.0, slippage_bps: 0.0, seed: 1 });
        let venue_k = PaperVenueAdapter::new(Venue::K, PaperVenueConfig { fill_probability: 0.0, slippage_bps: 0.0, seed: 2 });
        let lock = BusyLock::new();
        let mut state = RiskState::new();
        let mut positions = PositionTracker::new();
        let clock = clock_at(1_000_000);

        let ctx = ExecutionContext {
            opportunity: opp(),
            quote_p_snapshot: quote(0.46, 0.99),
            quote_k_snapshot: quote(0.99, 0.52),
            mapping: complete_mapping(opp().interval_key),
            dry_run: false,
        };

        let result = execute(
            ctx,
            &venue_p,
            &venue_k,
            &lock,
            &mut state,
            &risk_cfg(),
            &mut positions,
            &clock,
            &exec_cfg(),
            "bot",
        )
        .await;

        assert!(!result.success);
        assert_eq!(result.record.status, ExecutionStatus::Unwound);
        assert!(result.should_enter_cooldown);
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn dry_run_synthesizes_fills_without_io() {
        let venue_p = PaperVenueAdapter::new(Venue::P, PaperVenueConfig { fill_probability: 0.0, ..Default::default() });
        let venue_k = PaperVenueAdapter::new(Venue::K, PaperVenueConfig { fill_probability: 0.0, ..Default::default() });
        let lock = BusyLock::new();
        let mut state = RiskState::new();
        let mut positions = PositionTracker::new();
        let clock = clock_at(1_000_000);

        let ctx = ExecutionContext {
            opportunity: opp(),
            quote_p_snapshot: quote(0.46, 0.99),
            quote_k_snapshot: quote(0.99, 0.52),
            mapping: complete_mapping(opp().interval_key),
            dry_run: true,
        };

        let result = execute(
            ctx,
            &venue_p,
            &venue_k,
            &lock,
            &mut state,
            &risk_cfg(),
            &mut positions,
            &clock,
            &exec_cfg(),
            "bot",
        )
        .await;

        assert!(result.success);
        assert_eq!(result.record.status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn incomplete_mapping_aborts_without_touching_venues() {
        let venue_p = PaperVenueAdapter::new(Venue::P, PaperVenueConfig::default());
        let venue_k = PaperVenueAdapter::new(Venue::K, PaperVenueConfig::default());
        let lock = BusyLock::new();
        let mut state = RiskState::new();
        let mut positions = PositionTracker::new();
        let clock = clock_at(1_000_000);

        let mut mapping = complete_mapping(opp().interval_key);
        mapping.venue_k = None;

        let ctx = ExecutionContext {
            opportunity: opp(),
            quote_p_snapshot: quote(0.46, 0.99),
            quote_k_snapshot: quote(0.99, 0.52),
            mapping,
            dry_run: false,
        };

        let result = execute(
            ctx,
            &venue_p,
            &venue_k,
            &lock,
            &mut state,
            &risk_cfg(),
            &mut positions,
            &clock,
            &exec_cfg(),
            "bot",
        )
        .await;

        assert!(!result.success);
        assert_eq!(result.record.status, ExecutionStatus::Aborted);
    }
}
