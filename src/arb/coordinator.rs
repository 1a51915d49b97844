//! Orchestrates the whole interval lifecycle: discovery, quote forwarding,
//! opportunity detection → execution, and rollover bookkeeping. Everything
//! else in this module tree is a library the coordinator drives; this is
//! the one component with a `tick()` a caller loops on.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::arb::edge::{detect_opportunity, EdgeConfig, LegSide};
use crate::arb::error::VenueError;
use crate::arb::execution::{execute, ExecutionConfig, ExecutionContext, ExecutionResult};
use crate::arb::interval::{current_interval, next_interval, should_prefetch, Clock};
use crate::arb::mapping::{MappingStore, VenueKHalf, VenuePHalf};
use crate::arb::position::PositionTracker;
use crate::arb::quote::{QuoteAggregator, Venue};
use crate::arb::reconciler::{reconcile_tick, ReconcileContext};
use crate::arb::risk::{BusyLock, RiskConfig, RiskState};
use crate::arb::settlement::{is_due, resolve_settlement, PendingSettlement};
use crate::arb::venue::VenueAdapter;
use crate::arb::volatility::{with_busy_lock, VolatilityConfig, VolatilityManager, VolState};

#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn discover_venue_p(&self, interval: crate::arb::interval::IntervalKey) -> Result<VenuePHalf, VenueError>;
    async fn discover_venue_k(&self, interval: crate::arb::interval::IntervalKey) -> Result<VenueKHalf, VenueError>;
}

/// Window before rollover within which the next interval's mapping is
/// prefetched, and the grace period after rollover during which the
/// reconciler and trim-sell fallout are expected to still be settling.
pub const PREFETCH_WINDOW_MS: i64 = 60_000;
pub const POST_EXECUTION_GRACE_MS: i64 = 15_000;
pub const MAPPING_GRACE_SECS: i64 = 30;

pub struct CoordinatorConfig {
    pub edge: EdgeConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub volatility: VolatilityConfig,
    pub client_tag: String,
}

pub struct IntervalCoordinator {
    pub mappings: MappingStore,
    pub quotes: QuoteAggregator,
    pub positions: PositionTracker,
    pub risk_state: RiskState,
    pub volatility: VolatilityManager,
    pub busy_lock: BusyLock,
    pub pending_settlements: Vec<PendingSettlement>,
    current_tracked_interval: Option<crate::arb::interval::IntervalKey>,
    current_day: Option<i64>,
    last_execution_ts: Option<i64>,
}

impl IntervalCoordinator {
    pub fn new() -> Self {
        Self {
            mappings: MappingStore::new(),
            quotes: QuoteAggregator::new(),
            positions: PositionTracker::new(),
            risk_state: RiskState::new(),
            volatility: VolatilityManager::new(),
            busy_lock: BusyLock::new(),
            pending_settlements: Vec::new(),
            current_tracked_interval: None,
            current_day: None,
            last_execution_ts: None,
        }
    }

    fn in_post_execution_grace(&self, now_ts: i64) -> bool {
        self.last_execution_ts
            .map(|t| (now_ts - t) * 1000 < POST_EXECUTION_GRACE_MS)
            .unwrap_or(false)
    }

    /// One coordinator tick: discovery, prefetch, opportunity detection +
    /// execution, and rollover handling. Returns the execution result if an
    /// opportunity was acted on this tick. `spot_price` is the underlying's
    /// current price, fed to the volatility manager regardless of whether
    /// an opportunity exists this tick.
    #[allow(clippy::too_many_arguments)]
    pub async fn tick(
        &mut self,
        clock: &dyn Clock,
        discovery: &dyn DiscoverySource,
        venue_p: &dyn VenueAdapter,
        venue_k: &dyn VenueAdapter,
        cfg: &CoordinatorConfig,
        spot_price: f64,
        dry_run: bool,
    ) -> Option<ExecutionResult> {
        let now_ts = clock.now().timestamp();
        let current = current_interval(clock);

        self.process_due_settlements(venue_p, venue_k, now_ts).await;

        if self.current_tracked_interval != Some(current) {
            self.on_rollover(current, now_ts);
        }

        self.ensure_mapping(current, discovery, now_ts).await;

        if should_prefetch(clock, PREFETCH_WINDOW_MS) {
            let upcoming = next_interval(clock);
            self.ensure_mapping(upcoming, discovery, now_ts).await;
        }

        let mapping = self.mappings.get(current)?.clone();
        if !mapping.is_complete() {
            return None;
        }
        let settlement_mapping = mapping.clone();

        let (quote_p, quote_k) = (self.quotes.current_p()?.clone(), self.quotes.current_k()?.clone());

        let ms_to_rollover = crate::arb::interval::ms_until_rollover(clock);

        self.run_volatility_step(spot_price, &quote_p, &quote_k, venue_p, venue_k, cfg, ms_to_rollover, now_ts)
            .await;

        if self.volatility.should_halt_trading(ms_to_rollover, &cfg.volatility) {
            return None;
        }

        self.run_reconciliation(&settlement_mapping, &quote_p, &quote_k, venue_p, venue_k, cfg, clock, now_ts)
            .await;

        let opp = detect_opportunity(&quote_p, &quote_k, current, now_ts, &cfg.edge)?;

        let ctx = ExecutionContext {
            opportunity: opp,
            quote_p_snapshot: quote_p,
            quote_k_snapshot: quote_k,
            mapping,
            dry_run,
        };

        let result = execute(
            ctx,
            venue_p,
            venue_k,
            &self.busy_lock,
            &mut self.risk_state,
            &cfg.risk,
            &mut self.positions,
            clock,
            &cfg.execution,
            &cfg.client_tag,
        )
        .await;

        self.last_execution_ts = Some(now_ts);
        if result.should_enter_cooldown {
            self.risk_state.record_failure(now_ts, &cfg.risk);
        } else if result.success {
            self.risk_state.record_success(result.record.realized_pnl, now_ts);
            if let (Some(p), Some(k)) = (&settlement_mapping.venue_p, &settlement_mapping.venue_k) {
                let leg_a_notional = result
                    .record
                    .leg_a
                    .as_ref()
                    .map(|ack| ack.avg_fill_price * ack.filled_qty)
                    .unwrap_or(0.0);
                self.pending_settlements.push(PendingSettlement {
                    execution_id: result.record.id.clone(),
                    interval_key: current,
                    market_p: p.slug.clone(),
                    market_k: k.market_ticker.clone(),
                    settles_at: current.end_ts * 1000,
                    expected_pnl: result.record.realized_pnl,
                    actual_cost: result.record.opportunity.cost,
                    qty: result.record.opportunity.qty,
                    leg_a_notional,
                    completed_at: None,
                });
            }
        }
        if result.should_trigger_kill_switch {
            self.risk_state.kill_switch_triggered = true;
        }

        Some(result)
    }

    /// Resolve every pending settlement whose `settles_at` has passed,
    /// fetching each venue's post-close outcome and folding any dead-zone
    /// correction into daily-loss tracking (§4.L). A settlement already
    /// priced in its full `expected_pnl` at execution time via
    /// `record_success`; only the delta from a disagreement needs applying.
    async fn process_due_settlements(&mut self, venue_p: &dyn VenueAdapter, venue_k: &dyn VenueAdapter, now_ts: i64) {
        let mut still_pending = Vec::new();
        let due: Vec<_> = self.pending_settlements.drain(..).collect();
        for mut pending in due {
            if !is_due(&pending, now_ts) {
                still_pending.push(pending);
                continue;
            }
            let outcomes = (venue_p.get_outcome(&pending.market_p).await, venue_k.get_outcome(&pending.market_k).await);
            match outcomes {
                (Ok(outcome_p), Ok(outcome_k)) => {
                    let result = resolve_settlement(&mut pending, outcome_p, outcome_k, now_ts);
                    if result.dead_zone_hit {
                        self.risk_state.daily_realized_pnl += result.realized_pnl - pending.expected_pnl;
                        warn!(execution_id = %pending.execution_id, correction = result.realized_pnl - pending.expected_pnl, "applied dead-zone settlement correction");
                    }
                    // The box this settlement closes out is no longer open
                    // exposure; free the leg-A notional execute_live reserved
                    // against `total_notional` for it.
                    self.risk_state.release_notional(pending.leg_a_notional);
                }
                _ => {
                    warn!(execution_id = %pending.execution_id, "outcome fetch failed, will retry settlement next tick");
                    still_pending.push(pending);
                }
            }
        }
        self.pending_settlements = still_pending;
    }

    /// Runs the position reconciler in-line with the tick loop rather than
    /// as a separate task, since this coordinator is the only thing holding
    /// the busy lock and risk state the reconciler needs. `reconcile_tick`
    /// itself no-ops (`ReconcileOutcome::Skipped`) while volatility
    /// liquidation is in progress or we're still within the post-execution
    /// grace period, so calling it unconditionally here is safe.
    #[allow(clippy::too_many_arguments)]
    async fn run_reconciliation(
        &mut self,
        mapping: &crate::arb::mapping::MarketMapping,
        quote_p: &crate::arb::quote::NormalizedQuote,
        quote_k: &crate::arb::quote::NormalizedQuote,
        venue_p: &dyn VenueAdapter,
        venue_k: &dyn VenueAdapter,
        cfg: &CoordinatorConfig,
        clock: &dyn Clock,
        now_ts: i64,
    ) {
        let (Some(p), Some(k)) = (&mapping.venue_p, &mapping.venue_k) else {
            return;
        };
        let volatility_active = matches!(self.volatility.state, VolState::SellingFirst | VolState::SellingSecond);
        let fee_estimate_per_leg =
            (cfg.execution.fees.venue_p.fee_for(0.5, 1.0) + cfg.execution.fees.venue_k.fee_for(0.5, 1.0)) / 2.0;

        let ctx = ReconcileContext {
            mapping: Some(mapping),
            volatility_active,
            in_grace_period: self.in_post_execution_grace(now_ts),
            quote_p,
            quote_k,
            fee_estimate_per_leg,
        };

        let outcome = reconcile_tick(
            ctx,
            &mut self.positions,
            venue_p,
            venue_k,
            &p.slug,
            &k.market_ticker,
            &self.busy_lock,
            &mut self.risk_state,
            clock,
        )
        .await;

        if !matches!(outcome, crate::arb::reconciler::ReconcileOutcome::Skipped | crate::arb::reconciler::ReconcileOutcome::Balanced) {
            info!(?outcome, "reconciler acted");
        }
    }

    /// Feeds the volatility manager's crossing/range trigger and, once
    /// armed, drives SELLING_FIRST / SELLING_SECOND against current bids.
    /// Both sells run under the busy lock so they never race a live
    /// `execute()` for the same venues.
    #[allow(clippy::too_many_arguments)]
    async fn run_volatility_step(
        &mut self,
        spot_price: f64,
        quote_p: &crate::arb::quote::NormalizedQuote,
        quote_k: &crate::arb::quote::NormalizedQuote,
        venue_p: &dyn VenueAdapter,
        venue_k: &dyn VenueAdapter,
        cfg: &CoordinatorConfig,
        ms_to_rollover: i64,
        now_ts: i64,
    ) {
        let has_open_positions = [(Venue::P, LegSide::Yes), (Venue::P, LegSide::No), (Venue::K, LegSide::Yes), (Venue::K, LegSide::No)]
            .iter()
            .any(|&(v, s)| self.positions.position_qty(v, s).unwrap_or(0.0) > 0.0);

        self.volatility
            .on_price_tick(spot_price, now_ts, has_open_positions, ms_to_rollover, &cfg.volatility);

        match self.volatility.state {
            VolState::SellingFirst => {
                let bids = [
                    (Venue::P, LegSide::Yes, quote_p.yes_bid.price),
                    (Venue::P, LegSide::No, quote_p.no_bid.price),
                    (Venue::K, LegSide::Yes, quote_k.yes_bid.price),
                    (Venue::K, LegSide::No, quote_k.no_bid.price),
                ];
                let targets = self.volatility.build_sell_targets(&self.positions, &bids);
                if !targets.is_empty() {
                    let lock = &self.busy_lock;
                    let vol = &mut self.volatility;
                    with_busy_lock(lock, vol.run_selling_first(targets, venue_p, venue_k, now_ts, &cfg.volatility)).await;
                }
            }
            VolState::SellingSecond => {
                if let Some(mut target) = self.volatility.remaining_target() {
                    target.current_bid = match (target.venue, target.side) {
                        (Venue::P, LegSide::Yes) => quote_p.yes_bid.price,
                        (Venue::P, LegSide::No) => quote_p.no_bid.price,
                        (Venue::K, LegSide::Yes) => quote_k.yes_bid.price,
                        (Venue::K, LegSide::No) => quote_k.no_bid.price,
                    };
                    let lock = &self.busy_lock;
                    let vol = &mut self.volatility;
                    with_busy_lock(lock, vol.run_selling_second(target, venue_p, venue_k, now_ts, &cfg.volatility)).await;
                }
            }
            _ => {}
        }
    }

    async fn ensure_mapping(
        &mut self,
        interval: crate::arb::interval::IntervalKey,
        discovery: &dyn DiscoverySource,
        now_ts: i64,
    ) {
        let needs_p = self.mappings.get(interval).map_or(true, |m| m.venue_p.is_none());
        let needs_k = self.mappings.get(interval).map_or(true, |m| m.venue_k.is_none());

        if needs_p {
            match discovery.discover_venue_p(interval).await {
                Ok(half) => self.mappings.set_p(interval, half, now_ts),
                Err(e) => warn!(error = %e, ?interval, "venue P discovery failed"),
            }
        }
        if needs_k {
            match discovery.discover_venue_k(interval).await {
                Ok(half) => self.mappings.set_k(interval, half, now_ts),
                Err(e) => warn!(error = %e, ?interval, "venue K discovery failed"),
            }
        }
    }

    /// At rollover: the volatility manager resets to IDLE, and the mapping
    /// for the departed interval is retained for `MAPPING_GRACE_SECS` so
    /// late-arriving fills can still resolve a `market_id`. The daily-loss
    /// counter that gates `check_guards` also resets here, the first time a
    /// rollover lands in a new UTC calendar day.
    fn on_rollover(&mut self, new_interval: crate::arb::interval::IntervalKey, now_ts: i64) {
        info!(?new_interval, "interval rollover");
        self.volatility.reset();
        self.current_tracked_interval = Some(new_interval);
        self.mappings.prune(now_ts - MAPPING_GRACE_SECS);

        let day = new_interval.start_ts.div_euclid(86_400);
        if self.current_day.is_some_and(|d| d != day) {
            info!(day, "new UTC day, resetting daily realized PnL");
            self.risk_state.reset_daily_pnl();
        }
        self.current_day = Some(day);
    }
}

impl Default for IntervalCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
