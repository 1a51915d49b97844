//! Runtime configuration, loaded from environment variables with sane
//! defaults — the same `dotenv` + `env::var(...).unwrap_or_else(...)` shape
//! the grounding repo's `Config::from_env` uses.

use std::env;

use crate::arb::coordinator::CoordinatorConfig;
use crate::arb::edge::{EdgeConfig, FeeConfig, FeeSchedule};
use crate::arb::execution::ExecutionConfig;
use crate::arb::risk::RiskConfig;
use crate::arb::volatility::VolatilityConfig;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub client_tag: String,
    pub dry_run: bool,
    pub min_edge_net: f64,
    pub max_trade_qty: f64,
    pub remaining_notional_headroom: f64,
    pub min_qty_p_floor_usd: f64,
    pub slippage_buffer: f64,
    pub venue_p_fee_bps: f64,
    pub venue_k_fee_bps: f64,
    pub daily_loss_cap: f64,
    pub max_open_notional: f64,
    pub cooldown_secs: i64,
    pub consecutive_failure_threshold: u32,
    pub max_open_orders_per_venue: usize,
    pub rollover_guard_ms: i64,
    pub max_stale_quote_ms: i64,
    pub position_imbalance_tolerance: f64,
    pub leg_order_timeout_ms: u64,
    pub min_partial_fill_qty: f64,
    pub unwind_retry_attempts: u32,
    pub volatility_active_window_ms: i64,
    pub volatility_min_crossings: u32,
    pub volatility_range_threshold_usd: f64,
    pub volatility_failed_trigger_cooldown_ms: i64,
    pub volatility_halt_window_ms: i64,
    pub volatility_second_sell_timeout_ms: i64,
    pub volatility_second_sell_min_profitability: f64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Loads `.env` (if present) and falls back to hardcoded defaults for
    /// anything unset — mirrors the grounding repo's `Config::from_env`.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            client_tag: env::var("ARB_CLIENT_TAG").unwrap_or_else(|_| "boxbot".to_string()),
            dry_run: env_or("ARB_DRY_RUN", true),
            min_edge_net: env_or("ARB_MIN_EDGE_NET", 0.01),
            max_trade_qty: env_or("ARB_MAX_TRADE_QTY", 200.0),
            remaining_notional_headroom: env_or("ARB_NOTIONAL_HEADROOM", 5_000.0),
            min_qty_p_floor_usd: env_or("ARB_MIN_QTY_P_FLOOR_USD", 1.0),
            slippage_buffer: env_or("ARB_SLIPPAGE_BUFFER", 0.005),
            venue_p_fee_bps: env_or("ARB_VENUE_P_FEE_BPS", 200.0),
            venue_k_fee_bps: env_or("ARB_VENUE_K_FEE_BPS", 700.0),
            daily_loss_cap: env_or("ARB_DAILY_LOSS_CAP", 100.0),
            max_open_notional: env_or("ARB_MAX_OPEN_NOTIONAL", 2_000.0),
            cooldown_secs: env_or("ARB_COOLDOWN_SECS", 60),
            consecutive_failure_threshold: env_or("ARB_CONSECUTIVE_FAILURE_THRESHOLD", 3),
            max_open_orders_per_venue: env_or("ARB_MAX_OPEN_ORDERS_PER_VENUE", 5),
            rollover_guard_ms: env_or("ARB_ROLLOVER_GUARD_MS", 3_000),
            max_stale_quote_ms: env_or("ARB_MAX_STALE_QUOTE_MS", 5_000),
            position_imbalance_tolerance: env_or("ARB_POSITION_IMBALANCE_TOLERANCE", 1.0),
            leg_order_timeout_ms: env_or("ARB_LEG_ORDER_TIMEOUT_MS", 4_000),
            min_partial_fill_qty: env_or("ARB_MIN_PARTIAL_FILL_QTY", 1.0),
            unwind_retry_attempts: env_or("ARB_UNWIND_RETRY_ATTEMPTS", 2),
            volatility_active_window_ms: env_or("ARB_VOL_ACTIVE_WINDOW_MS", 450_000),
            volatility_min_crossings: env_or("ARB_VOL_MIN_CROSSINGS", 2),
            volatility_range_threshold_usd: env_or("ARB_VOL_RANGE_THRESHOLD_USD", 100.0),
            volatility_failed_trigger_cooldown_ms: env_or("ARB_VOL_FAILED_COOLDOWN_MS", 60_000),
            volatility_halt_window_ms: env_or("ARB_VOL_HALT_WINDOW_MS", 60_000),
            volatility_second_sell_timeout_ms: env_or("ARB_VOL_SECOND_SELL_TIMEOUT_MS", 30_000),
            volatility_second_sell_min_profitability: env_or("ARB_VOL_SECOND_SELL_MIN_PROFIT", 0.03),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            edge: EdgeConfig {
                fees: FeeConfig {
                    venue_p: FeeSchedule::FixedBps { bps: self.venue_p_fee_bps },
                    venue_k: FeeSchedule::FixedBps { bps: self.venue_k_fee_bps },
                },
                slippage_buffer: self.slippage_buffer,
                min_edge_net: self.min_edge_net,
                max_trade_qty: self.max_trade_qty,
                remaining_notional_headroom: self.remaining_notional_headroom,
                min_qty_p_floor_usd: self.min_qty_p_floor_usd,
            },
            risk: RiskConfig {
                daily_loss_cap: self.daily_loss_cap,
                max_open_notional: self.max_open_notional,
                cooldown_secs: self.cooldown_secs,
                consecutive_failure_threshold: self.consecutive_failure_threshold,
                max_open_orders_per_venue: self.max_open_orders_per_venue,
                rollover_guard_ms: self.rollover_guard_ms,
                max_stale_quote_ms: self.max_stale_quote_ms,
                position_imbalance_tolerance: self.position_imbalance_tolerance,
            },
            execution: ExecutionConfig {
                leg_order_timeout_ms: self.leg_order_timeout_ms,
                min_partial_fill_qty: self.min_partial_fill_qty,
                unwind_retry_attempts: self.unwind_retry_attempts,
                fees: FeeConfig {
                    venue_p: FeeSchedule::FixedBps { bps: self.venue_p_fee_bps },
                    venue_k: FeeSchedule::FixedBps { bps: self.venue_k_fee_bps },
                },
            },
            volatility: VolatilityConfig {
                active_window_ms: self.volatility_active_window_ms,
                min_crossings: self.volatility_min_crossings,
                range_threshold_usd: self.volatility_range_threshold_usd,
                failed_trigger_cooldown_ms: self.volatility_failed_trigger_cooldown_ms,
                halt_window_ms: self.volatility_halt_window_ms,
                second_sell_timeout_ms: self.volatility_second_sell_timeout_ms,
                second_sell_min_profitability: self.volatility_second_sell_min_profitability,
            },
            client_tag: self.client_tag.clone(),
        }
    }
}
