//! Authoritative local ledger of net positions, open orders, and fill
//! history. The execution engine, the reconciler's corrective-order path,
//! and the volatility manager's liquidation sells are the only writers.

use std::collections::{HashMap, VecDeque};

use crate::arb::edge::LegSide;
use crate::arb::interval::IntervalKey;
use crate::arb::quote::Venue;

pub const MAX_FILL_HISTORY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    Buy,
    Sell,
}

#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub order_id: String,
    pub client_order_id: String,
    pub venue: Venue,
    pub side: LegSide,
    pub action: OrderAction,
    pub price: f64,
    pub qty: f64,
    pub submit_ts: i64,
    pub interval_key: IntervalKey,
}

#[derive(Debug, Clone)]
pub struct Fill {
    pub order_id: String,
    pub client_order_id: String,
    pub venue: Venue,
    pub side: LegSide,
    pub action: OrderAction,
    pub price: f64,
    pub qty: f64,
    pub submit_ts: i64,
    pub interval_key: IntervalKey,
    pub fill_ts: i64,
    pub market_id: String,
}

#[derive(Debug, Clone, Copy, Default)]
struct Inventory {
    qty: f64,
    cost_basis: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct InventoryKey(Venue, LegSide);

#[derive(Debug, Default)]
pub struct PositionTracker {
    inventories: HashMap<InventoryKey, Inventory>,
    open_orders: Vec<OpenOrder>,
    fills: VecDeque<Fill>,
    last_market_id: HashMap<InventoryKey, String>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fill, updating the running VWAP cost basis. Buys extend the
    /// pool; sells reduce remaining quantity at the current pool average so
    /// the retained position's cost basis is preserved.
    pub fn record_fill(
        &mut self,
        venue: Venue,
        side: LegSide,
        action: OrderAction,
        qty: f64,
        price: f64,
        interval_key: IntervalKey,
        market_id: String,
        fill_ts: i64,
        order_id: String,
        client_order_id: String,
        submit_ts: i64,
    ) {
        let key = InventoryKey(venue, side);
        let inv = self.inventories.entry(key).or_default();

        match action {
            OrderAction::Buy => {
                let total_cost = inv.cost_basis * inv.qty + price * qty;
                inv.qty += qty;
                inv.cost_basis = if inv.qty > 0.0 { total_cost / inv.qty } else { 0.0 };
            }
            OrderAction::Sell => {
                inv.qty = (inv.qty - qty).max(0.0);
                if inv.qty == 0.0 {
                    inv.cost_basis = 0.0;
                }
                // cost_basis is unchanged for the remainder: VWAP of the
                // pool is preserved across sells.
            }
        }

        self.last_market_id.insert(key, market_id.clone());

        if self.fills.len() >= MAX_FILL_HISTORY {
            self.fills.pop_front();
        }
        self.fills.push_back(Fill {
            order_id,
            client_order_id,
            venue,
            side,
            action,
            price,
            qty,
            submit_ts,
            interval_key,
            fill_ts,
            market_id,
        });
    }

    /// A sell that unwinds a filled leg; semantically a `record_fill` with
    /// `action = Sell`, kept as a distinct entry point for callers that want
    /// to express intent (this is the execution engine's sole write path
    /// for unwinds).
    #[allow(clippy::too_many_arguments)]
    pub fn record_unwind(
        &mut self,
        venue: Venue,
        side: LegSide,
        qty: f64,
        price: f64,
        interval_key: IntervalKey,
        market_id: String,
        fill_ts: i64,
        order_id: String,
    ) {
        self.record_fill(
            venue,
            side,
            OrderAction::Sell,
            qty,
            price,
            interval_key,
            market_id,
            fill_ts,
            order_id.clone(),
            order_id,
            fill_ts,
        );
    }

    pub fn position_qty(&self, venue: Venue, side: LegSide) -> Option<f64> {
        let inv = self.inventories.get(&InventoryKey(venue, side))?;
        if inv.qty > 0.0 {
            Some(inv.qty)
        } else {
            None
        }
    }

    pub fn cost_basis(&self, venue: Venue, side: LegSide) -> Option<f64> {
        let inv = self.inventories.get(&InventoryKey(venue, side))?;
        if inv.qty > 0.0 {
            Some(inv.cost_basis)
        } else {
            None
        }
    }

    /// Force the local quantity for `(venue, side)` to the venue-reported
    /// truth. Used only by the reconciler; cost basis is left as-is since
    /// the venue report carries no price information.
    pub fn override_position(&mut self, venue: Venue, side: LegSide, qty: f64) {
        let inv = self.inventories.entry(InventoryKey(venue, side)).or_default();
        inv.qty = qty.max(0.0);
        if inv.qty == 0.0 {
            inv.cost_basis = 0.0;
        }
    }

    /// `Σ yes - Σ no` across both venues, the quantity `check_position_balance`
    /// watches.
    pub fn net_yes_minus_no(&self) -> f64 {
        let yes: f64 = [Venue::P, Venue::K]
            .iter()
            .filter_map(|&v| self.position_qty(v, LegSide::Yes))
            .sum();
        let no: f64 = [Venue::P, Venue::K]
            .iter()
            .filter_map(|&v| self.position_qty(v, LegSide::No))
            .sum();
        yes - no
    }

    pub fn last_market_id(&self, venue: Venue, side: LegSide) -> Option<&str> {
        self.last_market_id.get(&InventoryKey(venue, side)).map(String::as_str)
    }

    pub fn open_order(&mut self, order: OpenOrder) {
        self.open_orders.push(order);
    }

    pub fn remove_open_order(&mut self, client_order_id: &str) -> Option<OpenOrder> {
        let idx = self
            .open_orders
            .iter()
            .position(|o| o.client_order_id == client_order_id)?;
        Some(self.open_orders.remove(idx))
    }

    pub fn open_order_count(&self, venue: Venue) -> usize {
        self.open_orders.iter().filter(|o| o.venue == venue).count()
    }

    pub fn fills(&self) -> impl Iterator<Item = &Fill> {
        self.fills.iter()
    }
}
