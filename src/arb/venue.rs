//! Venue order-submission and account-query boundary. Wire framing,
//! EIP-712/RSA-PSS signing, and reconnect logic live outside the core (§6 of
//! the design — those are external collaborators); this module only defines
//! the trait the execution engine, reconciler, and volatility manager code
//! against, plus a paper adapter for dry-run and test use, mirroring the
//! grounding repo's `ExecutionAdapter` / `PaperExecutionAdapter` split.

use async_trait::async_trait;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand::SeedableRng;

use crate::arb::edge::LegSide;
use crate::arb::error::VenueError;
use crate::arb::planner::{LegParams, TimeInForce};
use crate::arb::quote::Venue;
use crate::arb::settlement::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Filled,
    PartiallyFilled,
    Unfilled,
    Canceled,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
    pub client_order_id: String,
    pub status: OrderStatus,
    pub filled_qty: f64,
    pub avg_fill_price: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct AccountPosition {
    pub yes_qty: f64,
    pub no_qty: f64,
}

/// One side of the venue boundary. Each venue adapter implements this for
/// its own market; the execution engine is generic over `dyn VenueAdapter`.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> Venue;

    async fn place_order(&self, params: &LegParams) -> Result<OrderAck, VenueError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError>;

    async fn get_order_status(&self, order_id: &str) -> Result<OrderAck, VenueError>;

    async fn get_position(&self, market_id: &str) -> Result<AccountPosition, VenueError>;

    /// Submit a standalone sell of `qty` at-or-better than `limit_price`,
    /// used by unwind, reconciler corrective sells, and volatility exits.
    async fn sell(
        &self,
        market_id: &str,
        side: LegSide,
        qty: f64,
        limit_price: f64,
        tif: TimeInForce,
    ) -> Result<OrderAck, VenueError>;

    /// Post-close resolved outcome for a market, used by the settlement
    /// resolver once `settles_at` has passed.
    async fn get_outcome(&self, market_id: &str) -> Result<Outcome, VenueError>;
}

/// Deterministic (seeded) simulated fill model: fills at the quoted price
/// with a small slippage draw, subject to a configurable fill probability.
/// Grounded in the teacher's `PaperExecutionAdapter`'s use of `StdRng` to
/// simulate latency/slippage/partial-fill/rejection without touching a
/// real venue.
pub struct PaperVenueConfig {
    pub fill_probability: f64,
    pub slippage_bps: f64,
    pub seed: u64,
}

impl Default for PaperVenueConfig {
    fn default() -> Self {
        Self {
            fill_probability: 1.0,
            slippage_bps: 0.0,
            seed: 42,
        }
    }
}

pub struct PaperVenueAdapter {
    venue: Venue,
    cfg: PaperVenueConfig,
    rng: parking_lot::Mutex<ChaCha8Rng>,
}

impl PaperVenueAdapter {
    pub fn new(venue: Venue, cfg: PaperVenueConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        Self {
            venue,
            cfg,
            rng: parking_lot::Mutex::new(rng),
        }
    }

    fn simulate_fill(&self, price: f64, qty: f64, client_order_id: &str) -> OrderAck {
        let mut rng = self.rng.lock();
        let filled: bool = rng.gen_bool(self.cfg.fill_probability.clamp(0.0, 1.0));
        let slip_draw: f64 = rng.gen_range(-1.0..=1.0) * (self.cfg.slippage_bps / 10_000.0);
        let fill_price = (price * (1.0 + slip_draw)).clamp(0.01, 0.99);

        if filled {
            OrderAck {
                order_id: format!("paper-{client_order_id}"),
                client_order_id: client_order_id.to_string(),
                status: OrderStatus::Filled,
                filled_qty: qty,
                avg_fill_price: fill_price,
            }
        } else {
            OrderAck {
                order_id: format!("paper-{client_order_id}"),
                client_order_id: client_order_id.to_string(),
                status: OrderStatus::Unfilled,
                filled_qty: 0.0,
                avg_fill_price: 0.0,
            }
        }
    }
}

#[async_trait]
impl VenueAdapter for PaperVenueAdapter {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn place_order(&self, params: &LegParams) -> Result<OrderAck, VenueError> {
        Ok(self.simulate_fill(params.price, params.qty, &params.client_order_id))
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), VenueError> {
        Ok(())
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderAck, VenueError> {
        Ok(OrderAck {
            order_id: order_id.to_string(),
            client_order_id: String::new(),
            status: OrderStatus::Unknown,
            filled_qty: 0.0,
            avg_fill_price: 0.0,
        })
    }

    async fn get_position(&self, _market_id: &str) -> Result<AccountPosition, VenueError> {
        Ok(AccountPosition { yes_qty: 0.0, no_qty: 0.0 })
    }

    async fn sell(
        &self,
        _market_id: &str,
        _side: LegSide,
        qty: f64,
        limit_price: f64,
        _tif: TimeInForce,
    ) -> Result<OrderAck, VenueError> {
        Ok(self.simulate_fill(limit_price, qty, &format!("sell-{limit_price}-{qty}")))
    }

    async fn get_outcome(&self, _market_id: &str) -> Result<Outcome, VenueError> {
        let mut rng = self.rng.lock();
        Ok(if rng.gen_bool(0.5) { Outcome::Up } else { Outcome::Down })
    }
}

/// Shape of a real venue integration: holds the endpoint/credentials a
/// production deployment would set, but does not implement wire framing or
/// request signing (§6, out of scope for the core). Mirrors the grounding
/// repo's `DomeExecutionAdapter` — a credential-gated stub that fails
/// every call until the real HTTP client is filled in.
pub struct LiveVenueAdapter {
    pub venue: Venue,
    pub base_url: String,
    pub api_key: String,
}

impl LiveVenueAdapter {
    /// Reads `ARB_{P,K}_BASE_URL` / `ARB_{P,K}_API_KEY`; returns `None` if
    /// either is unset so callers fall back to the paper adapter.
    pub fn from_env(venue: Venue) -> Option<Self> {
        let prefix = match venue {
            Venue::P => "ARB_P",
            Venue::K => "ARB_K",
        };
        let base_url = std::env::var(format!("{prefix}_BASE_URL")).ok()?;
        let api_key = std::env::var(format!("{prefix}_API_KEY")).ok()?;
        if base_url.trim().is_empty() || api_key.trim().is_empty() {
            return None;
        }
        Some(Self { venue, base_url, api_key })
    }
}

#[async_trait]
impl VenueAdapter for LiveVenueAdapter {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn place_order(&self, _params: &LegParams) -> Result<OrderAck, VenueError> {
        Err(VenueError::transient("live venue order submission not wired up"))
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), VenueError> {
        Err(VenueError::transient("live venue cancel not wired up"))
    }

    async fn get_order_status(&self, _order_id: &str) -> Result<OrderAck, VenueError> {
        Err(VenueError::transient("live venue order status not wired up"))
    }

    async fn get_position(&self, _market_id: &str) -> Result<AccountPosition, VenueError> {
        Err(VenueError::transient("live venue position query not wired up"))
    }

    async fn sell(
        &self,
        _market_id: &str,
        _side: LegSide,
        _qty: f64,
        _limit_price: f64,
        _tif: TimeInForce,
    ) -> Result<OrderAck, VenueError> {
        Err(VenueError::transient("live venue sell not wired up"))
    }

    async fn get_outcome(&self, _market_id: &str) -> Result<Outcome, VenueError> {
        Err(VenueError::transient("live venue outcome query not wired up"))
    }
}
