//! Entry point for the box-arbitrage trading core. Wires venue adapters,
//! loads configuration, and drives the interval coordinator on a fixed
//! tick, the same "parse config, init tracing, loop" shape as the
//! grounding repo's `main.rs`.

use std::time::Duration;

use boxarb_engine::arb::config::EngineConfig;
use boxarb_engine::arb::coordinator::{DiscoverySource, IntervalCoordinator};
use boxarb_engine::arb::error::VenueError;
use boxarb_engine::arb::interval::{IntervalKey, SystemClock};
use boxarb_engine::arb::mapping::{VenueKHalf, VenuePHalf};
use boxarb_engine::arb::quote::Venue;
use boxarb_engine::arb::venue::{PaperVenueAdapter, PaperVenueConfig};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "boxarb-engine")]
struct Cli {
    /// Force dry-run regardless of ARB_DRY_RUN.
    #[arg(long)]
    dry_run: bool,

    /// Tick interval in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    tick_ms: u64,
}

/// Stub discovery used until the real venue-P/venue-K HTTP discovery
/// clients are wired in; slug/ticker templates are specified in the
/// external-interfaces section but the HTTP plumbing itself is out of
/// scope for the core.
struct UnimplementedDiscovery;

#[async_trait::async_trait]
impl DiscoverySource for UnimplementedDiscovery {
    async fn discover_venue_p(&self, _interval: IntervalKey) -> Result<VenuePHalf, VenueError> {
        Err(VenueError::transient("venue P discovery not wired up"))
    }

    async fn discover_venue_k(&self, _interval: IntervalKey) -> Result<VenueKHalf, VenueError> {
        Err(VenueError::transient("venue K discovery not wired up"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let engine_cfg = EngineConfig::from_env();
    let dry_run = cli.dry_run || engine_cfg.dry_run;
    let coordinator_cfg = engine_cfg.coordinator_config();

    info!(dry_run, client_tag = %engine_cfg.client_tag, "starting box-arbitrage engine");

    let mut coordinator = IntervalCoordinator::new();
    let discovery = UnimplementedDiscovery;
    let venue_p = PaperVenueAdapter::new(Venue::P, PaperVenueConfig::default());
    let venue_k = PaperVenueAdapter::new(Venue::K, PaperVenueConfig::default());
    let clock = SystemClock;

    // TODO: wire a real underlying price feed once one is available; until
    // then the volatility exit manager never arms (no crossings recorded).
    let spot_price = 0.0;

    let mut ticker = tokio::time::interval(Duration::from_millis(cli.tick_ms));
    loop {
        ticker.tick().await;
        if let Some(result) = coordinator
            .tick(&clock, &discovery, &venue_p, &venue_k, &coordinator_cfg, spot_price, dry_run)
            .await
        {
            info!(success = result.success, status = ?result.record.status, "execution attempt completed");
        }
    }
}
