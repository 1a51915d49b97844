//! Streaming top-of-book normalization and staleness tracking.
//!
//! Consumers see at most one in-flight update per venue at a time but may be
//! interleaved across venues; the aggregator itself runs as a single task
//! reading a channel of `QuoteUpdate`s, the same actor shape as the
//! grounding repo's `PolymarketMarketWsCache`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};

use crate::arb::interval::IntervalKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Venue {
    P,
    K,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::P => "P",
            Venue::K => "K",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BookSide {
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedQuote {
    pub yes_bid: BookSide,
    pub yes_ask: BookSide,
    pub no_bid: BookSide,
    pub no_ask: BookSide,
    pub ts_exchange: i64,
    pub ts_local: i64,
}

impl NormalizedQuote {
    /// A quote is valid if at least one side has a positive size.
    pub fn is_valid(&self) -> bool {
        [self.yes_bid, self.yes_ask, self.no_bid, self.no_ask]
            .iter()
            .any(|side| side.size > 0.0)
    }

    /// Crossed (`bid >= ask`) is a diagnostic, not an automatic exclusion.
    pub fn is_crossed(&self) -> bool {
        (self.yes_bid.size > 0.0 && self.yes_ask.size > 0.0 && self.yes_bid.price >= self.yes_ask.price)
            || (self.no_bid.size > 0.0 && self.no_ask.size > 0.0 && self.no_bid.price >= self.no_ask.price)
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.ts_local).max(0)
    }
}

#[derive(Debug, Clone)]
pub struct QuoteUpdate {
    pub venue: Venue,
    pub interval_key: IntervalKey,
    pub quote: NormalizedQuote,
}

/// Subscriptions idle for longer than this are treated as stale and the
/// aggregator resubscribes, even though the connection is nominally open.
pub const STALE_SUBSCRIPTION_MS: i64 = 30_000;

/// Maintains the current per-venue quote and republishes `QuoteUpdate`s
/// received from venue adapters.
#[derive(Debug, Default)]
pub struct QuoteAggregator {
    current_p: Option<NormalizedQuote>,
    current_k: Option<NormalizedQuote>,
    last_update_ms_p: i64,
    last_update_ms_k: i64,
}

impl QuoteAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, update: QuoteUpdate, now_ms: i64) {
        match update.venue {
            Venue::P => {
                self.current_p = Some(update.quote);
                self.last_update_ms_p = now_ms;
            }
            Venue::K => {
                self.current_k = Some(update.quote);
                self.last_update_ms_k = now_ms;
            }
        }
    }

    pub fn current_p(&self) -> Option<&NormalizedQuote> {
        self.current_p.as_ref()
    }

    pub fn current_k(&self) -> Option<&NormalizedQuote> {
        self.current_k.as_ref()
    }

    /// A venue's subscription is stale if the aggregator received no update
    /// for it within `STALE_SUBSCRIPTION_MS`, or never received one at all
    /// (treated as stale from the moment the aggregator started).
    pub fn is_stale(&self, venue: Venue, now_ms: i64) -> bool {
        let last = match venue {
            Venue::P => self.last_update_ms_p,
            Venue::K => self.last_update_ms_k,
        };
        now_ms - last > STALE_SUBSCRIPTION_MS
    }
}

/// Run the aggregator as a background task consuming `QuoteUpdate`s off
/// `rx`, applying them to `agg`, and logging a resubscribe need on
/// staleness. The actual resubscribe action is delegated to `on_stale`
/// since the concrete venue session type lives outside the core.
pub async fn run_quote_aggregator_task(
    mut rx: mpsc::Receiver<QuoteUpdate>,
    agg: &mut QuoteAggregator,
    now_ms: impl Fn() -> i64,
    mut on_stale: impl FnMut(Venue),
) {
    let mut staleness_check = interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            maybe_update = rx.recv() => {
                match maybe_update {
                    Some(update) => {
                        let venue = update.venue;
                        agg.apply(update, now_ms());
                        info!(venue = venue.as_str(), "quote update applied");
                    }
                    None => return,
                }
            }
            _ = staleness_check.tick() => {
                let ts = now_ms();
                for venue in [Venue::P, Venue::K] {
                    if agg.is_stale(venue, ts) {
                        warn!(venue = venue.as_str(), "quote subscription stale, resubscribing");
                        on_stale(venue);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(yes_ask: f64, no_ask: f64, ts: i64) -> NormalizedQuote {
        NormalizedQuote {
            yes_bid: BookSide { price: yes_ask - 0.02, size: 100.0 },
            yes_ask: BookSide { price: yes_ask, size: 100.0 },
            no_bid: BookSide { price: no_ask - 0.02, size: 100.0 },
            no_ask: BookSide { price: no_ask, size: 100.0 },
            ts_exchange: ts,
            ts_local: ts,
        }
    }

    #[test]
    fn valid_requires_some_positive_size() {
        let q = NormalizedQuote::default();
        assert!(!q.is_valid());
        assert!(quote(0.5, 0.5, 0).is_valid());
    }

    #[test]
    fn crossed_is_diagnostic_not_exclusion() {
        let mut q = quote(0.5, 0.5, 0);
        q.yes_bid.price = 0.6; // bid >= ask
        assert!(q.is_crossed());
        // still "valid" - crossed quotes are not automatically thrown away
        assert!(q.is_valid());
    }

    #[test]
    fn aggregator_tracks_staleness_per_venue() {
        let mut agg = QuoteAggregator::new();
        agg.apply(
            QuoteUpdate {
                venue: Venue::P,
                interval_key: IntervalKey { start_ts: 0, end_ts: 900 },
                quote: quote(0.5, 0.5, 0),
            },
            1_000,
        );
        assert!(!agg.is_stale(Venue::P, 1_000 + STALE_SUBSCRIPTION_MS - 1));
        assert!(agg.is_stale(Venue::P, 1_000 + STALE_SUBSCRIPTION_MS + 1));
        // K was never updated: stale relative to any "now" far from zero.
        assert!(agg.is_stale(Venue::K, 1_000 + STALE_SUBSCRIPTION_MS + 1));
    }
}
