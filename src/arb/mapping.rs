//! Maps each interval to venue-specific market identifiers; merges partial
//! discoveries rather than overwriting them.

use std::collections::BTreeMap;

use tracing::debug;

use crate::arb::interval::IntervalKey;

/// Tolerance within which two venues' reference prices are considered to
/// "agree" when verifying a mapping. Open Question in spec.md §9 — resolved
/// in DESIGN.md as 1 cent of probability, matching the venues' own price
/// tick size (Kalshi quotes in whole cents, Polymarket in 0.01 minimum tick).
pub const REFERENCE_PRICE_TOLERANCE: f64 = 0.01;

/// Mappings older than this are pruned on every write.
pub const MAPPING_MAX_AGE_SECS: i64 = 3600;

/// Mappings beyond this count are pruned (oldest first) on every write.
pub const MAPPING_MAX_RETAINED: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenuePHalf {
    pub up_token_id: String,
    pub down_token_id: String,
    pub slug: String,
    pub reference_price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueKHalf {
    pub event_ticker: String,
    pub market_ticker: String,
    pub series_ticker: String,
    pub reference_price: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct MarketMapping {
    pub interval_key: IntervalKey,
    pub venue_p: Option<VenuePHalf>,
    pub venue_k: Option<VenueKHalf>,
    pub discovered_at: i64,
}

impl MarketMapping {
    fn empty(interval_key: IntervalKey, now_ts: i64) -> Self {
        Self {
            interval_key,
            venue_p: None,
            venue_k: None,
            discovered_at: now_ts,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.venue_p.is_some() && self.venue_k.is_some()
    }

    /// A mapping is verified once both halves are present and reference
    /// prices (if parseable) agree within `REFERENCE_PRICE_TOLERANCE`.
    pub fn is_verified(&self) -> bool {
        let (Some(p), Some(k)) = (&self.venue_p, &self.venue_k) else {
            return false;
        };
        match (p.reference_price, k.reference_price) {
            (Some(rp), Some(rk)) => (rp - rk).abs() <= REFERENCE_PRICE_TOLERANCE,
            // If either side never parsed a reference price, we can't refute
            // agreement — completeness alone is all we can assert.
            _ => true,
        }
    }
}

/// Keyed by `IntervalKey`. Writers are discovery tasks that rarely race, so
/// a plain `BTreeMap` behind a caller-held lock is sufficient; no internal
/// synchronization is provided here.
#[derive(Debug, Default)]
pub struct MappingStore {
    mappings: BTreeMap<IntervalKey, MarketMapping>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_p(&mut self, interval_key: IntervalKey, half: VenuePHalf, now_ts: i64) {
        let entry = self
            .mappings
            .entry(interval_key)
            .or_insert_with(|| MarketMapping::empty(interval_key, now_ts));
        entry.venue_p = Some(half);
        debug!(?interval_key, "mapping: venue P half set");
        self.prune(now_ts);
    }

    pub fn set_k(&mut self, interval_key: IntervalKey, half: VenueKHalf, now_ts: i64) {
        let entry = self
            .mappings
            .entry(interval_key)
            .or_insert_with(|| MarketMapping::empty(interval_key, now_ts));
        entry.venue_k = Some(half);
        debug!(?interval_key, "mapping: venue K half set");
        self.prune(now_ts);
    }

    pub fn get(&self, interval_key: IntervalKey) -> Option<&MarketMapping> {
        self.mappings.get(&interval_key)
    }

    pub fn current(&self, clock: &dyn crate::arb::interval::Clock) -> Option<&MarketMapping> {
        self.get(crate::arb::interval::current_interval(clock))
    }

    pub fn next(&self, clock: &dyn crate::arb::interval::Clock) -> Option<&MarketMapping> {
        self.get(crate::arb::interval::next_interval(clock))
    }

    /// Drop mappings older than `older_than` seconds, then enforce the
    /// retained-count bound by dropping the oldest remaining entries.
    pub fn prune(&mut self, now_ts: i64) {
        self.mappings
            .retain(|_, m| now_ts - m.discovered_at <= MAPPING_MAX_AGE_SECS);

        while self.mappings.len() > MAPPING_MAX_RETAINED {
            let oldest_key = *self
                .mappings
                .iter()
                .min_by_key(|(_, m)| m.discovered_at)
                .map(|(k, _)| k)
                .expect("non-empty");
            self.mappings.remove(&oldest_key);
        }
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: i64) -> IntervalKey {
        IntervalKey {
            start_ts: n * 900,
            end_ts: n * 900 + 900,
        }
    }

    #[test]
    fn merge_is_commutative_on_disjoint_halves() {
        let mut a = MappingStore::new();
        a.set_p(
            key(1),
            VenuePHalf {
                up_token_id: "up".into(),
                down_token_id: "down".into(),
                slug: "btc-updown-15m-900".into(),
                reference_price: Some(0.50),
            },
            0,
        );
        a.set_k(
            key(1),
            VenueKHalf {
                event_ticker: "KXBTC-1".into(),
                market_ticker: "KXBTC-1-UP".into(),
                series_ticker: "KXBTC".into(),
                reference_price: Some(0.50),
            },
            0,
        );

        let mut b = MappingStore::new();
        b.set_k(
            key(1),
            VenueKHalf {
                event_ticker: "KXBTC-1".into(),
                market_ticker: "KXBTC-1-UP".into(),
                series_ticker: "KXBTC".into(),
                reference_price: Some(0.50),
            },
            0,
        );
        b.set_p(
            key(1),
            VenuePHalf {
                up_token_id: "up".into(),
                down_token_id: "down".into(),
                slug: "btc-updown-15m-900".into(),
                reference_price: Some(0.50),
            },
            0,
        );

        let ma = a.get(key(1)).unwrap();
        let mb = b.get(key(1)).unwrap();
        assert_eq!(ma.venue_p, mb.venue_p);
        assert_eq!(ma.venue_k, mb.venue_k);
        assert!(ma.is_verified());
        assert!(mb.is_verified());
    }

    #[test]
    fn incomplete_mapping_is_not_verified() {
        let mut store = MappingStore::new();
        store.set_p(
            key(1),
            VenuePHalf {
                up_token_id: "up".into(),
                down_token_id: "down".into(),
                slug: "btc-updown-15m-900".into(),
                reference_price: None,
            },
            0,
        );
        let m = store.get(key(1)).unwrap();
        assert!(!m.is_complete());
        assert!(!m.is_verified());
    }

    #[test]
    fn disagreeing_reference_prices_fail_verification() {
        let mut store = MappingStore::new();
        store.set_p(
            key(1),
            VenuePHalf {
                up_token_id: "up".into(),
                down_token_id: "down".into(),
                slug: "btc-updown-15m-900".into(),
                reference_price: Some(0.40),
            },
            0,
        );
        store.set_k(
            key(1),
            VenueKHalf {
                event_ticker: "e".into(),
                market_ticker: "m".into(),
                series_ticker: "s".into(),
                reference_price: Some(0.60),
            },
            0,
        );
        assert!(!store.get(key(1)).unwrap().is_verified());
    }

    #[test]
    fn prune_respects_max_age_and_retained_count() {
        let mut store = MappingStore::new();
        for i in 0..15 {
            store.set_p(
                key(i),
                VenuePHalf {
                    up_token_id: "up".into(),
                    down_token_id: "down".into(),
                    slug: "s".into(),
                    reference_price: None,
                },
                i, // discovered_at increases with i
            );
        }
        assert!(store.len() <= MAPPING_MAX_RETAINED);

        store.prune(10_000);
        assert!(store.is_empty());
    }
}
