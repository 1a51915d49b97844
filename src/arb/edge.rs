//! Pure edge computation over a pair of normalized quotes. No I/O, no
//! retained state — every call is a fresh evaluation of both box
//! orientations, keeping the higher-`edge_net` one.

use serde::{Deserialize, Serialize};

use crate::arb::interval::IntervalKey;
use crate::arb::quote::NormalizedQuote;

/// Per-venue fee schedule. `FixedBps` charges a flat basis-point rate on
/// notional; `PerContract` charges a flat cents-per-contract amount,
/// matching the two fee shapes observed across venue fee docs in the wild
/// (percentage-of-notional vs. flat-per-contract).
#[derive(Debug, Clone, Copy)]
pub enum FeeSchedule {
    FixedBps { bps: f64 },
    PerContract { cents: f64 },
}

impl FeeSchedule {
    pub fn fee_for(&self, price: f64, qty: f64) -> f64 {
        match self {
            FeeSchedule::FixedBps { bps } => price * qty * (bps / 10_000.0),
            FeeSchedule::PerContract { cents } => (cents / 100.0) * qty,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeeConfig {
    pub venue_p: FeeSchedule,
    pub venue_k: FeeSchedule,
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeConfig {
    pub fees: FeeConfig,
    pub slippage_buffer: f64,
    pub min_edge_net: f64,
    pub max_trade_qty: f64,
    pub remaining_notional_headroom: f64,
    /// Venue P's minimum notional floor, as a function of price: qty must
    /// be at least this to clear the venue's minimum order size.
    pub min_qty_p_floor_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// YES leg on venue P, NO leg on venue K.
    PYesKNo,
    /// YES leg on venue K, NO leg on venue P.
    KYesPNo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegVenue {
    P,
    K,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegSide {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy)]
pub struct ArbLeg {
    pub venue: LegVenue,
    pub side: LegSide,
    pub price: f64,
    pub available_size: f64,
}

#[derive(Debug, Clone)]
pub struct Opportunity {
    pub interval_key: IntervalKey,
    pub timestamp: i64,
    pub legs: (ArbLeg, ArbLeg),
    pub cost: f64,
    pub edge_gross: f64,
    pub edge_net: f64,
    pub qty: f64,
    pub orientation: Orientation,
    pub reason: String,
}

pub fn min_qty_p(price: f64, min_notional_usd: f64) -> f64 {
    if price <= 0.0 {
        return f64::INFINITY;
    }
    min_notional_usd / price
}

/// Evaluate both box orientations and return the one with the higher
/// `edge_net`, or `None` if neither clears the bar. Rejects a box if either
/// leg has zero size, if either leg's price is outside `[0.01, 0.99]`, or if
/// `edge_net < min_edge_net`.
pub fn detect_opportunity(
    quote_p: &NormalizedQuote,
    quote_k: &NormalizedQuote,
    interval_key: IntervalKey,
    timestamp: i64,
    cfg: &EdgeConfig,
) -> Option<Opportunity> {
    let p_yes_k_no = evaluate_orientation(
        Orientation::PYesKNo,
        ArbLeg {
            venue: LegVenue::P,
            side: LegSide::Yes,
            price: quote_p.yes_ask.price,
            available_size: quote_p.yes_ask.size,
        },
        ArbLeg {
            venue: LegVenue::K,
            side: LegSide::No,
            price: quote_k.no_ask.price,
            available_size: quote_k.no_ask.size,
        },
        interval_key,
        timestamp,
        cfg,
    );

    let k_yes_p_no = evaluate_orientation(
        Orientation::KYesPNo,
        ArbLeg {
            venue: LegVenue::K,
            side: LegSide::Yes,
            price: quote_k.yes_ask.price,
            available_size: quote_k.yes_ask.size,
        },
        ArbLeg {
            venue: LegVenue::P,
            side: LegSide::No,
            price: quote_p.no_ask.price,
            available_size: quote_p.no_ask.size,
        },
        interval_key,
        timestamp,
        cfg,
    );

    match (p_yes_k_no, k_yes_p_no) {
        (Some(a), Some(b)) => Some(if a.edge_net >= b.edge_net { a } else { b }),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn evaluate_orientation(
    orientation: Orientation,
    leg_yes: ArbLeg,
    leg_no: ArbLeg,
    interval_key: IntervalKey,
    timestamp: i64,
    cfg: &EdgeConfig,
) -> Option<Opportunity> {
    if leg_yes.available_size <= 0.0 || leg_no.available_size <= 0.0 {
        return None;
    }
    if !(0.01..=0.99).contains(&leg_yes.price) || !(0.01..=0.99).contains(&leg_no.price) {
        return None;
    }

    let cost = leg_yes.price + leg_no.price;
    let edge_gross = 1.0 - cost;

    let fee_p = match leg_yes.venue {
        LegVenue::P => cfg.fees.venue_p.fee_for(leg_yes.price, 1.0),
        LegVenue::K => cfg.fees.venue_k.fee_for(leg_yes.price, 1.0),
    };
    let fee_k = match leg_no.venue {
        LegVenue::P => cfg.fees.venue_p.fee_for(leg_no.price, 1.0),
        LegVenue::K => cfg.fees.venue_k.fee_for(leg_no.price, 1.0),
    };
    let fee_estimate = fee_p + fee_k;

    let edge_net = edge_gross - fee_estimate - cfg.slippage_buffer;
    if edge_net < cfg.min_edge_net {
        return None;
    }

    let p_leg_price = if leg_yes.venue == LegVenue::P { leg_yes.price } else { leg_no.price };
    let min_qty = min_qty_p(p_leg_price, cfg.min_qty_p_floor_usd);

    let qty = [
        leg_yes.available_size,
        leg_no.available_size,
        if cost > 0.0 { cfg.remaining_notional_headroom / cost } else { f64::INFINITY },
        cfg.max_trade_qty,
    ]
    .into_iter()
    .fold(f64::INFINITY, f64::min);

    if qty <= 0.0 || qty < min_qty {
        return None;
    }

    Some(Opportunity {
        interval_key,
        timestamp,
        legs: (leg_yes, leg_no),
        cost,
        edge_gross,
        edge_net,
        qty,
        orientation,
        reason: format!("edge_net={edge_net:.4} >= floor={:.4}", cfg.min_edge_net),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(yes_ask: f64, no_ask: f64, size: f64) -> NormalizedQuote {
        use crate::arb::quote::BookSide;
        NormalizedQuote {
            yes_bid: BookSide { price: yes_ask - 0.01, size },
            yes_ask: BookSide { price: yes_ask, size },
            no_bid: BookSide { price: no_ask - 0.01, size },
            no_ask: BookSide { price: no_ask, size },
            ts_exchange: 0,
            ts_local: 0,
        }
    }

    fn cfg() -> EdgeConfig {
        EdgeConfig {
            fees: FeeConfig {
                venue_p: FeeSchedule::FixedBps { bps: 0.0 },
                venue_k: FeeSchedule::FixedBps { bps: 0.0 },
            },
            slippage_buffer: 0.005,
            min_edge_net: 0.01,
            max_trade_qty: 1000.0,
            remaining_notional_headroom: 10_000.0,
            min_qty_p_floor_usd: 1.0,
        }
    }

    #[test]
    fn clean_arb_scenario_1() {
        // P yes_ask=0.46, K no_ask=0.52, fees+slippage=0.005
        let quote_p = quote(0.46, 0.99, 50.0);
        let quote_k = quote(0.99, 0.52, 50.0);
        let opp = detect_opportunity(
            &quote_p,
            &quote_k,
            IntervalKey { start_ts: 0, end_ts: 900 },
            1,
            &cfg(),
        )
        .expect("opportunity expected");

        assert!((opp.cost - 0.98).abs() < 1e-9);
        assert!((opp.edge_gross - 0.02).abs() < 1e-9);
        assert!((opp.edge_net - 0.015).abs() < 1e-9);
        assert_eq!(opp.orientation, Orientation::PYesKNo);
    }

    #[test]
    fn edge_consistency_invariant() {
        let quote_p = quote(0.40, 0.99, 50.0);
        let quote_k = quote(0.99, 0.50, 50.0);
        let opp = detect_opportunity(
            &quote_p,
            &quote_k,
            IntervalKey { start_ts: 0, end_ts: 900 },
            1,
            &cfg(),
        )
        .unwrap();
        let (leg0, leg1) = opp.legs;
        assert!((opp.cost - (leg0.price + leg1.price)).abs() < 1e-9);
        assert!((opp.edge_gross - (1.0 - opp.cost)).abs() < 1e-9);
        assert!(opp.edge_net <= opp.edge_gross);
        assert!(opp.edge_net >= cfg().min_edge_net);
    }

    #[test]
    fn rejects_below_floor_edge() {
        let quote_p = quote(0.50, 0.99, 50.0);
        let quote_k = quote(0.99, 0.495, 50.0); // cost=0.995, gross=0.005 < floor
        assert!(detect_opportunity(
            &quote_p,
            &quote_k,
            IntervalKey { start_ts: 0, end_ts: 900 },
            1,
            &cfg(),
        )
        .is_none());
    }

    #[test]
    fn boundary_prices_accepted_and_rejected() {
        let mut c = cfg();
        c.slippage_buffer = 0.0;
        c.min_edge_net = -1.0; // allow any edge through for this boundary check

        // 0.01 / 0.01 accepted (cost 0.02, huge edge, but price bounds pass)
        let quote_p = quote(0.01, 0.99, 50.0);
        let quote_k = quote(0.99, 0.01, 50.0);
        assert!(detect_opportunity(
            &quote_p,
            &quote_k,
            IntervalKey { start_ts: 0, end_ts: 900 },
            1,
            &c,
        )
        .is_some());

        // 0.00 rejected
        let quote_p_zero = quote(0.0, 0.99, 50.0);
        assert!(detect_opportunity(
            &quote_p_zero,
            &quote_k,
            IntervalKey { start_ts: 0, end_ts: 900 },
            1,
            &c,
        )
        .is_none());
    }

    #[test]
    fn zero_size_leg_rejected() {
        let quote_p = quote(0.46, 0.99, 0.0);
        let quote_k = quote(0.99, 0.52, 50.0);
        assert!(detect_opportunity(
            &quote_p,
            &quote_k,
            IntervalKey { start_ts: 0, end_ts: 900 },
            1,
            &cfg(),
        )
        .is_none());
    }

    #[test]
    fn qty_capped_by_notional_headroom() {
        let mut c = cfg();
        c.remaining_notional_headroom = 10.0; // cost ~0.98 => qty <= ~10.2
        let quote_p = quote(0.46, 0.99, 1000.0);
        let quote_k = quote(0.99, 0.52, 1000.0);
        let opp = detect_opportunity(
            &quote_p,
            &quote_k,
            IntervalKey { start_ts: 0, end_ts: 900 },
            1,
            &c,
        )
        .unwrap();
        assert!(opp.qty <= 10.0 / opp.cost + 1e-9);
    }
}
