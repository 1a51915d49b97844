//! Turns a detected `Opportunity` into concrete leg order parameters. Venue
//! P is always leg A: its CLOB is the one with IOC semantics and the one we
//! can cancel cleanly if leg B never fills, so it always goes first.

use crate::arb::edge::{ArbLeg, LegSide, LegVenue, Opportunity};
use crate::arb::interval::IntervalKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    /// Immediate-or-cancel: fill what you can right now, cancel the rest.
    Ioc,
    /// Fill-or-kill: fill the whole size immediately or nothing at all.
    Fok,
}

#[derive(Debug, Clone)]
pub struct LegParams {
    pub venue: LegVenue,
    pub side: LegSide,
    pub price: f64,
    pub qty: f64,
    pub tif: TimeInForce,
    pub client_order_id: String,
    pub interval_key: IntervalKey,
}

#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub leg_a: LegParams,
    pub leg_b: LegParams,
    pub expected_cost: f64,
    pub expected_edge_net: f64,
}

/// Build the two-leg plan for `opp`. `leg_a` is always the venue-P leg (IOC),
/// `leg_b` the venue-K leg (FOK), regardless of which orientation won.
pub fn plan_execution(opp: &Opportunity, client_tag: &str) -> ExecutionPlan {
    let (leg_yes, leg_no) = opp.legs;
    let (p_leg, k_leg) = order_by_venue(leg_yes, leg_no);

    let leg_a = LegParams {
        venue: p_leg.venue,
        side: p_leg.side,
        price: p_leg.price,
        qty: opp.qty,
        tif: TimeInForce::Ioc,
        client_order_id: format!("{client_tag}-a-{}", opp.interval_key.to_key_string()),
        interval_key: opp.interval_key,
    };
    let leg_b = LegParams {
        venue: k_leg.venue,
        side: k_leg.side,
        price: k_leg.price,
        qty: opp.qty,
        tif: TimeInForce::Fok,
        client_order_id: format!("{client_tag}-b-{}", opp.interval_key.to_key_string()),
        interval_key: opp.interval_key,
    };

    ExecutionPlan {
        leg_a,
        leg_b,
        expected_cost: opp.cost,
        expected_edge_net: opp.edge_net,
    }
}

fn order_by_venue(leg_yes: ArbLeg, leg_no: ArbLeg) -> (ArbLeg, ArbLeg) {
    if leg_yes.venue == LegVenue::P {
        (leg_yes, leg_no)
    } else {
        (leg_no, leg_yes)
    }
}
