//! Error kinds the core distinguishes.
//!
//! Precondition failures carry no side effects. Venue errors are split into
//! transient (retry once, then defer) and permanent (force cooldown + kill
//! switch). Consistency failures are handled by the reconciler as
//! authoritative overrides, never surfaced as execution errors.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GuardFailure {
    #[error("edge {edge_net:.4} below floor {min_edge_net:.4}")]
    EdgeBelowFloor { edge_net: f64, min_edge_net: f64 },
    #[error("qty {qty:.4} below venue P minimum {min_qty:.4}")]
    SizeBelowMinimum { qty: f64, min_qty: f64 },
    #[error("in cooldown until {until}")]
    InCooldown { until: i64 },
    #[error("kill switch triggered")]
    KillSwitchTriggered,
    #[error("daily realized loss {loss:.2} exceeds cap {cap:.2}")]
    DailyLossCapExceeded { loss: f64, cap: f64 },
    #[error("total open notional {notional:.2} exceeds cap {cap:.2}")]
    NotionalCapExceeded { notional: f64, cap: f64 },
    #[error("open order count {count} exceeds bound {bound} for {venue}")]
    OpenOrderCountExceeded {
        venue: &'static str,
        count: usize,
        bound: usize,
    },
    #[error("only {remaining_ms}ms until rollover, need {min_ms}ms")]
    TooCloseToRollover { remaining_ms: i64, min_ms: i64 },
    #[error("quote for {venue} is stale ({age_ms}ms old)")]
    StaleQuote { venue: &'static str, age_ms: i64 },
    #[error("position imbalance |{delta:.4}| exceeds fee tolerance")]
    PositionImbalance { delta: f64 },
    #[error("mapping incomplete for interval")]
    MappingIncomplete,
    #[error("busy lock held")]
    BusyLockHeld,
    #[error("insufficient notional headroom")]
    InsufficientNotionalHeadroom,
}

/// Classification a venue error carries: transient errors are retried at
/// most once within the same operation; permanent errors force cooldown and
/// kill switch because they will not resolve on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueErrorKind {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Error)]
#[error("venue error ({kind:?}): {detail}")]
pub struct VenueError {
    pub kind: VenueErrorKind,
    pub detail: String,
}

impl VenueError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            kind: VenueErrorKind::Transient,
            detail: detail.into(),
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self {
            kind: VenueErrorKind::Permanent,
            detail: detail.into(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == VenueErrorKind::Permanent
    }

    /// Classify a raw error message the way venue adapters report reasons:
    /// `insufficient_balance`, `market_closed`, `trading_closed`,
    /// `event_expired` are permanent; everything else (timeouts, 5xx,
    /// connection resets) is transient.
    pub fn classify(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let lower = detail.to_ascii_lowercase();
        let permanent = ["insufficient_balance", "market_closed", "trading_closed", "event_expired"]
            .iter()
            .any(|needle| lower.contains(needle));
        Self {
            kind: if permanent {
                VenueErrorKind::Permanent
            } else {
                VenueErrorKind::Transient
            },
            detail,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Guard(#[from] GuardFailure),
    #[error(transparent)]
    Venue(#[from] VenueError),
    #[error("deferred: {0}")]
    Deferred(String),
    #[error("unwind failed after retries: {0}")]
    UnwindFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_permanent_errors() {
        assert!(VenueError::classify("insufficient_balance: need 10 more USDC").is_permanent());
        assert!(VenueError::classify("market_closed").is_permanent());
        assert!(VenueError::classify("event_expired").is_permanent());
    }

    #[test]
    fn classify_transient_errors() {
        assert!(!VenueError::classify("timeout waiting for ack").is_permanent());
        assert!(!VenueError::classify("connection reset by peer").is_permanent());
    }
}
