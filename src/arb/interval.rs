//! Deterministic 15-minute interval arithmetic and rollover timing.
//!
//! All functions here are pure functions of wall-clock UTC; there is no
//! state and no fallible path.

use chrono::{DateTime, Utc};

pub const INTERVAL_SECS: i64 = 900;

/// `(start_ts, end_ts)` in Unix seconds, `end_ts - start_ts == 900`, aligned
/// to quarter-hour boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntervalKey {
    pub start_ts: i64,
    pub end_ts: i64,
}

impl IntervalKey {
    pub fn containing(ts: i64) -> Self {
        let start_ts = ts.div_euclid(INTERVAL_SECS) * INTERVAL_SECS;
        Self {
            start_ts,
            end_ts: start_ts + INTERVAL_SECS,
        }
    }

    pub fn next(&self) -> Self {
        Self {
            start_ts: self.end_ts,
            end_ts: self.end_ts + INTERVAL_SECS,
        }
    }

    pub fn previous(&self) -> Self {
        Self {
            start_ts: self.start_ts - INTERVAL_SECS,
            end_ts: self.start_ts,
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.end_ts - self.start_ts == INTERVAL_SECS && self.start_ts % INTERVAL_SECS == 0
    }

    /// Serialize as `{start_ts}-{end_ts}`; `parse` is the inverse.
    pub fn to_key_string(&self) -> String {
        format!("{}-{}", self.start_ts, self.end_ts)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (start, end) = s.split_once('-')?;
        let start_ts = start.parse().ok()?;
        let end_ts = end.parse().ok()?;
        Some(Self { start_ts, end_ts })
    }
}

/// Injected clock so tests can pin "now" without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn current_interval(clock: &dyn Clock) -> IntervalKey {
    IntervalKey::containing(clock.now().timestamp())
}

pub fn next_interval(clock: &dyn Clock) -> IntervalKey {
    current_interval(clock).next()
}

pub fn ms_until_rollover(clock: &dyn Clock) -> i64 {
    let now_ms = clock.now().timestamp_millis();
    let end_ms = current_interval(clock).end_ts * 1000;
    (end_ms - now_ms).max(0)
}

/// True once we're within `window_ms` of rollover — the coordinator uses
/// this to decide whether to start discovering the next interval's mapping.
pub fn should_prefetch(clock: &dyn Clock, window_ms: i64) -> bool {
    ms_until_rollover(clock) <= window_ms
}
