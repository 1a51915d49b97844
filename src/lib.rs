//! Box-arbitrage trading core library.
//!
//! Exposes the `arb` module tree for use by `src/bin/arb_engine.rs` and the
//! integration tests under `tests/`.

pub mod arb;
