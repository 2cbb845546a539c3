//! Per-(provider, model) availability accounting: a circuit breaker over
//! breaker-tripping upstream failures, and rolling request/token windows
//! checked by projection before a call is issued.
//!
//! Both structures are process-wide and mutated under one lock per key.
//! Neither delays a caller; waiting and retrying is the orchestrator's
//! decision.

#![deny(missing_docs)]

mod breaker;
mod tracker;

pub use breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
pub use tracker::RateTracker;
