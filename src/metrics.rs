//! Prometheus metrics for the session engine
//!
//! Counters register on the default registry; an embedding service exposes
//! them through its own /metrics endpoint.

use once_cell::sync::Lazy;
use prometheus::{IntCounter, Opts};

fn register_counter(name: &str, help: &str) -> IntCounter {
    let counter =
        IntCounter::with_opts(Opts::new(name, help)).expect("failed to create counter");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register counter");
    counter
}

pub static CONTRIBUTIONS_APPLIED: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "live_session_contributions_applied_total",
        "Contributions (gifts, purchases, redemptions) applied to sessions",
    )
});

pub static CONTRIBUTION_REPLAYS: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "live_session_contribution_replays_total",
        "Duplicate contributions answered from stored receipts",
    )
});

pub static CAS_CONFLICTS: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "live_session_cas_conflicts_total",
        "Version conflicts observed on conditional session updates",
    )
});

pub static SETTLEMENTS: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "live_session_settlements_total",
        "Sessions settled (each session counts exactly once)",
    )
});

pub static TIMERS_FIRED: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "live_session_timers_fired_total",
        "Deadline timers that fired and triggered a system end",
    )
});

pub static TIMERS_CANCELLED: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "live_session_timers_cancelled_total",
        "Deadline timers cancelled before firing",
    )
});
