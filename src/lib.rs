//! Live session engine: battles and live commerce on top of a livestream
//!
//! Two session types share one mechanism: a state machine over a versioned
//! aggregate, a contribution ledger with idempotency-key deduplication and
//! compare-and-update counter accounting, a single cancellable deadline timer
//! per session, and an exactly-once settlement on end. Battles accumulate
//! gift scores for two hosts; commerce sessions run flash sales and vouchers
//! with hard ceilings that concurrent purchases can never breach.

pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod services;
pub mod store;
pub mod telemetry;

pub use config::EngineConfig;
pub use error::{Result, SessionError};
pub use services::{Actor, SessionService};
pub use store::{InMemorySessionStore, PgSessionStore, SessionStore};
