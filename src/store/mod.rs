//! Session storage
//!
//! The aggregate is read and written as a whole, guarded by an optimistic
//! version: `update` commits only when nobody else has written since the
//! caller's `load`. That single conditional write is what makes concurrent
//! score/inventory accounting race-free — the service layer retries on
//! `Conflict`, it never does an unguarded read-modify-write.

mod memory;
mod postgres;

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;

use crate::domain::Session;
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// A session snapshot together with the version it was read at
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub version: i64,
    pub value: T,
}

/// Result of a conditional update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The write landed; carries the new version
    Committed(i64),
    /// Somebody else wrote first; reload and retry
    Conflict,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a freshly created session at version 1.
    async fn insert(&self, session: Session) -> Result<()>;

    /// Load the current snapshot. `NotFound` if the id is unknown.
    async fn load(&self, id: Uuid) -> Result<Versioned<Session>>;

    /// Write `session` only if the stored version still equals
    /// `expected_version`. Never partially applies.
    async fn update(
        &self,
        id: Uuid,
        expected_version: i64,
        session: &Session,
    ) -> Result<CommitOutcome>;
}
