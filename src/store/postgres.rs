//! PostgreSQL session store
//!
//! The aggregate is persisted as one JSONB document next to a version column.
//! `update` is a single conditional `UPDATE ... WHERE version = $n`, so the
//! compare-and-update the ledger relies on is one storage round trip — no
//! transaction, no row lock held across application code.

use super::{CommitOutcome, SessionStore, Versioned};
use crate::domain::Session;
use crate::error::{Result, SessionError};
use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("running live_sessions migrations")?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: Session) -> Result<()> {
        let state = serde_json::to_value(&session)?;
        sqlx::query("INSERT INTO live_sessions (id, version, state) VALUES ($1, 1, $2)")
            .bind(session.id)
            .bind(state)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Versioned<Session>> {
        let row = sqlx::query("SELECT version, state FROM live_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(SessionError::NotFound(id))?;

        let version: i64 = row.try_get("version")?;
        let state: serde_json::Value = row.try_get("state")?;
        let value: Session = serde_json::from_value(state)?;

        Ok(Versioned { version, value })
    }

    async fn update(
        &self,
        id: Uuid,
        expected_version: i64,
        session: &Session,
    ) -> Result<CommitOutcome> {
        let state = serde_json::to_value(session)?;
        let result = sqlx::query(
            "UPDATE live_sessions \
             SET state = $1, version = version + 1, updated_at = now() \
             WHERE id = $2 AND version = $3",
        )
        .bind(state)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Either the row is gone or another writer bumped the version;
            // the caller's reload distinguishes the two.
            return Ok(CommitOutcome::Conflict);
        }

        Ok(CommitOutcome::Committed(expected_version + 1))
    }
}
