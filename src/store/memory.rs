//! In-memory session store
//!
//! DashMap-backed implementation for tests and single-process embedding. The
//! version check and the swap happen under the entry's shard lock, so the
//! conditional update is atomic with respect to concurrent writers.

use super::{CommitOutcome, SessionStore, Versioned};
use crate::domain::Session;
use crate::error::{Result, SessionError};
use anyhow::anyhow;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<Uuid, Versioned<Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Session) -> Result<()> {
        let id = session.id;
        match self.sessions.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(SessionError::Internal(anyhow!(
                "session {id} already exists"
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Versioned {
                    version: 1,
                    value: session,
                });
                Ok(())
            }
        }
    }

    async fn load(&self, id: Uuid) -> Result<Versioned<Session>> {
        self.sessions
            .get(&id)
            .map(|entry| Versioned {
                version: entry.version,
                value: entry.value.clone(),
            })
            .ok_or(SessionError::NotFound(id))
    }

    async fn update(
        &self,
        id: Uuid,
        expected_version: i64,
        session: &Session,
    ) -> Result<CommitOutcome> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NotFound(id))?;

        if entry.version != expected_version {
            return Ok(CommitOutcome::Conflict);
        }

        let new_version = expected_version + 1;
        *entry = Versioned {
            version: new_version,
            value: session.clone(),
        };
        Ok(CommitOutcome::Committed(new_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_session() -> Session {
        Session::new_battle(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn load_returns_not_found_for_unknown_id() {
        let store = InMemorySessionStore::new();
        let err = store.load(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = InMemorySessionStore::new();
        let session = sample_session();
        let id = session.id;
        store.insert(session).await.unwrap();

        let first = store.load(id).await.unwrap();
        let second = store.load(id).await.unwrap();

        let outcome = store.update(id, first.version, &first.value).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed(2));

        // The second reader's snapshot is now stale
        let outcome = store
            .update(id, second.version, &second.value)
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Conflict);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemorySessionStore::new();
        let session = sample_session();
        store.insert(session.clone()).await.unwrap();
        assert!(store.insert(session).await.is_err());
    }
}
