//! Deadline timers
//!
//! One deferred "end this session" trigger per session, at most. The timer
//! fires at-or-after the deadline, never before, and goes through the same
//! idempotent `end_session` as a manual end — so a cancellation that loses
//! the race against the firing task is harmless, not a double settlement.

use crate::error::{Result, SessionError};
use crate::metrics;
use crate::services::settlement::{Actor, SettlementEngine};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Handle for a scheduled deadline, usable to cancel it
#[derive(Debug, Clone, Copy)]
pub struct TimerHandle {
    pub session_id: Uuid,
}

#[derive(Clone)]
pub struct TimerScheduler {
    engine: Arc<SettlementEngine>,
    timers: Arc<DashMap<Uuid, JoinHandle<()>>>,
}

impl TimerScheduler {
    pub fn new(engine: Arc<SettlementEngine>) -> Self {
        Self {
            engine,
            timers: Arc::new(DashMap::new()),
        }
    }

    /// Schedule the session's deadline. A session has at most one
    /// outstanding deadline; scheduling a second one is an error.
    pub fn schedule(&self, session_id: Uuid, duration: Duration) -> Result<TimerHandle> {
        match self.timers.entry(session_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(SessionError::DuplicateTimer(session_id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let engine = self.engine.clone();
                let timers = self.timers.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    metrics::TIMERS_FIRED.inc();
                    match engine.end_session(session_id, Actor::System).await {
                        Ok(_) => {}
                        // Already settled or cancelled by other means; the
                        // trigger is a no-op by design.
                        Err(SessionError::InvalidState(reason)) => {
                            debug!(%session_id, %reason, "deadline fired on finished session");
                        }
                        Err(e) => {
                            tracing::warn!(%session_id, error = %e, "deadline settlement failed");
                        }
                    }
                    timers.remove(&session_id);
                });
                slot.insert(task);
                Ok(TimerHandle { session_id })
            }
        }
    }

    pub fn cancel(&self, handle: TimerHandle) -> bool {
        self.cancel_for(handle.session_id)
    }

    /// Cancel any outstanding deadline for the session. Returns whether a
    /// timer was actually cancelled.
    pub fn cancel_for(&self, session_id: Uuid) -> bool {
        if let Some((_, task)) = self.timers.remove(&session_id) {
            task.abort();
            metrics::TIMERS_CANCELLED.inc();
            true
        } else {
            false
        }
    }

    pub fn is_scheduled(&self, session_id: Uuid) -> bool {
        self.timers.contains_key(&session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Session, SessionStatus};
    use crate::services::publisher::MemoryPublisher;
    use crate::services::rewards::RateRewardPolicy;
    use crate::store::{InMemorySessionStore, SessionStore};
    use chrono::Utc;

    async fn engine_with_active_battle() -> (Arc<InMemorySessionStore>, Arc<SettlementEngine>, Uuid)
    {
        let store = Arc::new(InMemorySessionStore::new());
        let mut session = Session::new_battle(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Duration::from_secs(300),
        );
        session.status = SessionStatus::Active;
        session.activated_at = Some(Utc::now());
        let id = session.id;
        store.insert(session).await.unwrap();

        let engine = Arc::new(SettlementEngine::new(
            store.clone(),
            Arc::new(MemoryPublisher::new()),
            Arc::new(RateRewardPolicy::new(Default::default())),
            Default::default(),
        ));
        (store, engine, id)
    }

    #[tokio::test]
    async fn second_schedule_is_rejected() {
        let (_, engine, id) = engine_with_active_battle().await;
        let scheduler = TimerScheduler::new(engine);

        scheduler.schedule(id, Duration::from_secs(60)).unwrap();
        let err = scheduler.schedule(id, Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err, SessionError::DuplicateTimer(_)));

        scheduler.cancel_for(id);
    }

    #[tokio::test]
    async fn deadline_ends_the_session() {
        let (store, engine, id) = engine_with_active_battle().await;
        let scheduler = TimerScheduler::new(engine);

        scheduler.schedule(id, Duration::from_millis(20)).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let session = store.load(id).await.unwrap().value;
        assert_eq!(session.status, SessionStatus::Ended);
        assert!(session.settlement.is_some());
        assert!(!scheduler.is_scheduled(id));
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let (store, engine, id) = engine_with_active_battle().await;
        let scheduler = TimerScheduler::new(engine);

        let handle = scheduler.schedule(id, Duration::from_millis(50)).unwrap();
        assert!(scheduler.cancel(handle));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let session = store.load(id).await.unwrap().value;
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.settlement.is_none());
    }
}
