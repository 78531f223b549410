//! Session service (command facade)
//!
//! Orchestrates the state machine, the ledgers, the settlement engine and the
//! timer scheduler behind the command surface callers use. Battles arm their
//! deadline when accepted; commerce sessions arm one only when activated with
//! a time limit. Ending a session through any path cancels its timer.

use crate::config::EngineConfig;
use crate::domain::{ContributionEvent, ContributionReceipt, Session, Settlement, Voucher};
use crate::error::Result;
use crate::services::directory::{LivestreamDirectory, ProductCatalog};
use crate::services::ledger::EventLedger;
use crate::services::lifecycle::{ProductSpec, SessionLifecycle};
use crate::services::publisher::EventPublisher;
use crate::services::rewards::{RateRewardPolicy, RewardPolicy};
use crate::services::settlement::{Actor, SettlementEngine};
use crate::services::timers::TimerScheduler;
use crate::services::vouchers::{VoucherLedger, VoucherSpec};
use crate::store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct SessionService {
    store: Arc<dyn SessionStore>,
    lifecycle: SessionLifecycle,
    ledger: EventLedger,
    vouchers: VoucherLedger,
    engine: Arc<SettlementEngine>,
    timers: TimerScheduler,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn LivestreamDirectory>,
        catalog: Arc<dyn ProductCatalog>,
        publisher: Arc<dyn EventPublisher>,
        policy: Arc<dyn RewardPolicy>,
        config: EngineConfig,
    ) -> Self {
        let lifecycle = SessionLifecycle::new(
            store.clone(),
            directory,
            catalog,
            publisher.clone(),
            config.retry.clone(),
        );
        let ledger = EventLedger::new(store.clone(), publisher.clone(), config.retry.clone());
        let vouchers = VoucherLedger::new(
            store.clone(),
            publisher.clone(),
            config.retry.clone(),
            config.vouchers.clone(),
        );
        let engine = Arc::new(SettlementEngine::new(
            store.clone(),
            publisher,
            policy,
            config.retry.clone(),
        ));
        let timers = TimerScheduler::new(engine.clone());

        Self {
            store,
            lifecycle,
            ledger,
            vouchers,
            engine,
            timers,
        }
    }

    /// Convenience constructor using the rate-based reward policy from config.
    pub fn with_default_policy(
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn LivestreamDirectory>,
        catalog: Arc<dyn ProductCatalog>,
        publisher: Arc<dyn EventPublisher>,
        config: EngineConfig,
    ) -> Self {
        let policy = Arc::new(RateRewardPolicy::new(config.rewards.clone()));
        Self::new(store, directory, catalog, publisher, policy, config)
    }

    pub async fn create_battle(
        &self,
        host1_id: Uuid,
        host2_id: Uuid,
        livestream_id: Uuid,
        duration: Duration,
    ) -> Result<Session> {
        self.lifecycle
            .create_battle(host1_id, host2_id, livestream_id, duration)
            .await
    }

    /// Accept a pending battle; activation arms the battle's deadline.
    pub async fn accept_battle(&self, session_id: Uuid, actor_id: Uuid) -> Result<Session> {
        let session = self.lifecycle.accept_battle(session_id, actor_id).await?;
        if let Some(duration) = session.duration() {
            self.timers.schedule(session_id, duration)?;
        }
        Ok(session)
    }

    pub async fn create_commerce_session(
        &self,
        host_id: Uuid,
        store_id: Option<Uuid>,
        livestream_id: Uuid,
    ) -> Result<Session> {
        self.lifecycle
            .create_commerce(host_id, store_id, livestream_id)
            .await
    }

    /// Activate a commerce session; with a time limit, the deadline timer is
    /// armed and will end the session as the system actor.
    pub async fn activate_commerce_session(
        &self,
        session_id: Uuid,
        actor_id: Uuid,
        time_limit: Option<Duration>,
    ) -> Result<Session> {
        let session = self
            .lifecycle
            .activate_commerce(session_id, actor_id, time_limit)
            .await?;
        if let Some(duration) = session.duration() {
            self.timers.schedule(session_id, duration)?;
        }
        Ok(session)
    }

    pub async fn add_product(
        &self,
        session_id: Uuid,
        actor_id: Uuid,
        spec: ProductSpec,
    ) -> Result<Session> {
        self.lifecycle.add_product(session_id, actor_id, spec).await
    }

    pub async fn pin_product(
        &self,
        session_id: Uuid,
        actor_id: Uuid,
        product_id: Uuid,
    ) -> Result<Session> {
        self.lifecycle
            .pin_product(session_id, actor_id, product_id)
            .await
    }

    pub async fn apply_contribution(
        &self,
        event: &ContributionEvent,
    ) -> Result<ContributionReceipt> {
        self.ledger.apply(event).await
    }

    pub async fn create_voucher(
        &self,
        session_id: Uuid,
        actor_id: Uuid,
        spec: VoucherSpec,
    ) -> Result<Voucher> {
        self.vouchers.create_voucher(session_id, actor_id, spec).await
    }

    pub async fn redeem_voucher(
        &self,
        session_id: Uuid,
        code: &str,
        actor_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Voucher> {
        self.vouchers
            .redeem_voucher(session_id, code, actor_id, idempotency_key)
            .await
    }

    /// End a session and return its settlement (idempotent, see
    /// `SettlementEngine::end_session`). Cancels any outstanding deadline.
    pub async fn end_session(&self, session_id: Uuid, actor: Actor) -> Result<Settlement> {
        let settlement = self.engine.end_session(session_id, actor).await?;
        self.timers.cancel_for(session_id);
        Ok(settlement)
    }

    pub async fn cancel_session(&self, session_id: Uuid, actor_id: Uuid) -> Result<Session> {
        let session = self.lifecycle.cancel(session_id, actor_id).await?;
        self.timers.cancel_for(session_id);
        Ok(session)
    }

    /// Backfill battle rewards after a reward-policy failure at settlement.
    pub async fn retry_rewards(&self, session_id: Uuid) -> Result<Settlement> {
        self.engine.retry_rewards(session_id).await
    }

    /// Read the current session snapshot. Unrestricted and possibly slightly
    /// stale under concurrent writes; fine for live score/inventory display.
    pub async fn get_session(&self, session_id: Uuid) -> Result<Session> {
        Ok(self.store.load(session_id).await?.value)
    }
}
