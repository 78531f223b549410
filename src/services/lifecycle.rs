//! Session state machine
//!
//! Governs every non-settlement transition: battle challenge/accept/cancel,
//! commerce schedule/activate/cancel, and the commerce showcase operations
//! (add/pin product) recovered from the live shopping flow. Transitions go
//! through the same versioned compare-and-update as the ledger, so two hosts
//! racing on the same session cannot both win a transition.

use crate::config::RetryConfig;
use crate::domain::{
    FlashSale, Session, SessionEvent, SessionProduct, SessionStatus,
};
use crate::error::{Result, SessionError};
use crate::services::directory::{LivestreamDirectory, ProductCatalog};
use crate::services::publisher::EventPublisher;
use crate::services::retry::{with_cas_retry, CasStep};
use crate::store::{CommitOutcome, SessionStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Product showcased in a commerce session
#[derive(Debug, Clone)]
pub struct ProductSpec {
    pub product_id: Uuid,
    pub live_price: Option<i64>,
    pub flash_sale: Option<FlashSaleSpec>,
}

#[derive(Debug, Clone)]
pub struct FlashSaleSpec {
    pub capacity_units: u32,
    pub price_per_unit: i64,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn LivestreamDirectory>,
    catalog: Arc<dyn ProductCatalog>,
    publisher: Arc<dyn EventPublisher>,
    retry: RetryConfig,
}

impl SessionLifecycle {
    pub fn new(
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn LivestreamDirectory>,
        catalog: Arc<dyn ProductCatalog>,
        publisher: Arc<dyn EventPublisher>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            directory,
            catalog,
            publisher,
            retry,
        }
    }

    /// Look up the livestream and require it to be live and hosted by `host_id`.
    async fn require_live_host(&self, livestream_id: Uuid, host_id: Uuid) -> Result<()> {
        let info = self
            .directory
            .livestream(livestream_id)
            .await?
            .filter(|info| info.live)
            .ok_or_else(|| {
                SessionError::InvalidState(format!("livestream {livestream_id} is not live"))
            })?;

        if info.host_id != host_id {
            return Err(SessionError::Unauthorized(format!(
                "user {host_id} does not host livestream {livestream_id}"
            )));
        }
        Ok(())
    }

    /// Propose a battle between two hosts. The session stays `pending` until
    /// the challenged host accepts.
    pub async fn create_battle(
        &self,
        host1_id: Uuid,
        host2_id: Uuid,
        livestream_id: Uuid,
        duration: Duration,
    ) -> Result<Session> {
        if host1_id == host2_id {
            return Err(SessionError::InvalidInput(
                "a host cannot battle themselves".into(),
            ));
        }
        if duration.is_zero() {
            return Err(SessionError::InvalidInput(
                "battle duration must be positive".into(),
            ));
        }
        self.require_live_host(livestream_id, host1_id).await?;

        let session = Session::new_battle(host1_id, host2_id, livestream_id, duration);
        self.store.insert(session.clone()).await?;

        tracing::info!(session_id = %session.id, %host1_id, %host2_id, "battle challenge created");
        self.publisher
            .publish(SessionEvent::SessionCreated {
                session_id: session.id,
                livestream_id,
            })
            .await;

        Ok(session)
    }

    /// Accept a pending battle. Only the challenged host may accept; a third
    /// party gets `Unauthorized`, the challenger gets it too.
    pub async fn accept_battle(&self, session_id: Uuid, actor_id: Uuid) -> Result<Session> {
        let store = &self.store;
        let publisher = &self.publisher;

        with_cas_retry(&self.retry, session_id, || async move {
            let versioned = store.load(session_id).await?;
            let mut session = versioned.value;

            let battle = session.battle().ok_or_else(|| {
                SessionError::InvalidState("not a battle session".into())
            })?;
            if battle.host2.host_id != actor_id {
                return Err(SessionError::Unauthorized(
                    "only the challenged host may accept".into(),
                ));
            }
            if session.status != SessionStatus::Pending {
                return Err(SessionError::InvalidState(format!(
                    "cannot accept a {} battle",
                    session.status
                )));
            }

            let now = Utc::now();
            session.status = SessionStatus::Active;
            session.activated_at = Some(now);

            match store.update(session_id, versioned.version, &session).await? {
                CommitOutcome::Committed(_) => {
                    publisher
                        .publish(SessionEvent::SessionActivated {
                            session_id,
                            activated_at: now,
                        })
                        .await;
                    Ok(CasStep::Done(session))
                }
                CommitOutcome::Conflict => Ok(CasStep::Conflict),
            }
        })
        .await
    }

    /// Create a commerce session attached to the host's livestream.
    pub async fn create_commerce(
        &self,
        host_id: Uuid,
        store_id: Option<Uuid>,
        livestream_id: Uuid,
    ) -> Result<Session> {
        self.require_live_host(livestream_id, host_id).await?;

        let session = Session::new_commerce(host_id, store_id, livestream_id);
        self.store.insert(session.clone()).await?;

        tracing::info!(session_id = %session.id, %host_id, "commerce session created");
        self.publisher
            .publish(SessionEvent::SessionCreated {
                session_id: session.id,
                livestream_id,
            })
            .await;

        Ok(session)
    }

    /// Move a scheduled commerce session to `active`, optionally arming a
    /// time limit the caller turns into a deadline timer.
    pub async fn activate_commerce(
        &self,
        session_id: Uuid,
        actor_id: Uuid,
        time_limit: Option<Duration>,
    ) -> Result<Session> {
        let store = &self.store;
        let publisher = &self.publisher;

        with_cas_retry(&self.retry, session_id, || async move {
            let versioned = store.load(session_id).await?;
            let mut session = versioned.value;

            let commerce = session.commerce().ok_or_else(|| {
                SessionError::InvalidState("not a commerce session".into())
            })?;
            if commerce.host_id != actor_id {
                return Err(SessionError::Unauthorized(
                    "only the host may start the session".into(),
                ));
            }
            if session.status != SessionStatus::Scheduled {
                return Err(SessionError::InvalidState(format!(
                    "cannot start a {} commerce session",
                    session.status
                )));
            }

            let now = Utc::now();
            session.status = SessionStatus::Active;
            session.activated_at = Some(now);
            session.duration_ms = time_limit.map(|d| d.as_millis() as u64);

            match store.update(session_id, versioned.version, &session).await? {
                CommitOutcome::Committed(_) => {
                    publisher
                        .publish(SessionEvent::SessionActivated {
                            session_id,
                            activated_at: now,
                        })
                        .await;
                    Ok(CasStep::Done(session))
                }
                CommitOutcome::Conflict => Ok(CasStep::Conflict),
            }
        })
        .await
    }

    /// Cancel a session that has not gone live. Active sessions cannot be
    /// cancelled (end them instead), terminal sessions stay as they are.
    pub async fn cancel(&self, session_id: Uuid, actor_id: Uuid) -> Result<Session> {
        let store = &self.store;
        let publisher = &self.publisher;

        with_cas_retry(&self.retry, session_id, || async move {
            let versioned = store.load(session_id).await?;
            let mut session = versioned.value;

            if !session.is_participant(actor_id) {
                return Err(SessionError::Unauthorized(
                    "only a session host may cancel".into(),
                ));
            }
            match session.status {
                SessionStatus::Pending | SessionStatus::Scheduled => {}
                SessionStatus::Active => {
                    return Err(SessionError::InvalidState(
                        "cannot cancel an active session".into(),
                    ));
                }
                status => {
                    return Err(SessionError::InvalidState(format!(
                        "cannot cancel a {status} session"
                    )));
                }
            }

            session.status = SessionStatus::Cancelled;

            match store.update(session_id, versioned.version, &session).await? {
                CommitOutcome::Committed(_) => {
                    publisher
                        .publish(SessionEvent::SessionCancelled { session_id })
                        .await;
                    Ok(CasStep::Done(session))
                }
                CommitOutcome::Conflict => Ok(CasStep::Conflict),
            }
        })
        .await
    }

    /// Showcase a product in a commerce session.
    pub async fn add_product(
        &self,
        session_id: Uuid,
        actor_id: Uuid,
        spec: ProductSpec,
    ) -> Result<Session> {
        if let Some(sale) = &spec.flash_sale {
            if sale.capacity_units == 0 {
                return Err(SessionError::InvalidInput(
                    "flash sale capacity must be positive".into(),
                ));
            }
        }
        if !self.catalog.product_exists(spec.product_id).await? {
            return Err(SessionError::UnknownTarget(format!(
                "product {} does not exist",
                spec.product_id
            )));
        }

        let store = &self.store;
        let publisher = &self.publisher;
        let spec = &spec;

        with_cas_retry(&self.retry, session_id, || async move {
            let versioned = store.load(session_id).await?;
            let mut session = versioned.value;

            if session.status.is_terminal() {
                return Err(SessionError::InvalidState(format!(
                    "cannot add products to a {} session",
                    session.status
                )));
            }
            let commerce = session.commerce_mut().ok_or_else(|| {
                SessionError::InvalidState("not a commerce session".into())
            })?;
            if commerce.host_id != actor_id {
                return Err(SessionError::Unauthorized(
                    "only the host may add products".into(),
                ));
            }
            if commerce.product(spec.product_id).is_some() {
                return Err(SessionError::InvalidInput(format!(
                    "product {} is already in the session",
                    spec.product_id
                )));
            }

            commerce.products.push(SessionProduct {
                product_id: spec.product_id,
                live_price: spec.live_price,
                flash_sale: spec.flash_sale.as_ref().map(|s| FlashSale {
                    capacity_units: s.capacity_units,
                    reserved_units: 0,
                    price_per_unit: s.price_per_unit,
                    window_start: s.window_start,
                    window_end: s.window_end,
                }),
                pinned: false,
                showcased_at: Utc::now(),
                stats: Default::default(),
            });

            match store.update(session_id, versioned.version, &session).await? {
                CommitOutcome::Committed(_) => {
                    publisher
                        .publish(SessionEvent::ProductAdded {
                            session_id,
                            product_id: spec.product_id,
                        })
                        .await;
                    Ok(CasStep::Done(session))
                }
                CommitOutcome::Conflict => Ok(CasStep::Conflict),
            }
        })
        .await
    }

    /// Pin one product to the stream overlay; any previous pin is released.
    pub async fn pin_product(
        &self,
        session_id: Uuid,
        actor_id: Uuid,
        product_id: Uuid,
    ) -> Result<Session> {
        let store = &self.store;
        let publisher = &self.publisher;

        with_cas_retry(&self.retry, session_id, || async move {
            let versioned = store.load(session_id).await?;
            let mut session = versioned.value;

            if session.status.is_terminal() {
                return Err(SessionError::InvalidState(format!(
                    "cannot pin products in a {} session",
                    session.status
                )));
            }
            let commerce = session.commerce_mut().ok_or_else(|| {
                SessionError::InvalidState("not a commerce session".into())
            })?;
            if commerce.host_id != actor_id {
                return Err(SessionError::Unauthorized(
                    "only the host may pin products".into(),
                ));
            }
            if commerce.product(product_id).is_none() {
                return Err(SessionError::UnknownTarget(format!(
                    "product {product_id} is not in this session"
                )));
            }

            for product in &mut commerce.products {
                product.pinned = product.product_id == product_id;
            }

            match store.update(session_id, versioned.version, &session).await? {
                CommitOutcome::Committed(_) => {
                    publisher
                        .publish(SessionEvent::ProductPinned {
                            session_id,
                            product_id,
                        })
                        .await;
                    Ok(CasStep::Done(session))
                }
                CommitOutcome::Conflict => Ok(CasStep::Conflict),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::directory::{StaticCatalog, StaticDirectory};
    use crate::services::publisher::MemoryPublisher;
    use crate::store::InMemorySessionStore;

    struct Fixture {
        lifecycle: SessionLifecycle,
        directory: Arc<StaticDirectory>,
        catalog: Arc<StaticCatalog>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemorySessionStore::new());
        let directory = Arc::new(StaticDirectory::new());
        let catalog = Arc::new(StaticCatalog::new());
        let publisher = Arc::new(MemoryPublisher::new());
        let lifecycle = SessionLifecycle::new(
            store,
            directory.clone(),
            catalog.clone(),
            publisher,
            RetryConfig::default(),
        );
        Fixture {
            lifecycle,
            directory,
            catalog,
        }
    }

    #[tokio::test]
    async fn battle_requires_live_stream() {
        let f = fixture();
        let err = f
            .lifecycle
            .create_battle(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                Duration::from_secs(300),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
    }

    #[tokio::test]
    async fn only_challenged_host_accepts() {
        let f = fixture();
        let (host1, host2, stream) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        f.directory.add_live(stream, host1);

        let session = f
            .lifecycle
            .create_battle(host1, host2, stream, Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Pending);

        // The challenger cannot accept their own challenge
        let err = f
            .lifecycle
            .accept_battle(session.id, host1)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Unauthorized(_)));

        // A stranger cannot either
        let err = f
            .lifecycle
            .accept_battle(session.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Unauthorized(_)));

        let session = f.lifecycle.accept_battle(session.id, host2).await.unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.activated_at.is_some());

        // Accepting twice is an invalid transition
        let err = f
            .lifecycle
            .accept_battle(session.id, host2)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
    }

    #[tokio::test]
    async fn active_battle_cannot_be_cancelled() {
        let f = fixture();
        let (host1, host2, stream) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        f.directory.add_live(stream, host1);

        let session = f
            .lifecycle
            .create_battle(host1, host2, stream, Duration::from_secs(300))
            .await
            .unwrap();
        f.lifecycle.accept_battle(session.id, host2).await.unwrap();

        let err = f.lifecycle.cancel(session.id, host1).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
    }

    #[tokio::test]
    async fn pending_battle_cancels() {
        let f = fixture();
        let (host1, host2, stream) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        f.directory.add_live(stream, host1);

        let session = f
            .lifecycle
            .create_battle(host1, host2, stream, Duration::from_secs(300))
            .await
            .unwrap();

        let err = f
            .lifecycle
            .cancel(session.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Unauthorized(_)));

        let session = f.lifecycle.cancel(session.id, host2).await.unwrap();
        assert_eq!(session.status, SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn add_product_checks_catalog_and_duplicates() {
        let f = fixture();
        let (host, stream, product) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        f.directory.add_live(stream, host);

        let session = f
            .lifecycle
            .create_commerce(host, None, stream)
            .await
            .unwrap();

        let spec = ProductSpec {
            product_id: product,
            live_price: Some(1500),
            flash_sale: None,
        };

        let err = f
            .lifecycle
            .add_product(session.id, host, spec.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownTarget(_)));

        f.catalog.add(product);
        f.lifecycle
            .add_product(session.id, host, spec.clone())
            .await
            .unwrap();

        let err = f
            .lifecycle
            .add_product(session.id, host, spec)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn pin_product_moves_the_pin() {
        let f = fixture();
        let (host, stream) = (Uuid::new_v4(), Uuid::new_v4());
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        f.directory.add_live(stream, host);
        f.catalog.add(p1);
        f.catalog.add(p2);

        let session = f
            .lifecycle
            .create_commerce(host, None, stream)
            .await
            .unwrap();
        for product_id in [p1, p2] {
            f.lifecycle
                .add_product(
                    session.id,
                    host,
                    ProductSpec {
                        product_id,
                        live_price: None,
                        flash_sale: None,
                    },
                )
                .await
                .unwrap();
        }

        let session = f.lifecycle.pin_product(session.id, host, p1).await.unwrap();
        let commerce = session.commerce().unwrap();
        assert!(commerce.product(p1).unwrap().pinned);

        let session = f.lifecycle.pin_product(session.id, host, p2).await.unwrap();
        let commerce = session.commerce().unwrap();
        assert!(!commerce.product(p1).unwrap().pinned);
        assert!(commerce.product(p2).unwrap().pinned);
    }
}
