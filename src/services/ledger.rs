//! Contribution ledger
//!
//! Applies viewer contributions (battle gifts, commerce purchases) to a
//! session's counters. Three guarantees, in order of importance:
//!
//! 1. At-most-once: a replayed idempotency key returns the stored receipt and
//!    applies nothing.
//! 2. No lost updates: every mutation is a load → mutate → conditional-commit
//!    cycle; a version conflict means somebody else won, so reload and retry
//!    within the configured budget.
//! 3. Ceilings hold: a flash-sale reservation past capacity is rejected, and
//!    only the commit that fills the sale to exactly its capacity emits the
//!    sold-out notification.

use crate::config::RetryConfig;
use crate::domain::{
    ContributionEvent, ContributionOutcome, ContributionReceipt, ContributionTarget,
    SessionEvent, SessionKind, SessionStatus,
};
use crate::error::{Result, SessionError};
use crate::metrics;
use crate::services::publisher::EventPublisher;
use crate::services::retry::{with_cas_retry, CasStep};
use crate::store::{CommitOutcome, SessionStore};
use chrono::Utc;
use std::sync::Arc;

pub struct EventLedger {
    store: Arc<dyn SessionStore>,
    publisher: Arc<dyn EventPublisher>,
    retry: RetryConfig,
}

impl EventLedger {
    pub fn new(
        store: Arc<dyn SessionStore>,
        publisher: Arc<dyn EventPublisher>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            retry,
        }
    }

    /// Apply one contribution. Returns the receipt — freshly computed, or the
    /// stored one when the idempotency key was seen before.
    pub async fn apply(&self, event: &ContributionEvent) -> Result<ContributionReceipt> {
        if event.idempotency_key.is_empty() {
            return Err(SessionError::InvalidInput(
                "idempotency key must not be empty".into(),
            ));
        }
        if event.quantity == 0 {
            return Err(SessionError::InvalidInput(
                "quantity must be positive".into(),
            ));
        }
        if event.unit_value < 0 {
            return Err(SessionError::InvalidInput(
                "unit value must not be negative".into(),
            ));
        }

        let store = &self.store;
        let publisher = &self.publisher;
        let session_id = event.session_id;

        with_cas_retry(&self.retry, session_id, || async move {
            let versioned = store.load(session_id).await?;
            let mut session = versioned.value;

            // Replay check comes before the status check: a duplicate of an
            // event applied before settlement still gets its original answer.
            if let Some(receipt) = session.receipts.get(&event.idempotency_key) {
                metrics::CONTRIBUTION_REPLAYS.inc();
                return Ok(CasStep::Done(receipt.clone()));
            }

            if session.status != SessionStatus::Active {
                return Err(SessionError::InvalidState(format!(
                    "session is {}, not accepting contributions",
                    session.status
                )));
            }

            let now = Utc::now();
            let outcome = match (&mut session.kind, event.target) {
                (SessionKind::Battle(battle), ContributionTarget::BattleSlot(slot_id)) => {
                    let slot = battle.slot_mut(slot_id);
                    slot.score += event.value();
                    ContributionOutcome::GiftApplied {
                        slot: slot_id,
                        slot_score: slot.score,
                    }
                }
                (SessionKind::Commerce(commerce), ContributionTarget::Product(product_id)) => {
                    let product = commerce.product_mut(product_id).ok_or_else(|| {
                        SessionError::UnknownTarget(format!(
                            "product {product_id} is not in this session"
                        ))
                    })?;

                    let sold_out = match product.flash_sale.as_mut() {
                        Some(sale) => sale.reserve(product_id, event.quantity, now)?,
                        None => false,
                    };

                    let revenue = event.value();
                    product.stats.orders += 1;
                    product.stats.units_sold += u64::from(event.quantity);
                    product.stats.revenue += revenue;
                    commerce.total_orders += 1;
                    commerce.total_revenue += revenue;

                    ContributionOutcome::OrderPlaced {
                        product_id,
                        units: event.quantity,
                        revenue,
                        sold_out,
                    }
                }
                (SessionKind::Battle(_), ContributionTarget::Product(product_id)) => {
                    return Err(SessionError::UnknownTarget(format!(
                        "product {product_id} targeted in a battle session"
                    )));
                }
                (SessionKind::Commerce(_), ContributionTarget::BattleSlot(_)) => {
                    return Err(SessionError::UnknownTarget(
                        "battle slot targeted in a commerce session".into(),
                    ));
                }
            };

            let receipt = ContributionReceipt {
                idempotency_key: event.idempotency_key.clone(),
                actor_id: event.actor_id,
                applied_at: now,
                outcome: outcome.clone(),
            };
            session
                .receipts
                .insert(event.idempotency_key.clone(), receipt.clone());

            match store.update(session_id, versioned.version, &session).await? {
                CommitOutcome::Committed(_) => {
                    metrics::CONTRIBUTIONS_APPLIED.inc();
                    publisher
                        .publish(SessionEvent::ContributionApplied {
                            session_id,
                            actor_id: event.actor_id,
                            outcome: outcome.clone(),
                        })
                        .await;
                    if let ContributionOutcome::OrderPlaced {
                        product_id,
                        sold_out: true,
                        ..
                    } = outcome
                    {
                        publisher
                            .publish(SessionEvent::FlashSaleSoldOut {
                                session_id,
                                product_id,
                            })
                            .await;
                    }
                    Ok(CasStep::Done(receipt))
                }
                CommitOutcome::Conflict => Ok(CasStep::Conflict),
            }
        })
        .await
    }
}
