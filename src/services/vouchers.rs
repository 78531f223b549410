//! Voucher ledger
//!
//! Vouchers are ceiling counters: `used_count` may reach `usage_limit` and
//! never pass it. Redemption shares the contribution ledger's discipline —
//! idempotency-key deduplication plus versioned compare-and-update — so a
//! flaky client retrying a redemption is not double-counted against the limit.

use crate::config::{RetryConfig, VoucherDefaults};
use crate::domain::{
    ContributionOutcome, ContributionReceipt, Discount, SessionEvent, SessionStatus, Voucher,
};
use crate::error::{Result, SessionError};
use crate::metrics;
use crate::services::publisher::EventPublisher;
use crate::services::retry::{with_cas_retry, CasStep};
use crate::store::{CommitOutcome, SessionStore};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Voucher creation parameters; unset fields fall back to configured defaults
#[derive(Debug, Clone)]
pub struct VoucherSpec {
    pub code: Option<String>,
    pub discount: Discount,
    pub usage_limit: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct VoucherLedger {
    store: Arc<dyn SessionStore>,
    publisher: Arc<dyn EventPublisher>,
    retry: RetryConfig,
    defaults: VoucherDefaults,
}

impl VoucherLedger {
    pub fn new(
        store: Arc<dyn SessionStore>,
        publisher: Arc<dyn EventPublisher>,
        retry: RetryConfig,
        defaults: VoucherDefaults,
    ) -> Self {
        Self {
            store,
            publisher,
            retry,
            defaults,
        }
    }

    pub async fn create_voucher(
        &self,
        session_id: Uuid,
        actor_id: Uuid,
        spec: VoucherSpec,
    ) -> Result<Voucher> {
        if let Some(0) = spec.usage_limit {
            return Err(SessionError::InvalidInput(
                "voucher usage limit must be positive".into(),
            ));
        }
        if let Discount::Percentage(p) = spec.discount {
            if p == 0 || p > 100 {
                return Err(SessionError::InvalidInput(
                    "percentage discount must be between 1 and 100".into(),
                ));
            }
        }

        let code = spec.code.clone().unwrap_or_else(|| {
            format!("LIVE{}", &Uuid::new_v4().simple().to_string()[..8].to_uppercase())
        });
        let voucher = Voucher {
            code: code.clone(),
            discount: spec.discount.clone(),
            usage_limit: spec.usage_limit.unwrap_or(self.defaults.usage_limit),
            used_count: 0,
            expires_at: Some(spec.expires_at.unwrap_or_else(|| {
                Utc::now() + ChronoDuration::hours(i64::from(self.defaults.ttl_hours))
            })),
        };

        let store = &self.store;
        let publisher = &self.publisher;
        let voucher = &voucher;
        let code = &code;

        with_cas_retry(&self.retry, session_id, || async move {
            let versioned = store.load(session_id).await?;
            let mut session = versioned.value;

            if session.status.is_terminal() {
                return Err(SessionError::InvalidState(format!(
                    "cannot create vouchers in a {} session",
                    session.status
                )));
            }
            let commerce = session.commerce_mut().ok_or_else(|| {
                SessionError::InvalidState("not a commerce session".into())
            })?;
            if commerce.host_id != actor_id {
                return Err(SessionError::Unauthorized(
                    "only the host may create vouchers".into(),
                ));
            }
            if commerce.voucher(code).is_some() {
                return Err(SessionError::InvalidInput(format!(
                    "voucher code {code} already exists in this session"
                )));
            }

            commerce.vouchers.push(voucher.clone());

            match store.update(session_id, versioned.version, &session).await? {
                CommitOutcome::Committed(_) => {
                    publisher
                        .publish(SessionEvent::VoucherCreated {
                            session_id,
                            code: code.clone(),
                        })
                        .await;
                    Ok(CasStep::Done(voucher.clone()))
                }
                CommitOutcome::Conflict => Ok(CasStep::Conflict),
            }
        })
        .await
    }

    /// Redeem one use of a voucher. Replays of the same idempotency key get
    /// the voucher snapshot as of the original redemption.
    pub async fn redeem_voucher(
        &self,
        session_id: Uuid,
        code: &str,
        actor_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Voucher> {
        if idempotency_key.is_empty() {
            return Err(SessionError::InvalidInput(
                "idempotency key must not be empty".into(),
            ));
        }

        let store = &self.store;
        let publisher = &self.publisher;

        with_cas_retry(&self.retry, session_id, || async move {
            let versioned = store.load(session_id).await?;
            let mut session = versioned.value;

            if let Some(receipt) = session.receipts.get(idempotency_key) {
                metrics::CONTRIBUTION_REPLAYS.inc();
                let ContributionOutcome::VoucherRedeemed {
                    code: applied_code,
                    used_count,
                } = &receipt.outcome
                else {
                    return Err(SessionError::InvalidInput(format!(
                        "idempotency key {idempotency_key} was used for a different operation"
                    )));
                };
                let commerce = session.commerce().ok_or_else(|| {
                    SessionError::InvalidState("not a commerce session".into())
                })?;
                let voucher = commerce.voucher(applied_code).ok_or_else(|| {
                    SessionError::UnknownTarget(format!("voucher {applied_code} is gone"))
                })?;
                let mut snapshot = voucher.clone();
                snapshot.used_count = *used_count;
                return Ok(CasStep::Done(snapshot));
            }

            if session.status != SessionStatus::Active {
                return Err(SessionError::InvalidState(format!(
                    "session is {}, vouchers cannot be redeemed",
                    session.status
                )));
            }

            let now = Utc::now();
            let commerce = session.commerce_mut().ok_or_else(|| {
                SessionError::InvalidState("not a commerce session".into())
            })?;
            let voucher = commerce.voucher_mut(code).ok_or_else(|| {
                SessionError::UnknownTarget(format!("voucher {code} is not in this session"))
            })?;

            voucher.redeem(now)?;
            let snapshot = voucher.clone();

            let outcome = ContributionOutcome::VoucherRedeemed {
                code: code.to_string(),
                used_count: snapshot.used_count,
            };
            session.receipts.insert(
                idempotency_key.to_string(),
                ContributionReceipt {
                    idempotency_key: idempotency_key.to_string(),
                    actor_id,
                    applied_at: now,
                    outcome: outcome.clone(),
                },
            );

            match store.update(session_id, versioned.version, &session).await? {
                CommitOutcome::Committed(_) => {
                    metrics::CONTRIBUTIONS_APPLIED.inc();
                    publisher
                        .publish(SessionEvent::ContributionApplied {
                            session_id,
                            actor_id,
                            outcome,
                        })
                        .await;
                    Ok(CasStep::Done(snapshot))
                }
                CommitOutcome::Conflict => Ok(CasStep::Conflict),
            }
        })
        .await
    }
}
