//! Settlement engine
//!
//! Owns the one transition that must happen exactly once: `active → ended`.
//! The version-guarded status flip is the serialization point — whichever
//! caller commits it computes the settlement, and everyone else (a racing
//! manual end, a late timer) reads the stored result back. There is no lock
//! and no "who ends the session" convention to get wrong.

use crate::config::RetryConfig;
use crate::domain::{
    BattleResult, BattleSettlement, CommerceSettlement, ProductSummary, SessionEvent,
    SessionKind, SessionStatus, Settlement, SlotId,
};
use crate::error::{Result, SessionError};
use crate::metrics;
use crate::services::publisher::EventPublisher;
use crate::services::retry::{with_cas_retry, CasStep};
use crate::services::rewards::RewardPolicy;
use crate::store::{CommitOutcome, SessionStore};
use chrono::Utc;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Who asked for the session to end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// The deadline timer
    System,
    User(Uuid),
}

pub struct SettlementEngine {
    store: Arc<dyn SessionStore>,
    publisher: Arc<dyn EventPublisher>,
    policy: Arc<dyn RewardPolicy>,
    retry: RetryConfig,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        publisher: Arc<dyn EventPublisher>,
        policy: Arc<dyn RewardPolicy>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            policy,
            retry,
        }
    }

    /// End a session and return its settlement. Idempotent: on an already
    /// settled session this returns the stored settlement, which is what
    /// makes the manual-end/timer-end race harmless.
    pub async fn end_session(&self, session_id: Uuid, actor: Actor) -> Result<Settlement> {
        let store = &self.store;
        let publisher = &self.publisher;
        let policy = &self.policy;

        with_cas_retry(&self.retry, session_id, || async move {
            let versioned = store.load(session_id).await?;
            let mut session = versioned.value;

            // The idempotent re-call path, deliberately before any other check
            if let Some(settlement) = &session.settlement {
                return Ok(CasStep::Done(settlement.clone()));
            }

            match session.status {
                SessionStatus::Active => {}
                status => {
                    return Err(SessionError::InvalidState(format!(
                        "cannot settle a {status} session"
                    )));
                }
            }
            if let Actor::User(user_id) = actor {
                if !session.is_participant(user_id) {
                    return Err(SessionError::Unauthorized(
                        "only a session host may end the session".into(),
                    ));
                }
            }

            let settlement = match &session.kind {
                SessionKind::Battle(battle) => {
                    let host1_score = battle.host1.score;
                    let host2_score = battle.host2.score;
                    let (winner, result) = match host1_score.cmp(&host2_score) {
                        Ordering::Greater => (
                            Some(SlotId::Host1),
                            BattleResult::Decided {
                                winner: SlotId::Host1,
                                winner_score: host1_score,
                                loser_score: host2_score,
                            },
                        ),
                        Ordering::Less => (
                            Some(SlotId::Host2),
                            BattleResult::Decided {
                                winner: SlotId::Host2,
                                winner_score: host2_score,
                                loser_score: host1_score,
                            },
                        ),
                        Ordering::Equal => (
                            None,
                            BattleResult::Draw {
                                total_score: host1_score + host2_score,
                            },
                        ),
                    };

                    // A reward failure must not block settlement; the session
                    // still freezes and rewards can be backfilled later.
                    let rewards = match policy.rewards(&result) {
                        Ok(split) => Some(split),
                        Err(e) => {
                            warn!(%session_id, error = %e, "reward policy failed at settlement");
                            None
                        }
                    };

                    Settlement::Battle(BattleSettlement {
                        winner,
                        host1_score,
                        host2_score,
                        rewards,
                    })
                }
                SessionKind::Commerce(commerce) => Settlement::Commerce(CommerceSettlement {
                    total_revenue: commerce.total_revenue,
                    total_orders: commerce.total_orders,
                    per_product_stats: commerce
                        .products
                        .iter()
                        .map(|p| ProductSummary {
                            product_id: p.product_id,
                            orders: p.stats.orders,
                            units_sold: p.stats.units_sold,
                            revenue: p.stats.revenue,
                        })
                        .collect(),
                }),
            };

            session.status = SessionStatus::Ended;
            session.ended_at = Some(Utc::now());
            session.settlement = Some(settlement.clone());

            match store.update(session_id, versioned.version, &session).await? {
                CommitOutcome::Committed(_) => {
                    metrics::SETTLEMENTS.inc();
                    tracing::info!(%session_id, ?actor, "session settled");
                    publisher
                        .publish(SessionEvent::SessionEnded {
                            session_id,
                            settlement: settlement.clone(),
                        })
                        .await;
                    Ok(CasStep::Done(settlement))
                }
                CommitOutcome::Conflict => Ok(CasStep::Conflict),
            }
        })
        .await
    }

    /// Backfill battle rewards after a settlement whose reward-policy call
    /// failed. Safe to retry: the session stays terminal throughout, scores
    /// are frozen, and a settlement that already has rewards is returned
    /// unchanged.
    pub async fn retry_rewards(&self, session_id: Uuid) -> Result<Settlement> {
        let store = &self.store;
        let policy = &self.policy;

        with_cas_retry(&self.retry, session_id, || async move {
            let versioned = store.load(session_id).await?;
            let mut session = versioned.value;

            let Some(settlement) = session.settlement.clone() else {
                return Err(SessionError::InvalidState(
                    "session is not settled".into(),
                ));
            };
            let Settlement::Battle(battle) = settlement else {
                return Ok(CasStep::Done(settlement));
            };
            if battle.rewards.is_some() {
                return Ok(CasStep::Done(Settlement::Battle(battle)));
            }

            let result = match battle.winner {
                Some(SlotId::Host1) => BattleResult::Decided {
                    winner: SlotId::Host1,
                    winner_score: battle.host1_score,
                    loser_score: battle.host2_score,
                },
                Some(SlotId::Host2) => BattleResult::Decided {
                    winner: SlotId::Host2,
                    winner_score: battle.host2_score,
                    loser_score: battle.host1_score,
                },
                None => BattleResult::Draw {
                    total_score: battle.host1_score + battle.host2_score,
                },
            };
            let split = policy.rewards(&result)?;

            let updated = Settlement::Battle(BattleSettlement {
                rewards: Some(split),
                ..battle
            });
            session.settlement = Some(updated.clone());

            match store.update(session_id, versioned.version, &session).await? {
                CommitOutcome::Committed(_) => Ok(CasStep::Done(updated)),
                CommitOutcome::Conflict => Ok(CasStep::Conflict),
            }
        })
        .await
    }
}
