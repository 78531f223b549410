//! Viewer contributions: battle gifts and commerce purchases
//!
//! Every contribution carries a caller-supplied idempotency key. The ledger
//! stores the applied result as a `ContributionReceipt` inside the aggregate,
//! so a replay (at-least-once delivery from the ingestion transport) returns
//! the original result instead of double-counting.

use crate::domain::session::SlotId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a contribution targets inside its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionTarget {
    BattleSlot(SlotId),
    Product(Uuid),
}

/// A single viewer action against a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionEvent {
    pub session_id: Uuid,
    pub actor_id: Uuid,
    pub target: ContributionTarget,
    pub quantity: u32,
    /// Value of one unit in minor currency units (gift value or unit price)
    pub unit_value: i64,
    pub idempotency_key: String,
}

impl ContributionEvent {
    /// Total contribution value: quantity × unit value
    pub fn value(&self) -> i64 {
        i64::from(self.quantity) * self.unit_value
    }
}

/// The counters an accepted contribution produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContributionOutcome {
    GiftApplied {
        slot: SlotId,
        /// The targeted slot's score right after this gift was applied
        slot_score: i64,
    },
    OrderPlaced {
        product_id: Uuid,
        units: u32,
        revenue: i64,
        /// Set on the one purchase that filled a flash sale to capacity
        sold_out: bool,
    },
    VoucherRedeemed {
        code: String,
        used_count: u32,
    },
}

/// Stored result of an applied contribution, returned verbatim on replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionReceipt {
    pub idempotency_key: String,
    pub actor_id: Uuid,
    pub applied_at: DateTime<Utc>,
    pub outcome: ContributionOutcome,
}
