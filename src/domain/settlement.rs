//! Settlement payloads
//!
//! A settlement is computed exactly once, by whichever caller wins the
//! `active → ended` transition, and is immutable afterwards — with the single
//! exception of a reward backfill when the reward policy was unavailable at
//! settlement time.

use crate::domain::session::SlotId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Battle outcome handed to the reward policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BattleResult {
    Decided {
        winner: SlotId,
        winner_score: i64,
        loser_score: i64,
    },
    Draw {
        total_score: i64,
    },
}

/// Coin payouts decided by the configured reward policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSplit {
    pub winner_coins: i64,
    pub loser_coins: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleSettlement {
    /// None means the battle was a draw
    pub winner: Option<SlotId>,
    pub host1_score: i64,
    pub host2_score: i64,
    /// None when the reward policy failed at settlement time; the session is
    /// still terminal and the rewards can be backfilled later.
    pub rewards: Option<RewardSplit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub product_id: Uuid,
    pub orders: u64,
    pub units_sold: u64,
    pub revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommerceSettlement {
    pub total_revenue: i64,
    pub total_orders: u64,
    pub per_product_stats: Vec<ProductSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "settlement_kind", rename_all = "snake_case")]
pub enum Settlement {
    Battle(BattleSettlement),
    Commerce(CommerceSettlement),
}
