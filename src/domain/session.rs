//! Session aggregate: battles and commerce sessions
//!
//! One `Session` holds everything a settlement needs: participant slots and
//! scores for battles, products/flash sales/vouchers and running totals for
//! commerce, plus the idempotency receipts that make contribution replay
//! harmless. Mutation goes through the service layer only; once a session is
//! terminal it is never written again (except a deferred reward backfill).

use crate::domain::contribution::ContributionReceipt;
use crate::domain::settlement::Settlement;
use crate::error::{Result, SessionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle status. Monotonic: there is no transition out of a terminal
/// status, and `settlement` is populated exactly when the status is `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Battle proposed, waiting for the challenged host to accept
    Pending,
    /// Commerce session created, waiting for the host to go live
    Scheduled,
    Active,
    Ended,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Cancelled)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
            SessionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Which side of a battle a gift targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotId {
    Host1,
    Host2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleSlot {
    pub host_id: Uuid,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleState {
    pub host1: BattleSlot,
    pub host2: BattleSlot,
}

impl BattleState {
    pub fn slot(&self, id: SlotId) -> &BattleSlot {
        match id {
            SlotId::Host1 => &self.host1,
            SlotId::Host2 => &self.host2,
        }
    }

    pub fn slot_mut(&mut self, id: SlotId) -> &mut BattleSlot {
        match id {
            SlotId::Host1 => &mut self.host1,
            SlotId::Host2 => &mut self.host2,
        }
    }
}

/// Voucher discount, percentage or fixed amount in minor currency units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discount {
    Percentage(u8),
    Fixed(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub code: String,
    pub discount: Discount,
    pub usage_limit: u32,
    pub used_count: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Voucher {
    /// Redeem one use. The ceiling is enforced here: a redemption that would
    /// push `used_count` past `usage_limit` is rejected, never clamped.
    pub fn redeem(&mut self, now: DateTime<Utc>) -> Result<()> {
        if let Some(expires_at) = self.expires_at {
            if now > expires_at {
                return Err(SessionError::VoucherExpired {
                    code: self.code.clone(),
                });
            }
        }
        if self.used_count >= self.usage_limit {
            return Err(SessionError::VoucherExhausted {
                code: self.code.clone(),
            });
        }
        self.used_count += 1;
        Ok(())
    }
}

/// Quantity-limited discounted offer attached to one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashSale {
    pub capacity_units: u32,
    pub reserved_units: u32,
    pub price_per_unit: i64,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

impl FlashSale {
    /// Atomically (under the aggregate's version guard) reserve `quantity`
    /// units. Returns `true` when this reservation is the one that fills the
    /// sale to exactly its capacity, so the caller can emit the sold-out
    /// notification exactly once.
    pub fn reserve(&mut self, product_id: Uuid, quantity: u32, now: DateTime<Utc>) -> Result<bool> {
        if let Some(start) = self.window_start {
            if now < start {
                return Err(SessionError::SaleWindowClosed(product_id));
            }
        }
        if let Some(end) = self.window_end {
            if now > end {
                return Err(SessionError::SaleWindowClosed(product_id));
            }
        }

        let available = self.capacity_units - self.reserved_units;
        if quantity > available {
            return Err(SessionError::CapacityExceeded {
                requested: quantity,
                available,
            });
        }

        self.reserved_units += quantity;
        Ok(self.reserved_units == self.capacity_units)
    }
}

/// Per-product counters accumulated over the session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductStats {
    pub orders: u64,
    pub units_sold: u64,
    pub revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProduct {
    pub product_id: Uuid,
    /// Special live pricing, overriding the catalog price for display
    pub live_price: Option<i64>,
    pub flash_sale: Option<FlashSale>,
    pub pinned: bool,
    pub showcased_at: DateTime<Utc>,
    pub stats: ProductStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommerceState {
    pub host_id: Uuid,
    pub store_id: Option<Uuid>,
    pub products: Vec<SessionProduct>,
    pub vouchers: Vec<Voucher>,
    pub total_orders: u64,
    pub total_revenue: i64,
}

impl CommerceState {
    pub fn product(&self, product_id: Uuid) -> Option<&SessionProduct> {
        self.products.iter().find(|p| p.product_id == product_id)
    }

    pub fn product_mut(&mut self, product_id: Uuid) -> Option<&mut SessionProduct> {
        self.products
            .iter_mut()
            .find(|p| p.product_id == product_id)
    }

    pub fn voucher(&self, code: &str) -> Option<&Voucher> {
        self.vouchers.iter().find(|v| v.code == code)
    }

    pub fn voucher_mut(&mut self, code: &str) -> Option<&mut Voucher> {
        self.vouchers.iter_mut().find(|v| v.code == code)
    }
}

/// Battle or commerce payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionKind {
    Battle(BattleState),
    Commerce(CommerceState),
}

/// The session aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub livestream_id: Uuid,
    pub status: SessionStatus,
    /// Time limit in milliseconds. Battles: fixed at creation. Commerce:
    /// optional, supplied at activation.
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub kind: SessionKind,
    /// Idempotency-key → applied result, for at-most-once contribution apply
    #[serde(default)]
    pub receipts: HashMap<String, ContributionReceipt>,
    pub settlement: Option<Settlement>,
}

impl Session {
    pub fn new_battle(
        host1_id: Uuid,
        host2_id: Uuid,
        livestream_id: Uuid,
        duration: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            livestream_id,
            status: SessionStatus::Pending,
            duration_ms: Some(duration.as_millis() as u64),
            created_at: Utc::now(),
            activated_at: None,
            ended_at: None,
            kind: SessionKind::Battle(BattleState {
                host1: BattleSlot {
                    host_id: host1_id,
                    score: 0,
                },
                host2: BattleSlot {
                    host_id: host2_id,
                    score: 0,
                },
            }),
            receipts: HashMap::new(),
            settlement: None,
        }
    }

    pub fn new_commerce(host_id: Uuid, store_id: Option<Uuid>, livestream_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            livestream_id,
            status: SessionStatus::Scheduled,
            duration_ms: None,
            created_at: Utc::now(),
            activated_at: None,
            ended_at: None,
            kind: SessionKind::Commerce(CommerceState {
                host_id,
                store_id,
                products: Vec::new(),
                vouchers: Vec::new(),
                total_orders: 0,
                total_revenue: 0,
            }),
            receipts: HashMap::new(),
            settlement: None,
        }
    }

    pub fn battle(&self) -> Option<&BattleState> {
        match &self.kind {
            SessionKind::Battle(b) => Some(b),
            SessionKind::Commerce(_) => None,
        }
    }

    pub fn battle_mut(&mut self) -> Option<&mut BattleState> {
        match &mut self.kind {
            SessionKind::Battle(b) => Some(b),
            SessionKind::Commerce(_) => None,
        }
    }

    pub fn commerce(&self) -> Option<&CommerceState> {
        match &self.kind {
            SessionKind::Commerce(c) => Some(c),
            SessionKind::Battle(_) => None,
        }
    }

    pub fn commerce_mut(&mut self) -> Option<&mut CommerceState> {
        match &mut self.kind {
            SessionKind::Commerce(c) => Some(c),
            SessionKind::Battle(_) => None,
        }
    }

    /// Whether `actor_id` hosts this session (either battle slot, or the
    /// commerce host). Viewers are never participants.
    pub fn is_participant(&self, actor_id: Uuid) -> bool {
        match &self.kind {
            SessionKind::Battle(b) => {
                b.host1.host_id == actor_id || b.host2.host_id == actor_id
            }
            SessionKind::Commerce(c) => c.host_id == actor_id,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_sale_rejects_over_capacity() {
        let product_id = Uuid::new_v4();
        let mut sale = FlashSale {
            capacity_units: 10,
            reserved_units: 8,
            price_per_unit: 500,
            window_start: None,
            window_end: None,
        };

        let err = sale.reserve(product_id, 3, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::SessionError::CapacityExceeded {
                requested: 3,
                available: 2
            }
        ));
        // Rejected, not clamped
        assert_eq!(sale.reserved_units, 8);
    }

    #[test]
    fn flash_sale_reports_sold_out_only_on_boundary() {
        let product_id = Uuid::new_v4();
        let mut sale = FlashSale {
            capacity_units: 10,
            reserved_units: 0,
            price_per_unit: 500,
            window_start: None,
            window_end: None,
        };

        assert!(!sale.reserve(product_id, 4, Utc::now()).unwrap());
        assert!(!sale.reserve(product_id, 4, Utc::now()).unwrap());
        assert!(sale.reserve(product_id, 2, Utc::now()).unwrap());
        assert_eq!(sale.reserved_units, 10);
    }

    #[test]
    fn flash_sale_respects_window() {
        let product_id = Uuid::new_v4();
        let now = Utc::now();
        let mut sale = FlashSale {
            capacity_units: 10,
            reserved_units: 0,
            price_per_unit: 500,
            window_start: None,
            window_end: Some(now - chrono::Duration::minutes(1)),
        };

        let err = sale.reserve(product_id, 1, now).unwrap_err();
        assert!(matches!(
            err,
            crate::error::SessionError::SaleWindowClosed(_)
        ));
    }

    #[test]
    fn voucher_ceiling_is_never_exceeded() {
        let mut voucher = Voucher {
            code: "LIVE10".into(),
            discount: Discount::Percentage(10),
            usage_limit: 2,
            used_count: 0,
            expires_at: None,
        };

        let now = Utc::now();
        voucher.redeem(now).unwrap();
        voucher.redeem(now).unwrap();
        let err = voucher.redeem(now).unwrap_err();
        assert!(matches!(
            err,
            crate::error::SessionError::VoucherExhausted { .. }
        ));
        assert_eq!(voucher.used_count, 2);
    }

    #[test]
    fn expired_voucher_is_rejected() {
        let now = Utc::now();
        let mut voucher = Voucher {
            code: "LATE".into(),
            discount: Discount::Fixed(100),
            usage_limit: 5,
            used_count: 0,
            expires_at: Some(now - chrono::Duration::hours(1)),
        };

        let err = voucher.redeem(now).unwrap_err();
        assert!(matches!(
            err,
            crate::error::SessionError::VoucherExpired { .. }
        ));
        assert_eq!(voucher.used_count, 0);
    }

    #[test]
    fn participant_check() {
        let host1 = Uuid::new_v4();
        let host2 = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        let session = Session::new_battle(
            host1,
            host2,
            Uuid::new_v4(),
            Duration::from_secs(300),
        );

        assert!(session.is_participant(host1));
        assert!(session.is_participant(host2));
        assert!(!session.is_participant(viewer));
    }
}
