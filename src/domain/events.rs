//! Domain events emitted by the engine
//!
//! The engine pushes these to an `EventPublisher` and forgets about them;
//! real-time fan-out to viewers, push notifications and analytics are the
//! consumers' concern. Every state transition emits exactly one event.

use crate::domain::contribution::ContributionOutcome;
use crate::domain::settlement::Settlement;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionCreated {
        session_id: Uuid,
        livestream_id: Uuid,
    },
    SessionActivated {
        session_id: Uuid,
        activated_at: DateTime<Utc>,
    },
    SessionCancelled {
        session_id: Uuid,
    },
    SessionEnded {
        session_id: Uuid,
        settlement: Settlement,
    },
    ContributionApplied {
        session_id: Uuid,
        actor_id: Uuid,
        outcome: ContributionOutcome,
    },
    FlashSaleSoldOut {
        session_id: Uuid,
        product_id: Uuid,
    },
    ProductAdded {
        session_id: Uuid,
        product_id: Uuid,
    },
    ProductPinned {
        session_id: Uuid,
        product_id: Uuid,
    },
    VoucherCreated {
        session_id: Uuid,
        code: String,
    },
}

impl SessionEvent {
    /// Stable event name for logs and downstream topic routing
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionCreated { .. } => "session.created",
            SessionEvent::SessionActivated { .. } => "session.activated",
            SessionEvent::SessionCancelled { .. } => "session.cancelled",
            SessionEvent::SessionEnded { .. } => "session.ended",
            SessionEvent::ContributionApplied { .. } => "session.contribution_applied",
            SessionEvent::FlashSaleSoldOut { .. } => "session.flash_sale_sold_out",
            SessionEvent::ProductAdded { .. } => "session.product_added",
            SessionEvent::ProductPinned { .. } => "session.product_pinned",
            SessionEvent::VoucherCreated { .. } => "session.voucher_created",
        }
    }
}
