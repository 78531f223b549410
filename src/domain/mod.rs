//! Domain model for live sessions
//!
//! Plain serde types shared by the stores and the service layer. The whole
//! aggregate is serialized as one document, so every field here must stay
//! backward-compatible with what the postgres store already persisted.

pub mod contribution;
pub mod events;
pub mod session;
pub mod settlement;

pub use contribution::{
    ContributionEvent, ContributionOutcome, ContributionReceipt, ContributionTarget,
};
pub use events::SessionEvent;
pub use session::{
    BattleState, BattleSlot, CommerceState, Discount, FlashSale, ProductStats, Session,
    SessionKind, SessionProduct, SessionStatus, SlotId, Voucher,
};
pub use settlement::{
    BattleResult, BattleSettlement, CommerceSettlement, ProductSummary, RewardSplit, Settlement,
};
