//! Service layer
//!
//! Business logic for live sessions:
//! - lifecycle transitions (challenge/accept/activate/cancel, showcase ops)
//! - the contribution and voucher ledgers (race-free counter accounting)
//! - exactly-once settlement and the deadline timers that trigger it
//! - collaborator seams (livestream directory, product catalog, reward
//!   policy, event publisher)

pub mod directory;
pub mod ledger;
pub mod lifecycle;
pub mod publisher;
pub mod retry;
pub mod rewards;
pub mod session_service;
pub mod settlement;
pub mod timers;
pub mod vouchers;

pub use directory::{
    LivestreamDirectory, LivestreamInfo, ProductCatalog, StaticCatalog, StaticDirectory,
};
pub use ledger::EventLedger;
pub use lifecycle::{FlashSaleSpec, ProductSpec, SessionLifecycle};
pub use publisher::{EventPublisher, LogPublisher, MemoryPublisher};
pub use rewards::{RateRewardPolicy, RewardPolicy};
pub use session_service::SessionService;
pub use settlement::{Actor, SettlementEngine};
pub use timers::{TimerHandle, TimerScheduler};
pub use vouchers::{VoucherLedger, VoucherSpec};
