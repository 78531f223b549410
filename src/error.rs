/// Error types for the live session engine
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Capacity exceeded: requested {requested} units, {available} available")]
    CapacityExceeded { requested: u32, available: u32 },

    #[error("Voucher {code} usage limit reached")]
    VoucherExhausted { code: String },

    #[error("Voucher {code} has expired")]
    VoucherExpired { code: String },

    #[error("Flash sale window closed for product {0}")]
    SaleWindowClosed(Uuid),

    #[error("Timer already scheduled for session {0}")]
    DuplicateTimer(Uuid),

    #[error("Write contention on session {session_id}: gave up after {attempts} attempts")]
    Contention { session_id: Uuid, attempts: u32 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SessionError {
    /// Whether a caller may safely retry the operation as-is.
    ///
    /// Only contention and transient database failures qualify; every other
    /// variant reports a decision that will not change on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Contention { .. } => true,
            SessionError::Database(e) => {
                matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed)
            }
            _ => false,
        }
    }
}
