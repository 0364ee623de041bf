//! Error types for sale, checkout and purchase operations.

use thiserror::Error;

/// Result type alias for flash-sale operations.
pub type Result<T> = std::result::Result<T, SaleError>;

/// Error taxonomy for the purchase coordination core.
///
/// Variants are grouped by where they surface: validation failures are local
/// to the request, sale/code state errors reflect the durable record, the
/// capacity errors come out of the atomic counter decision, and the store
/// variants wrap infrastructure failures with context.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SaleError {
    // ═══════════════════════════════════════════════════════════
    // Validation
    // ═══════════════════════════════════════════════════════════
    /// Request input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // ═══════════════════════════════════════════════════════════
    // Sale state
    // ═══════════════════════════════════════════════════════════
    /// No sale is currently active.
    #[error("no active sale at this time")]
    NoActiveSale,

    /// A sale exists but is outside its window or does not match the attempt.
    #[error("sale is not currently active")]
    SaleNotActive,

    // ═══════════════════════════════════════════════════════════
    // Checkout codes
    // ═══════════════════════════════════════════════════════════
    /// Checkout code does not exist.
    #[error("checkout code not found")]
    InvalidCode,

    /// Checkout code exists but its validity window has elapsed.
    #[error("checkout code has expired")]
    CodeExpired,

    /// Checkout code was already consumed by a purchase.
    #[error("checkout code has already been used")]
    CodeAlreadyUsed,

    /// Generated code collided with an existing one (unique constraint).
    #[error("checkout code collision")]
    CodeCollision,

    // ═══════════════════════════════════════════════════════════
    // Capacity
    // ═══════════════════════════════════════════════════════════
    /// Global inventory cap reached for this sale.
    #[error("sorry, this item is sold out")]
    SoldOut,

    /// Per-user purchase cap reached for this sale.
    #[error("purchase limit exceeded for this sale")]
    UserLimitExceeded {
        /// The user's current purchase count in this sale.
        user_count: i64,
    },

    // ═══════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════
    /// Counter store (Redis) operation failed. Retriable.
    #[error("counter store error: {0}")]
    CounterStore(String),

    /// Record store (PostgreSQL) operation failed.
    #[error("record store error: {0}")]
    RecordStore(String),

    /// A required backing store is not connected.
    #[error("service dependencies unavailable")]
    Unavailable,

    /// Anything that should not be exposed to users in detail.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SaleError {
    /// Machine-readable error kind for API responses.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NoActiveSale => "NO_ACTIVE_SALE",
            Self::SaleNotActive => "SALE_NOT_ACTIVE",
            Self::InvalidCode => "INVALID_CODE",
            Self::CodeExpired => "EXPIRED",
            Self::CodeAlreadyUsed => "ALREADY_USED",
            Self::SoldOut => "SOLD_OUT",
            Self::UserLimitExceeded { .. } => "USER_LIMIT_EXCEEDED",
            Self::Unavailable => "SERVICE_UNAVAILABLE",
            Self::CodeCollision
            | Self::CounterStore(_)
            | Self::RecordStore(_)
            | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns `true` if this error is due to the caller's request rather
    /// than a system failure.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flashsale::SaleError;
    /// assert!(SaleError::InvalidCode.is_user_error());
    /// assert!(!SaleError::CounterStore("down".into()).is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::NoActiveSale
                | Self::SaleNotActive
                | Self::InvalidCode
                | Self::CodeExpired
                | Self::CodeAlreadyUsed
                | Self::SoldOut
                | Self::UserLimitExceeded { .. }
        )
    }
}
