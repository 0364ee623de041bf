//! Domain models shared across stores, services and the HTTP surface.

use crate::error::SaleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A one-hour flash-sale window with a fixed inventory.
///
/// `items_available` is immutable after creation. `items_sold` is the
/// record-store snapshot and lags the counter store by at most the drift
/// threshold; real-time reads go through the counter store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    /// Sale identity (record-store primary key).
    pub id: i64,
    /// Inclusive start of the sale window.
    pub start_time: DateTime<Utc>,
    /// Exclusive end of the sale window.
    pub end_time: DateTime<Utc>,
    /// Inventory cap for this sale.
    pub items_available: i64,
    /// Reconciled sold count (authoritative count lives in the counter store).
    pub items_sold: i64,
    /// Lifecycle flag; at most one sale is active at a time.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    /// Whether `now` falls inside the `[start_time, end_time)` window.
    #[must_use]
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now < self.end_time
    }
}

/// Lifecycle state of a checkout attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    /// Issued, not yet consumed.
    Pending,
    /// Consumed by a successful purchase.
    Used,
    /// Validity window elapsed without a purchase.
    Expired,
}

impl AttemptStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Used => "used",
            Self::Expired => "expired",
        }
    }

    /// Parse the database representation.
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::RecordStore`] on an unknown status value.
    pub fn parse(s: &str) -> Result<Self, SaleError> {
        match s {
            "pending" => Ok(Self::Pending),
            "used" => Ok(Self::Used),
            "expired" => Ok(Self::Expired),
            other => Err(SaleError::RecordStore(format!(
                "unknown checkout attempt status: {other}"
            ))),
        }
    }
}

/// A user's durable checkout attempt, keyed by its globally unique code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutAttempt {
    pub id: i64,
    pub sale_id: i64,
    pub user_id: String,
    pub item_id: String,
    /// Single-use code in the `CHK_<8-hex>_<4-digit>` format.
    pub code: String,
    pub status: AttemptStatus,
    pub expires_at: DateTime<Utc>,
    /// Set together with `status = used` inside the purchase transaction.
    pub purchased: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Final state of a purchase row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Completed,
    Refunded,
    Cancelled,
}

impl PurchaseStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the database representation.
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::RecordStore`] on an unknown status value.
    pub fn parse(s: &str) -> Result<Self, SaleError> {
        match s {
            "completed" => Ok(Self::Completed),
            "refunded" => Ok(Self::Refunded),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(SaleError::RecordStore(format!(
                "unknown purchase status: {other}"
            ))),
        }
    }
}

/// A completed purchase; exactly one row exists per consumed code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: i64,
    pub sale_id: i64,
    pub user_id: String,
    pub item_id: String,
    pub code: String,
    pub checkout_id: i64,
    /// Item price captured at purchase time.
    pub price: f64,
    pub status: PurchaseStatus,
    pub purchased_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A purchasable item. Items are generated deterministically from their id
/// by the catalog rather than stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn window_is_half_open() {
        let start = Utc::now();
        let sale = Sale {
            id: 1,
            start_time: start,
            end_time: start + Duration::hours(1),
            items_available: 10_000,
            items_sold: 0,
            active: true,
            created_at: start,
            updated_at: start,
        };

        assert!(sale.window_contains(start));
        assert!(sale.window_contains(start + Duration::minutes(59)));
        assert!(!sale.window_contains(start + Duration::hours(1)));
        assert!(!sale.window_contains(start - Duration::seconds(1)));
    }

    #[test]
    fn attempt_status_round_trips() {
        for status in [
            AttemptStatus::Pending,
            AttemptStatus::Used,
            AttemptStatus::Expired,
        ] {
            assert_eq!(AttemptStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(AttemptStatus::parse("bogus").is_err());
    }

    #[test]
    fn purchase_status_round_trips() {
        for status in [
            PurchaseStatus::Completed,
            PurchaseStatus::Refunded,
            PurchaseStatus::Cancelled,
        ] {
            assert_eq!(PurchaseStatus::parse(status.as_str()).unwrap(), status);
        }
    }
}
