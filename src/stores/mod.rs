//! Store abstractions for the two-tier consistency model.
//!
//! The [`CounterStore`] owns real-time atomic counters (sold items, per-user
//! counts, the advisory active-sale pointer and the checkout-code cache). The
//! [`RecordStore`] owns the durable lifecycle of sales, checkout attempts and
//! purchases and is the source of truth for audit. When the two disagree, the
//! record store wins for lifecycle and identity; the counter store wins for
//! "how many sold right now".
//!
//! Traits are defined in the returned-future style so that implementations
//! can be plain `async fn`s and services stay generic over the backing store.

pub mod memory;
pub mod postgres;
pub mod redis;

pub use memory::{InMemoryCounterStore, InMemoryRecordStore};
pub use postgres::PostgresRecordStore;
pub use redis::RedisCounterStore;

use crate::error::Result;
use crate::models::{CheckoutAttempt, Purchase, Sale};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Outcome of the indivisible purchase decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// Both counters were incremented.
    Success,
    /// Global inventory cap reached; no mutation.
    SoldOut,
    /// Per-user cap reached; no mutation.
    UserLimit,
}

/// Result of [`CounterStore::atomic_purchase`].
///
/// On [`PurchaseOutcome::Success`] the counts are post-increment; otherwise
/// they are the unchanged values observed by the decision.
#[derive(Debug, Clone, Copy)]
pub struct PurchaseDecision {
    pub outcome: PurchaseOutcome,
    /// Items sold in this sale after the decision.
    pub sold: i64,
    /// This user's purchase count in this sale after the decision.
    pub user_count: i64,
}

/// Advisory checkout-code cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCode {
    pub sale_id: i64,
    pub user_id: String,
    pub item_id: String,
    /// Terminal state stays observable until the TTL elapses.
    pub used: bool,
}

/// Advisory sale-info cache entry, refreshed by [`CounterStore::setup_sale`]
/// and retained for the length of one sale window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSale {
    pub id: i64,
    pub available: i64,
    /// Sold count as of the last setup; the live value is the counter.
    pub sold: i64,
    pub active: bool,
}

/// Fast ephemeral counter store with indivisible scripted decisions.
///
/// Every multi-step decision executes server-side as a single script, so
/// concurrent callers observe a serial order and no partial state is ever
/// written. Script failures surface as retriable
/// [`SaleError::CounterStore`](crate::SaleError::CounterStore) errors.
pub trait CounterStore: Send + Sync {
    /// Initialize counters for a sale: `sold = 0`, `available`, and the
    /// active-sale pointer, all with the counter TTL. Also refreshes the
    /// advisory sale-info cache entry with a one-window TTL.
    ///
    /// Idempotent for the same `sale_id`; resets counters for a new one.
    fn setup_sale(
        &self,
        sale_id: i64,
        items_available: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// The heart of the system: check both caps and, only if both pass,
    /// increment both counters, indivisibly.
    fn atomic_purchase(
        &self,
        sale_id: i64,
        user_id: &str,
        max_items: i64,
        max_user_items: i64,
    ) -> impl Future<Output = Result<PurchaseDecision>> + Send;

    /// Best-effort reversal of a prior successful decision, used when the
    /// durable finalization fails. Decrements each counter only where it is
    /// above zero. Returns the counter values after compensation.
    fn compensate_purchase(
        &self,
        sale_id: i64,
        user_id: &str,
    ) -> impl Future<Output = Result<(i64, i64)>> + Send;

    /// Read-only sold-count snapshot; absent key reads as 0.
    fn get_sold(&self, sale_id: i64) -> impl Future<Output = Result<i64>> + Send;

    /// Read-only per-user count snapshot; absent key reads as 0.
    fn get_user_count(
        &self,
        user_id: &str,
        sale_id: i64,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Fetch the advisory sale-info cache entry, if present and unexpired.
    fn get_cached_sale(
        &self,
        sale_id: i64,
    ) -> impl Future<Output = Result<Option<CachedSale>>> + Send;

    /// The advisory active-sale pointer, if set.
    fn active_sale_id(&self) -> impl Future<Output = Result<Option<i64>>> + Send;

    /// Set or clear the advisory active-sale pointer.
    fn set_active_sale_id(
        &self,
        sale_id: Option<i64>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Cache a freshly issued checkout code with the code TTL.
    fn cache_code(
        &self,
        code: &str,
        sale_id: i64,
        user_id: &str,
        item_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch a cached checkout code, if present and unexpired.
    fn get_cached_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<CachedCode>>> + Send;

    /// Mark a cached code as used in place. Must not delete the entry: the
    /// terminal state stays observable until the TTL elapses.
    fn invalidate_code(&self, code: &str) -> impl Future<Output = Result<()>> + Send;

    /// Connectivity probe.
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Parameters for creating a sale row.
#[derive(Debug, Clone)]
pub struct NewSale {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub items_available: i64,
    pub active: bool,
}

/// Parameters for creating a checkout attempt (`status = pending`).
#[derive(Debug, Clone)]
pub struct NewCheckoutAttempt {
    pub sale_id: i64,
    pub user_id: String,
    pub item_id: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Parameters for recording a completed purchase.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub sale_id: i64,
    pub user_id: String,
    pub item_id: String,
    pub code: String,
    pub checkout_id: i64,
    pub price: f64,
}

/// Outcome of the durable purchase finalization transaction.
#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
    /// The attempt row was still pending; the purchase was recorded and the
    /// attempt marked consumed, atomically.
    Completed(Purchase),
    /// Another purchaser won the row lock first; nothing was written.
    AlreadyUsed,
}

/// Durable store of record for sales, checkout attempts and purchases.
pub trait RecordStore: Send + Sync {
    /// Insert a sale row and return it with its assigned identity.
    fn create_sale(&self, sale: NewSale) -> impl Future<Output = Result<Sale>> + Send;

    /// The most recent sale with `active = true`, if any.
    fn get_active_sale(&self) -> impl Future<Output = Result<Option<Sale>>> + Send;

    /// Fetch a sale by id.
    fn get_sale(&self, sale_id: i64) -> impl Future<Output = Result<Option<Sale>>> + Send;

    /// Reconcile the durable sold count with the counter store's value.
    fn update_items_sold(
        &self,
        sale_id: i64,
        items_sold: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Mark a sale active (admin / reconciliation path).
    fn activate_sale(&self, sale_id: i64) -> impl Future<Output = Result<()>> + Send;

    /// Mark a sale inactive.
    fn deactivate_sale(&self, sale_id: i64) -> impl Future<Output = Result<()>> + Send;

    /// Insert a checkout attempt. A code collision with an existing attempt
    /// surfaces as [`SaleError::CodeCollision`](crate::SaleError::CodeCollision)
    /// so the coordinator can regenerate.
    fn create_attempt(
        &self,
        attempt: NewCheckoutAttempt,
    ) -> impl Future<Output = Result<CheckoutAttempt>> + Send;

    /// Fetch a checkout attempt by code.
    fn get_attempt_by_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<CheckoutAttempt>>> + Send;

    /// Durable purchase finalization, as one transaction: lock the attempt
    /// row, re-check it is still pending, insert the purchase, and mark the
    /// attempt consumed. The row lock serializes all would-be consumers of a
    /// code; exactly one observes `pending` and wins.
    fn finalize_purchase(
        &self,
        code: &str,
        purchase: NewPurchase,
    ) -> impl Future<Output = Result<FinalizeOutcome>> + Send;

    /// Connectivity probe.
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;
}
