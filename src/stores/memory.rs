//! In-memory store implementations for testing.
//!
//! These mirror the Redis/PostgreSQL semantics behind a mutex: every
//! multi-step decision runs under one lock acquisition, which gives the same
//! serial ordering guarantee the Lua scripts and the row-lock transaction
//! provide in production.

use crate::error::{Result, SaleError};
use crate::models::{AttemptStatus, CheckoutAttempt, Purchase, PurchaseStatus, Sale};
use crate::stores::{
    CachedCode, CachedSale, CounterStore, FinalizeOutcome, NewCheckoutAttempt, NewPurchase,
    NewSale, PurchaseDecision, PurchaseOutcome, RecordStore,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct CounterState {
    sold: HashMap<i64, i64>,
    available: HashMap<i64, i64>,
    user_counts: HashMap<(String, i64), i64>,
    active_sale_id: Option<i64>,
    codes: HashMap<String, CachedCode>,
    sale_cache: HashMap<i64, CachedSale>,
}

/// In-memory [`CounterStore`] with the same decision semantics as the Lua
/// scripts. TTLs are not modeled; tests that need expiry drive it through
/// the durable `expires_at` instead.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCounterStore {
    state: Arc<Mutex<CounterState>>,
}

impl InMemoryCounterStore {
    /// Create an empty counter store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, CounterState>> {
        self.state
            .lock()
            .map_err(|_| SaleError::CounterStore("mutex poisoned".to_string()))
    }
}

impl CounterStore for InMemoryCounterStore {
    async fn setup_sale(&self, sale_id: i64, items_available: i64) -> Result<()> {
        let mut state = self.lock()?;
        state.sold.insert(sale_id, 0);
        state.available.insert(sale_id, items_available);
        state.active_sale_id = Some(sale_id);
        state.sale_cache.insert(
            sale_id,
            CachedSale {
                id: sale_id,
                available: items_available,
                sold: 0,
                active: true,
            },
        );
        Ok(())
    }

    async fn atomic_purchase(
        &self,
        sale_id: i64,
        user_id: &str,
        max_items: i64,
        max_user_items: i64,
    ) -> Result<PurchaseDecision> {
        let mut state = self.lock()?;

        let sold = state.sold.get(&sale_id).copied().unwrap_or(0);
        let user_key = (user_id.to_string(), sale_id);
        let user_count = state.user_counts.get(&user_key).copied().unwrap_or(0);

        if sold >= max_items {
            return Ok(PurchaseDecision {
                outcome: PurchaseOutcome::SoldOut,
                sold,
                user_count,
            });
        }

        if user_count >= max_user_items {
            return Ok(PurchaseDecision {
                outcome: PurchaseOutcome::UserLimit,
                sold,
                user_count,
            });
        }

        state.sold.insert(sale_id, sold + 1);
        state.user_counts.insert(user_key, user_count + 1);

        Ok(PurchaseDecision {
            outcome: PurchaseOutcome::Success,
            sold: sold + 1,
            user_count: user_count + 1,
        })
    }

    async fn compensate_purchase(&self, sale_id: i64, user_id: &str) -> Result<(i64, i64)> {
        let mut state = self.lock()?;

        let sold = state.sold.entry(sale_id).or_insert(0);
        if *sold > 0 {
            *sold -= 1;
        }
        let sold = *sold;

        let user_count = state
            .user_counts
            .entry((user_id.to_string(), sale_id))
            .or_insert(0);
        if *user_count > 0 {
            *user_count -= 1;
        }

        Ok((sold, *user_count))
    }

    async fn get_sold(&self, sale_id: i64) -> Result<i64> {
        Ok(self.lock()?.sold.get(&sale_id).copied().unwrap_or(0))
    }

    async fn get_user_count(&self, user_id: &str, sale_id: i64) -> Result<i64> {
        Ok(self
            .lock()?
            .user_counts
            .get(&(user_id.to_string(), sale_id))
            .copied()
            .unwrap_or(0))
    }

    async fn get_cached_sale(&self, sale_id: i64) -> Result<Option<CachedSale>> {
        Ok(self.lock()?.sale_cache.get(&sale_id).cloned())
    }

    async fn active_sale_id(&self) -> Result<Option<i64>> {
        Ok(self.lock()?.active_sale_id)
    }

    async fn set_active_sale_id(&self, sale_id: Option<i64>) -> Result<()> {
        self.lock()?.active_sale_id = sale_id;
        Ok(())
    }

    async fn cache_code(
        &self,
        code: &str,
        sale_id: i64,
        user_id: &str,
        item_id: &str,
    ) -> Result<()> {
        self.lock()?.codes.insert(
            code.to_string(),
            CachedCode {
                sale_id,
                user_id: user_id.to_string(),
                item_id: item_id.to_string(),
                used: false,
            },
        );
        Ok(())
    }

    async fn get_cached_code(&self, code: &str) -> Result<Option<CachedCode>> {
        Ok(self.lock()?.codes.get(code).cloned())
    }

    async fn invalidate_code(&self, code: &str) -> Result<()> {
        if let Some(entry) = self.lock()?.codes.get_mut(code) {
            entry.used = true;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecordState {
    sales: Vec<Sale>,
    attempts: Vec<CheckoutAttempt>,
    purchases: Vec<Purchase>,
    next_sale_id: i64,
    next_attempt_id: i64,
    next_purchase_id: i64,
    fail_next_finalize: bool,
}

/// In-memory [`RecordStore`] for tests.
///
/// `finalize_purchase` performs the pending re-check and both writes under
/// one lock acquisition, matching the production row-lock transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<Mutex<RecordState>>,
}

impl InMemoryRecordStore {
    /// Create an empty record store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RecordState>> {
        self.state
            .lock()
            .map_err(|_| SaleError::RecordStore("mutex poisoned".to_string()))
    }

    /// Make the next `finalize_purchase` call fail, for exercising the
    /// counter-compensation path.
    pub fn fail_next_finalize(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next_finalize = true;
        }
    }

    /// Snapshot of all recorded purchases.
    #[must_use]
    pub fn purchases(&self) -> Vec<Purchase> {
        self.state
            .lock()
            .map(|state| state.purchases.clone())
            .unwrap_or_default()
    }

    /// Snapshot of all sales.
    #[must_use]
    pub fn sales(&self) -> Vec<Sale> {
        self.state
            .lock()
            .map(|state| state.sales.clone())
            .unwrap_or_default()
    }

    /// Force an attempt's expiry into the past, for expiration tests.
    pub fn expire_attempt(&self, code: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(attempt) = state.attempts.iter_mut().find(|a| a.code == code) {
                attempt.expires_at = Utc::now() - chrono::Duration::seconds(1);
            }
        }
    }
}

impl RecordStore for InMemoryRecordStore {
    async fn create_sale(&self, sale: NewSale) -> Result<Sale> {
        let mut state = self.lock()?;
        state.next_sale_id += 1;
        let now = Utc::now();

        let sale = Sale {
            id: state.next_sale_id,
            start_time: sale.start_time,
            end_time: sale.end_time,
            items_available: sale.items_available,
            items_sold: 0,
            active: sale.active,
            created_at: now,
            updated_at: now,
        };
        state.sales.push(sale.clone());
        Ok(sale)
    }

    async fn get_active_sale(&self) -> Result<Option<Sale>> {
        let state = self.lock()?;
        Ok(state
            .sales
            .iter()
            .filter(|s| s.active)
            .max_by_key(|s| s.start_time)
            .cloned())
    }

    async fn get_sale(&self, sale_id: i64) -> Result<Option<Sale>> {
        let state = self.lock()?;
        Ok(state.sales.iter().find(|s| s.id == sale_id).cloned())
    }

    async fn update_items_sold(&self, sale_id: i64, items_sold: i64) -> Result<()> {
        let mut state = self.lock()?;
        let sale = state
            .sales
            .iter_mut()
            .find(|s| s.id == sale_id)
            .ok_or_else(|| SaleError::RecordStore(format!("sale {sale_id} not found")))?;
        sale.items_sold = items_sold;
        sale.updated_at = Utc::now();
        Ok(())
    }

    async fn activate_sale(&self, sale_id: i64) -> Result<()> {
        let mut state = self.lock()?;
        let sale = state
            .sales
            .iter_mut()
            .find(|s| s.id == sale_id)
            .ok_or_else(|| SaleError::RecordStore(format!("sale {sale_id} not found")))?;
        sale.active = true;
        sale.updated_at = Utc::now();
        Ok(())
    }

    async fn deactivate_sale(&self, sale_id: i64) -> Result<()> {
        let mut state = self.lock()?;
        let sale = state
            .sales
            .iter_mut()
            .find(|s| s.id == sale_id)
            .ok_or_else(|| SaleError::RecordStore(format!("sale {sale_id} not found")))?;
        sale.active = false;
        sale.updated_at = Utc::now();
        Ok(())
    }

    async fn create_attempt(&self, attempt: NewCheckoutAttempt) -> Result<CheckoutAttempt> {
        let mut state = self.lock()?;

        if state.attempts.iter().any(|a| a.code == attempt.code) {
            return Err(SaleError::CodeCollision);
        }

        state.next_attempt_id += 1;
        let now = Utc::now();

        let attempt = CheckoutAttempt {
            id: state.next_attempt_id,
            sale_id: attempt.sale_id,
            user_id: attempt.user_id,
            item_id: attempt.item_id,
            code: attempt.code,
            status: AttemptStatus::Pending,
            expires_at: attempt.expires_at,
            purchased: false,
            created_at: now,
            updated_at: now,
        };
        state.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt_by_code(&self, code: &str) -> Result<Option<CheckoutAttempt>> {
        let state = self.lock()?;
        Ok(state.attempts.iter().find(|a| a.code == code).cloned())
    }

    async fn finalize_purchase(
        &self,
        code: &str,
        purchase: NewPurchase,
    ) -> Result<FinalizeOutcome> {
        let mut state = self.lock()?;

        if state.fail_next_finalize {
            state.fail_next_finalize = false;
            return Err(SaleError::RecordStore(
                "injected finalization failure".to_string(),
            ));
        }

        state.next_purchase_id += 1;
        let purchase_id = state.next_purchase_id;
        let now = Utc::now();

        let attempt = state
            .attempts
            .iter_mut()
            .find(|a| a.code == code)
            .ok_or_else(|| {
                SaleError::RecordStore(format!(
                    "checkout attempt {code} disappeared before finalization"
                ))
            })?;

        if attempt.status != AttemptStatus::Pending || attempt.purchased {
            return Ok(FinalizeOutcome::AlreadyUsed);
        }

        attempt.status = AttemptStatus::Used;
        attempt.purchased = true;
        attempt.updated_at = now;

        let purchase = Purchase {
            id: purchase_id,
            sale_id: purchase.sale_id,
            user_id: purchase.user_id,
            item_id: purchase.item_id,
            code: purchase.code,
            checkout_id: purchase.checkout_id,
            price: purchase.price,
            status: PurchaseStatus::Completed,
            purchased_at: now,
            created_at: now,
        };
        state.purchases.push(purchase.clone());

        Ok(FinalizeOutcome::Completed(purchase))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn atomic_purchase_stops_at_caps() {
        let store = InMemoryCounterStore::new();
        store.setup_sale(1, 2).await.unwrap();

        let d1 = store.atomic_purchase(1, "u1", 2, 10).await.unwrap();
        assert_eq!(d1.outcome, PurchaseOutcome::Success);
        let d2 = store.atomic_purchase(1, "u1", 2, 10).await.unwrap();
        assert_eq!(d2.outcome, PurchaseOutcome::Success);
        let d3 = store.atomic_purchase(1, "u2", 2, 10).await.unwrap();
        assert_eq!(d3.outcome, PurchaseOutcome::SoldOut);
        assert_eq!(d3.sold, 2);
    }

    #[tokio::test]
    async fn compensation_floors_at_zero() {
        let store = InMemoryCounterStore::new();
        store.setup_sale(1, 10).await.unwrap();

        let (sold, user_count) = store.compensate_purchase(1, "u1").await.unwrap();
        assert_eq!((sold, user_count), (0, 0));

        store.atomic_purchase(1, "u1", 10, 10).await.unwrap();
        let (sold, user_count) = store.compensate_purchase(1, "u1").await.unwrap();
        assert_eq!((sold, user_count), (0, 0));
    }

    #[tokio::test]
    async fn setup_is_idempotent() {
        let store = InMemoryCounterStore::new();
        store.setup_sale(1, 100).await.unwrap();
        store.setup_sale(1, 100).await.unwrap();
        assert_eq!(store.get_sold(1).await.unwrap(), 0);
        assert_eq!(store.active_sale_id().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn setup_refreshes_the_sale_cache() {
        let store = InMemoryCounterStore::new();

        assert_eq!(store.get_cached_sale(1).await.unwrap(), None);

        store.setup_sale(1, 100).await.unwrap();
        let cached = store.get_cached_sale(1).await.unwrap().unwrap();
        assert_eq!(
            cached,
            CachedSale {
                id: 1,
                available: 100,
                sold: 0,
                active: true,
            }
        );
    }

    #[tokio::test]
    async fn code_cache_marks_used_in_place() {
        let store = InMemoryCounterStore::new();

        assert_eq!(store.get_cached_code("CHK_none_0000").await.unwrap(), None);

        store
            .cache_code("CHK_abcd1234_0001", 1, "u1", "item_a")
            .await
            .unwrap();
        let cached = store
            .get_cached_code("CHK_abcd1234_0001")
            .await
            .unwrap()
            .unwrap();
        assert!(!cached.used);
        assert_eq!(cached.sale_id, 1);

        store.invalidate_code("CHK_abcd1234_0001").await.unwrap();
        let cached = store
            .get_cached_code("CHK_abcd1234_0001")
            .await
            .unwrap()
            .unwrap();
        assert!(cached.used, "entry stays observable after invalidation");
    }

    #[tokio::test]
    async fn finalize_consumes_exactly_once() {
        let store = InMemoryRecordStore::new();
        let now = Utc::now();

        let sale = store
            .create_sale(NewSale {
                start_time: now,
                end_time: now + Duration::hours(1),
                items_available: 10,
                active: true,
            })
            .await
            .unwrap();

        let attempt = store
            .create_attempt(NewCheckoutAttempt {
                sale_id: sale.id,
                user_id: "u1".to_string(),
                item_id: "item_a".to_string(),
                code: "CHK_abcd1234_0001".to_string(),
                expires_at: now + Duration::minutes(10),
            })
            .await
            .unwrap();

        let purchase = NewPurchase {
            sale_id: sale.id,
            user_id: "u1".to_string(),
            item_id: "item_a".to_string(),
            code: attempt.code.clone(),
            checkout_id: attempt.id,
            price: 49.99,
        };

        let first = store
            .finalize_purchase(&attempt.code, purchase.clone())
            .await
            .unwrap();
        assert!(matches!(first, FinalizeOutcome::Completed(_)));

        let second = store
            .finalize_purchase(&attempt.code, purchase)
            .await
            .unwrap();
        assert!(matches!(second, FinalizeOutcome::AlreadyUsed));
        assert_eq!(store.purchases().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_code_is_a_collision() {
        let store = InMemoryRecordStore::new();
        let now = Utc::now();

        let sale = store
            .create_sale(NewSale {
                start_time: now,
                end_time: now + Duration::hours(1),
                items_available: 10,
                active: true,
            })
            .await
            .unwrap();

        let attempt = NewCheckoutAttempt {
            sale_id: sale.id,
            user_id: "u1".to_string(),
            item_id: "item_a".to_string(),
            code: "CHK_dupe0000_0001".to_string(),
            expires_at: now + Duration::minutes(10),
        };

        store.create_attempt(attempt.clone()).await.unwrap();
        assert_eq!(
            store.create_attempt(attempt).await.unwrap_err(),
            SaleError::CodeCollision
        );
    }
}
