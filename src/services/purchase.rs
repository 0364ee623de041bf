//! Purchase coordinator: the critical path.
//!
//! Resolves a checkout code to its attempt, takes the indivisible counter
//! decision, and finalizes durably inside a record-store transaction. No
//! distributed transaction spans the two stores: a record-store failure
//! after a successful counter decision is compensated by decrementing the
//! counters again, so the narrow failure window cannot under-sell.

use crate::error::{Result, SaleError};
use crate::models::{Item, Purchase};
use crate::services::items::ItemCatalog;
use crate::services::sales::SaleService;
use crate::stores::{
    CounterStore, FinalizeOutcome, NewPurchase, PurchaseOutcome, RecordStore,
};
use chrono::Utc;
use std::sync::Arc;

const CODE_MIN_LEN: usize = 5;
const CODE_MAX_LEN: usize = 50;

/// A completed purchase, as returned to the client.
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub purchase: Purchase,
    pub item: Item,
    /// The user's purchase count in this sale, after this purchase.
    pub user_purchases: i64,
}

/// Coordinator for the purchase flow.
pub struct PurchaseService<C, R> {
    counter: Arc<C>,
    record: Arc<R>,
    sales: Arc<SaleService<C, R>>,
    catalog: Arc<ItemCatalog>,
    inventory_max: i64,
    per_user_max: i64,
}

impl<C, R> PurchaseService<C, R>
where
    C: CounterStore + 'static,
    R: RecordStore + 'static,
{
    /// Create a new purchase coordinator.
    #[must_use]
    pub fn new(
        counter: Arc<C>,
        record: Arc<R>,
        sales: Arc<SaleService<C, R>>,
        catalog: Arc<ItemCatalog>,
        inventory_max: i64,
        per_user_max: i64,
    ) -> Self {
        Self {
            counter,
            record,
            sales,
            catalog,
            inventory_max,
            per_user_max,
        }
    }

    /// Consume a checkout code and complete the purchase.
    ///
    /// Once the counter decision succeeds, finalize-or-compensate always
    /// runs to completion on a detached task, even if the request future
    /// is cancelled or times out.
    ///
    /// # Errors
    ///
    /// - [`SaleError::InvalidInput`] / [`SaleError::InvalidCode`] /
    ///   [`SaleError::CodeExpired`] / [`SaleError::CodeAlreadyUsed`] on
    ///   code-state failures
    /// - [`SaleError::SaleNotActive`] when the attempt's sale is not the
    ///   active one or its window has elapsed
    /// - [`SaleError::SoldOut`] / [`SaleError::UserLimitExceeded`] from the
    ///   atomic decision
    /// - [`SaleError::Internal`] when finalization failed and the counters
    ///   were compensated
    pub async fn purchase(&self, code: &str) -> Result<PurchaseReceipt> {
        validate_code(code)?;

        let Some(attempt) = self.record.get_attempt_by_code(code).await? else {
            return Err(SaleError::InvalidCode);
        };

        if attempt.status != crate::models::AttemptStatus::Pending || attempt.purchased {
            return Err(SaleError::CodeAlreadyUsed);
        }

        let now = Utc::now();
        if now > attempt.expires_at {
            return Err(SaleError::CodeExpired);
        }

        // The elapsed-window check is authoritative even while the durable
        // active flag is still set.
        let sale = match self.sales.current_active_sale().await? {
            Some(sale) if sale.id == attempt.sale_id && sale.window_contains(now) => sale,
            _ => return Err(SaleError::SaleNotActive),
        };

        let item = self.catalog.item_by_id(&attempt.item_id)?;

        let decision = self
            .counter
            .atomic_purchase(sale.id, &attempt.user_id, self.inventory_max, self.per_user_max)
            .await?;

        match decision.outcome {
            PurchaseOutcome::SoldOut => {
                metrics::counter!("flashsale.purchase.sold_out").increment(1);
                return Err(SaleError::SoldOut);
            }
            PurchaseOutcome::UserLimit => {
                metrics::counter!("flashsale.purchase.user_limit").increment(1);
                return Err(SaleError::UserLimitExceeded {
                    user_count: decision.user_count,
                });
            }
            PurchaseOutcome::Success => {}
        }

        let new_purchase = NewPurchase {
            sale_id: sale.id,
            user_id: attempt.user_id.clone(),
            item_id: attempt.item_id.clone(),
            code: attempt.code.clone(),
            checkout_id: attempt.id,
            price: item.price,
        };

        // The finalize-or-compensate section runs on a detached task: a
        // cancelled or disconnected request cannot abandon it between the
        // counter decision and the durable write.
        let record = Arc::clone(&self.record);
        let counter = Arc::clone(&self.counter);
        let code_owned = code.to_string();
        let user_id = attempt.user_id.clone();
        let sale_id = sale.id;

        let finalized = tokio::spawn(async move {
            match record.finalize_purchase(&code_owned, new_purchase).await {
                Ok(FinalizeOutcome::Completed(purchase)) => {
                    // Advisory mirror of the durable terminal state.
                    if let Err(e) = counter.invalidate_code(&code_owned).await {
                        tracing::warn!(code = %code_owned, error = %e, "Failed to invalidate cached code");
                    }
                    Ok(purchase)
                }
                Ok(FinalizeOutcome::AlreadyUsed) => {
                    // Lost the row lock to a concurrent purchaser: this
                    // call's counter increment is excess and must be
                    // reversed.
                    compensate(&*counter, sale_id, &user_id, &code_owned).await;
                    Err(SaleError::CodeAlreadyUsed)
                }
                Err(e) => {
                    tracing::error!(
                        sale_id = sale_id,
                        user_id = %user_id,
                        code = %code_owned,
                        error = %e,
                        "Finalization failed after counter increment, compensating"
                    );
                    compensate(&*counter, sale_id, &user_id, &code_owned).await;
                    Err(SaleError::Internal(format!(
                        "purchase finalization failed: {e}"
                    )))
                }
            }
        })
        .await
        .map_err(|e| SaleError::Internal(format!("finalization task failed: {e}")))?;

        let purchase = finalized?;

        metrics::counter!("flashsale.purchase.completed").increment(1);
        tracing::info!(
            purchase_id = purchase.id,
            sale_id = sale.id,
            user_id = %purchase.user_id,
            sold = decision.sold,
            user_purchases = decision.user_count,
            "Purchase completed"
        );

        Ok(PurchaseReceipt {
            purchase,
            item,
            user_purchases: decision.user_count,
        })
    }
}

/// Best-effort counter compensation, recorded for offline reconciliation.
async fn compensate<C: CounterStore>(counter: &C, sale_id: i64, user_id: &str, code: &str) {
    match counter.compensate_purchase(sale_id, user_id).await {
        Ok((sold, user_count)) => {
            metrics::counter!("flashsale.purchase.compensated").increment(1);
            tracing::warn!(
                sale_id = sale_id,
                user_id = %user_id,
                code = %code,
                sold = sold,
                user_count = user_count,
                "Compensated counter increments"
            );
        }
        Err(e) => {
            tracing::error!(
                sale_id = sale_id,
                user_id = %user_id,
                code = %code,
                error = %e,
                "Compensation failed; sold counter remains high until reconciliation"
            );
        }
    }
}

fn validate_code(code: &str) -> Result<()> {
    if code.is_empty() {
        return Err(SaleError::InvalidInput(
            "checkout_code is required".to_string(),
        ));
    }

    if code.len() < CODE_MIN_LEN || code.len() > CODE_MAX_LEN {
        return Err(SaleError::InvalidInput(
            "invalid checkout_code format".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_length_bounds() {
        assert!(validate_code("").is_err());
        assert!(validate_code("CHK").is_err());
        assert!(validate_code(&"C".repeat(51)).is_err());
        assert!(validate_code("CHK_a1b2c3d4_0042").is_ok());
    }
}
