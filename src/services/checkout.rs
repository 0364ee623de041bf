//! Checkout coordinator.
//!
//! Issues single-use checkout codes against the active sale. Issuance does
//! NOT consume inventory: over-issuance of codes beyond the cap is expected,
//! and the purchase step enforces scarcity.

use crate::error::{Result, SaleError};
use crate::models::Item;
use crate::services::items::ItemCatalog;
use crate::services::sales::SaleService;
use crate::stores::{CounterStore, NewCheckoutAttempt, RecordStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Regeneration attempts on a checkout-code collision.
pub const CODE_RETRY_MAX: usize = 3;

const USER_ID_MAX_LEN: usize = 100;

/// A successfully issued checkout code.
#[derive(Debug, Clone)]
pub struct CheckoutGrant {
    /// The single-use code binding this user to a prospective purchase.
    pub code: String,
    pub expires_at: DateTime<Utc>,
    /// Resolved item metadata, echoed to the client.
    pub item: Item,
}

/// Coordinator for the checkout flow.
pub struct CheckoutService<C, R> {
    counter: Arc<C>,
    record: Arc<R>,
    sales: Arc<SaleService<C, R>>,
    catalog: Arc<ItemCatalog>,
    code_ttl: Duration,
}

impl<C, R> CheckoutService<C, R>
where
    C: CounterStore + 'static,
    R: RecordStore + 'static,
{
    /// Create a new checkout coordinator.
    #[must_use]
    pub fn new(
        counter: Arc<C>,
        record: Arc<R>,
        sales: Arc<SaleService<C, R>>,
        catalog: Arc<ItemCatalog>,
        code_ttl_secs: i64,
    ) -> Self {
        Self {
            counter,
            record,
            sales,
            catalog,
            code_ttl: Duration::seconds(code_ttl_secs),
        }
    }

    /// Issue a checkout code for `user_id` and `item_id` against the active
    /// sale.
    ///
    /// The attempt is durable once the record-store insert succeeds; the
    /// counter-store cache is best-effort and its failure is only logged.
    ///
    /// # Errors
    ///
    /// - [`SaleError::InvalidInput`] on validation failure
    /// - [`SaleError::NoActiveSale`] when no sale is active
    /// - [`SaleError::SaleNotActive`] when outside the sale window
    /// - [`SaleError::CodeCollision`] if all regeneration attempts collide
    /// - store errors if the durable insert fails
    pub async fn checkout(&self, user_id: &str, item_id: &str) -> Result<CheckoutGrant> {
        validate_user_id(user_id)?;
        ItemCatalog::validate_item_id(item_id)?;

        let Some(sale) = self.sales.current_active_sale().await? else {
            return Err(SaleError::NoActiveSale);
        };

        let now = Utc::now();
        if !sale.window_contains(now) {
            return Err(SaleError::SaleNotActive);
        }

        let item = self.catalog.item_by_id(item_id)?;
        let expires_at = now + self.code_ttl;

        for _ in 0..CODE_RETRY_MAX {
            let code = generate_checkout_code(now);

            match self
                .record
                .create_attempt(NewCheckoutAttempt {
                    sale_id: sale.id,
                    user_id: user_id.to_string(),
                    item_id: item_id.to_string(),
                    code,
                    expires_at,
                })
                .await
            {
                Ok(attempt) => {
                    if let Err(e) = self
                        .counter
                        .cache_code(&attempt.code, sale.id, user_id, item_id)
                        .await
                    {
                        tracing::warn!(
                            code = %attempt.code,
                            error = %e,
                            "Failed to cache checkout code; record store has the attempt"
                        );
                    }

                    tracing::debug!(
                        sale_id = sale.id,
                        user_id = %user_id,
                        item_id = %item_id,
                        code = %attempt.code,
                        "Issued checkout code"
                    );

                    return Ok(CheckoutGrant {
                        code: attempt.code,
                        expires_at: attempt.expires_at,
                        item,
                    });
                }
                Err(SaleError::CodeCollision) => {
                    tracing::warn!(
                        sale_id = sale.id,
                        user_id = %user_id,
                        "Checkout code collision, regenerating"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(SaleError::CodeCollision)
    }
}

fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(SaleError::InvalidInput("user_id is required".to_string()));
    }

    if user_id.len() > USER_ID_MAX_LEN {
        return Err(SaleError::InvalidInput(format!(
            "user_id must be between 1 and {USER_ID_MAX_LEN} characters"
        )));
    }

    Ok(())
}

/// Generate a checkout code: `CHK_<8-hex>_<4-digit>`, with the hex drawn
/// from a fresh UUID and the digits from the timestamp. Collisions are
/// negligible at the stated throughput but still caught by the unique
/// constraint on insertion.
fn generate_checkout_code(now: DateTime<Utc>) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    let suffix = now.timestamp().rem_euclid(10_000);
    format!("CHK_{}_{suffix:04}", &uuid[..8])
}
