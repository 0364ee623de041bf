//! Sale lifecycle controller.
//!
//! Creates hourly sales, maintains the single-active-sale invariant in the
//! record store, keeps the counter store's advisory pointer fresh, and
//! opportunistically reconciles counter drift back into the durable row.

use crate::error::Result;
use crate::models::Sale;
use crate::stores::{CounterStore, NewSale, RecordStore};
use chrono::{DateTime, Duration, Timelike, Utc};
use std::sync::Arc;

/// Counter drift (in items) tolerated before the durable row is rewritten.
pub const DRIFT_THRESHOLD: i64 = 10;

/// Controller for sale creation, activation and status.
pub struct SaleService<C, R> {
    counter: Arc<C>,
    record: Arc<R>,
    inventory_max: i64,
}

/// The `[start, end)` hour window containing `now`.
#[must_use]
pub fn hour_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    (start, start + Duration::hours(1))
}

impl<C, R> SaleService<C, R>
where
    C: CounterStore + 'static,
    R: RecordStore + 'static,
{
    /// Create a new sale controller.
    #[must_use]
    pub fn new(counter: Arc<C>, record: Arc<R>, inventory_max: i64) -> Self {
        Self {
            counter,
            record,
            inventory_max,
        }
    }

    /// Create the sale for the current hour and make it the active one.
    ///
    /// Deactivating the previous sale is best-effort; a failure there is
    /// logged and creation continues. If counter setup fails after the row
    /// was inserted, the row is deactivated again and the error surfaces.
    ///
    /// # Errors
    ///
    /// Returns a store error if the sale row cannot be created or counter
    /// setup fails.
    pub async fn create_hourly_sale(&self) -> Result<Sale> {
        let (start_time, end_time) = hour_window(Utc::now());

        if let Err(e) = self.deactivate_current().await {
            tracing::warn!(error = %e, "Failed to deactivate existing sales, continuing");
        }

        let sale = self
            .record
            .create_sale(NewSale {
                start_time,
                end_time,
                items_available: self.inventory_max,
                active: true,
            })
            .await?;

        if let Err(e) = self.counter.setup_sale(sale.id, sale.items_available).await {
            tracing::error!(
                sale_id = sale.id,
                error = %e,
                "Counter setup failed, rolling back sale activation"
            );
            if let Err(rollback_err) = self.record.deactivate_sale(sale.id).await {
                tracing::error!(
                    sale_id = sale.id,
                    error = %rollback_err,
                    "Rollback deactivation failed; sale row left active without counters"
                );
            }
            return Err(e);
        }

        tracing::info!(
            sale_id = sale.id,
            start_time = %sale.start_time,
            end_time = %sale.end_time,
            items_available = sale.items_available,
            "Created new flash sale"
        );

        Ok(sale)
    }

    /// The currently active sale, if any.
    ///
    /// Fast path: counter-store pointer, verified against the record store.
    /// Fallback: record-store partial-index query, refreshing the pointer.
    ///
    /// # Errors
    ///
    /// Returns a record-store error only when the fallback query fails;
    /// counter-store failures degrade to the fallback with a warning.
    pub async fn current_active_sale(&self) -> Result<Option<Sale>> {
        match self.counter.active_sale_id().await {
            Ok(Some(sale_id)) => match self.record.get_sale(sale_id).await {
                Ok(Some(sale)) if sale.active => {
                    self.spawn_drift_reconciliation(&sale);
                    return Ok(Some(sale));
                }
                Ok(_) => {
                    // Stale pointer; fall through to the durable query.
                }
                Err(e) => {
                    tracing::warn!(sale_id = sale_id, error = %e, "Failed to verify pointed-at sale");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read active sale pointer");
            }
        }

        let Some(sale) = self.record.get_active_sale().await? else {
            return Ok(None);
        };

        if let Err(e) = self.counter.set_active_sale_id(Some(sale.id)).await {
            tracing::warn!(sale_id = sale.id, error = %e, "Failed to refresh active sale pointer");
        }

        Ok(Some(sale))
    }

    /// Activate a specific sale (admin / reconciliation path).
    ///
    /// # Errors
    ///
    /// Returns a store error if the sale does not exist or either store
    /// rejects the activation.
    pub async fn activate_sale(&self, sale_id: i64) -> Result<Sale> {
        self.deactivate_current().await?;

        let Some(sale) = self.record.get_sale(sale_id).await? else {
            return Err(crate::SaleError::RecordStore(format!(
                "sale {sale_id} not found"
            )));
        };

        self.record.activate_sale(sale_id).await?;
        self.counter.setup_sale(sale_id, sale.items_available).await?;

        tracing::info!(sale_id = sale_id, "Activated sale");
        Ok(Sale {
            active: true,
            ..sale
        })
    }

    /// Deactivate a specific sale, clearing the pointer if it points here.
    ///
    /// # Errors
    ///
    /// Returns a record-store error if the row update fails.
    pub async fn deactivate_sale(&self, sale_id: i64) -> Result<()> {
        self.record.deactivate_sale(sale_id).await?;

        match self.counter.active_sale_id().await {
            Ok(Some(active_id)) if active_id == sale_id => {
                if let Err(e) = self.counter.set_active_sale_id(None).await {
                    tracing::warn!(sale_id = sale_id, error = %e, "Failed to clear active sale pointer");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(sale_id = sale_id, error = %e, "Failed to read active sale pointer");
            }
        }

        tracing::info!(sale_id = sale_id, "Deactivated sale");
        Ok(())
    }

    /// Sale status with `items_sold` overridden by the real-time counter
    /// when the counter store is reachable.
    ///
    /// # Errors
    ///
    /// Returns a record-store error if the row cannot be fetched.
    pub async fn sale_status(&self, sale_id: i64) -> Result<Option<Sale>> {
        let Some(mut sale) = self.record.get_sale(sale_id).await? else {
            return Ok(None);
        };

        match self.counter.get_sold(sale_id).await {
            Ok(sold) => sale.items_sold = sold,
            Err(e) => {
                tracing::warn!(
                    sale_id = sale_id,
                    error = %e,
                    "Failed to get real-time sold count, using durable value"
                );
            }
        }

        Ok(Some(sale))
    }

    /// Real-time sold count, falling back to the durable row.
    ///
    /// # Errors
    ///
    /// Returns a record-store error if both stores fail to answer.
    pub async fn sale_items_sold(&self, sale_id: i64) -> Result<i64> {
        match self.counter.get_sold(sale_id).await {
            Ok(sold) => Ok(sold),
            Err(e) => {
                tracing::warn!(sale_id = sale_id, error = %e, "Counter read failed, falling back to record store");
                let sale = self.record.get_sale(sale_id).await?.ok_or_else(|| {
                    crate::SaleError::RecordStore(format!("sale {sale_id} not found"))
                })?;
                Ok(sale.items_sold)
            }
        }
    }

    async fn deactivate_current(&self) -> Result<()> {
        if let Some(active) = self.record.get_active_sale().await? {
            self.record.deactivate_sale(active.id).await?;
        }
        Ok(())
    }

    /// The record store lags the counters by design; when the gap exceeds
    /// the threshold, write the counter value back without blocking the
    /// caller.
    fn spawn_drift_reconciliation(&self, sale: &Sale) {
        let counter = Arc::clone(&self.counter);
        let record = Arc::clone(&self.record);
        let sale_id = sale.id;
        let recorded_sold = sale.items_sold;

        tokio::spawn(async move {
            let sold = match counter.get_sold(sale_id).await {
                Ok(sold) => sold,
                Err(e) => {
                    tracing::warn!(sale_id = sale_id, error = %e, "Drift check failed");
                    return;
                }
            };

            if (sold - recorded_sold).abs() <= DRIFT_THRESHOLD {
                return;
            }

            match record.update_items_sold(sale_id, sold).await {
                Ok(()) => {
                    tracing::info!(
                        sale_id = sale_id,
                        from = recorded_sold,
                        to = sold,
                        "Reconciled sold count into record store"
                    );
                }
                Err(e) => {
                    tracing::warn!(sale_id = sale_id, error = %e, "Drift reconciliation failed");
                }
            }
        });
    }
}
