//! Hourly sale scheduler.
//!
//! A single background task: at startup it ensures a sale is active, then
//! sleeps to each wall-clock hour boundary and mints the next sale.
//! Failures are logged and the next tick retries. The stop signal is
//! honored cooperatively: an in-flight sale creation completes or errors
//! before the task exits.

use crate::services::sales::{hour_window, SaleService};
use crate::stores::{CounterStore, RecordStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Driver for the hourly sale lifecycle.
pub struct SaleScheduler<C, R> {
    sales: Arc<SaleService<C, R>>,
}

/// Handle to a running scheduler; dropping it leaves the task running,
/// [`SchedulerHandle::shutdown`] stops it cooperatively.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the scheduler to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Sale scheduler task failed during shutdown");
        }
    }
}

/// Time remaining until the next wall-clock hour boundary.
#[must_use]
pub fn time_until_next_hour(now: DateTime<Utc>) -> Duration {
    let (_, end) = hour_window(now);
    (end - now).to_std().unwrap_or(Duration::from_secs(1))
}

impl<C, R> SaleScheduler<C, R>
where
    C: CounterStore + 'static,
    R: RecordStore + 'static,
{
    /// Create a scheduler over the sale controller.
    #[must_use]
    pub fn new(sales: Arc<SaleService<C, R>>) -> Self {
        Self { sales }
    }

    /// Spawn the scheduler task.
    #[must_use]
    pub fn spawn(self) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!("Sale scheduler started");
            self.ensure_active_sale().await;

            loop {
                let wait = time_until_next_hour(Utc::now());

                tokio::select! {
                    () = tokio::time::sleep(wait) => {
                        match self.sales.create_hourly_sale().await {
                            Ok(sale) => {
                                info!(sale_id = sale.id, "Created hourly sale on schedule");
                            }
                            Err(e) => {
                                error!(error = %e, "Hourly sale creation failed, next tick will retry");
                            }
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            info!("Sale scheduler stopping");
                            break;
                        }
                    }
                }
            }
        });

        SchedulerHandle { stop_tx, task }
    }

    /// Create an initial sale if none is currently active.
    async fn ensure_active_sale(&self) {
        match self.sales.current_active_sale().await {
            Ok(Some(sale)) => {
                info!(sale_id = sale.id, "Found existing active sale");
            }
            Ok(None) => {
                info!("No active sale found, creating initial sale");
                if let Err(e) = self.sales.create_hourly_sale().await {
                    error!(error = %e, "Failed to create initial sale");
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to check for active sale");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{InMemoryCounterStore, InMemoryRecordStore, RecordStore};

    #[test]
    fn next_hour_is_at_most_one_hour_away() {
        let wait = time_until_next_hour(Utc::now());
        assert!(wait <= Duration::from_secs(3600));
        assert!(wait > Duration::ZERO);
    }

    #[tokio::test]
    async fn startup_creates_a_sale_when_none_active() {
        let counter = Arc::new(InMemoryCounterStore::new());
        let record = Arc::new(InMemoryRecordStore::new());
        let sales = Arc::new(SaleService::new(
            Arc::clone(&counter),
            Arc::clone(&record),
            100,
        ));

        let handle = SaleScheduler::new(Arc::clone(&sales)).spawn();

        // The startup path runs before the first boundary sleep; poll until
        // it has landed.
        for _ in 0..100 {
            if record.get_active_sale().await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let active = record.get_active_sale().await.unwrap();
        assert!(active.is_some(), "scheduler must mint the initial sale");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_cooperative() {
        let counter = Arc::new(InMemoryCounterStore::new());
        let record = Arc::new(InMemoryRecordStore::new());
        let sales = Arc::new(SaleService::new(counter, record, 100));

        let handle = SaleScheduler::new(sales).spawn();
        handle.shutdown().await;
    }
}
