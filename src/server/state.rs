//! Application state for the HTTP server.
//!
//! The state carries the coordinators behind `Arc`s and is cloned cheaply
//! per request. Services are optional: the server starts even when a
//! backing store is unreachable and degraded requests answer 503.

use crate::config::Config;
use crate::services::{
    CheckoutService, ItemCatalog, PurchaseService, SaleService,
};
use crate::stores::{CounterStore, RecordStore};
use std::sync::Arc;

/// The coordinator bundle, generic over the backing stores so tests can run
/// against the in-memory implementations.
pub struct AppServices<C: CounterStore, R: RecordStore> {
    pub sales: Arc<SaleService<C, R>>,
    pub checkout: Arc<CheckoutService<C, R>>,
    pub purchase: Arc<PurchaseService<C, R>>,
}

impl<C, R> AppServices<C, R>
where
    C: CounterStore + 'static,
    R: RecordStore + 'static,
{
    /// Wire the coordinators over a store pair.
    #[must_use]
    pub fn new(
        config: &Config,
        counter: Arc<C>,
        record: Arc<R>,
        catalog: Arc<ItemCatalog>,
    ) -> Self {
        let sales = Arc::new(SaleService::new(
            Arc::clone(&counter),
            Arc::clone(&record),
            config.sale.inventory_max,
        ));

        let checkout = Arc::new(CheckoutService::new(
            Arc::clone(&counter),
            Arc::clone(&record),
            Arc::clone(&sales),
            Arc::clone(&catalog),
            config.sale.code_ttl_secs,
        ));

        let purchase = Arc::new(PurchaseService::new(
            counter,
            record,
            Arc::clone(&sales),
            catalog,
            config.sale.inventory_max,
            config.sale.per_user_max,
        ));

        Self {
            sales,
            checkout,
            purchase,
        }
    }
}

impl<C: CounterStore, R: RecordStore> Clone for AppServices<C, R> {
    fn clone(&self) -> Self {
        Self {
            sales: Arc::clone(&self.sales),
            checkout: Arc::clone(&self.checkout),
            purchase: Arc::clone(&self.purchase),
        }
    }
}

/// Application state shared across all HTTP handlers.
pub struct AppState<C: CounterStore, R: RecordStore> {
    /// Configuration (for accessing settings in handlers)
    pub config: Arc<Config>,
    /// Coordinators; `None` when a backing store was unreachable at startup.
    pub services: Option<AppServices<C, R>>,
}

impl<C: CounterStore, R: RecordStore> AppState<C, R> {
    /// State with fully wired services.
    #[must_use]
    pub fn new(config: Arc<Config>, services: AppServices<C, R>) -> Self {
        Self {
            config,
            services: Some(services),
        }
    }

    /// Degraded state: the server answers health checks but store-backed
    /// endpoints return 503 until a restart with stores available.
    #[must_use]
    pub fn degraded(config: Arc<Config>) -> Self {
        Self {
            config,
            services: None,
        }
    }
}

impl<C: CounterStore, R: RecordStore> Clone for AppState<C, R> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            services: self.services.clone(),
        }
    }
}
