//! Shared test harness: coordinators wired over the in-memory stores.

#![allow(dead_code)] // Each test binary uses a different subset of the harness

use flashsale::config::Config;
use flashsale::server::AppServices;
use flashsale::services::ItemCatalog;
use flashsale::stores::{InMemoryCounterStore, InMemoryRecordStore};
use std::sync::Arc;

pub struct TestHarness {
    pub services: AppServices<InMemoryCounterStore, InMemoryRecordStore>,
    pub counter: Arc<InMemoryCounterStore>,
    pub record: Arc<InMemoryRecordStore>,
    pub config: Arc<Config>,
}

/// Build coordinators over fresh in-memory stores with the given limits.
pub fn harness(inventory_max: i64, per_user_max: i64) -> TestHarness {
    let mut config = Config::from_env();
    config.sale.inventory_max = inventory_max;
    config.sale.per_user_max = per_user_max;
    let config = Arc::new(config);

    let counter = Arc::new(InMemoryCounterStore::new());
    let record = Arc::new(InMemoryRecordStore::new());
    let catalog = Arc::new(ItemCatalog::new());

    let services = AppServices::new(
        &config,
        Arc::clone(&counter),
        Arc::clone(&record),
        catalog,
    );

    TestHarness {
        services,
        counter,
        record,
        config,
    }
}
