//! Flash-sale HTTP server.
//!
//! Starts even when a backing store is unreachable: store-backed endpoints
//! answer 503 and the sale scheduler stays off until both stores are
//! present at startup.

use flashsale::config::Config;
use flashsale::server::{build_router, shutdown_signal, AppServices, AppState};
use flashsale::services::{ItemCatalog, SaleScheduler};
use flashsale::stores::{PostgresRecordStore, RedisCounterStore};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flashsale=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting flash-sale server");

    let config = Arc::new(Config::from_env());
    info!(
        postgres_url = %config.postgres.url,
        redis_url = %config.redis.url,
        port = config.server.port,
        inventory_max = config.sale.inventory_max,
        per_user_max = config.sale.per_user_max,
        "Configuration loaded"
    );

    info!("Connecting to PostgreSQL record store...");
    let record = match PostgresRecordStore::connect(&config.postgres).await {
        Ok(store) => {
            if let Err(e) = store.run_migrations().await {
                warn!(error = %e, "Migrations failed; record store marked unavailable");
                None
            } else {
                info!("Record store connected");
                Some(Arc::new(store))
            }
        }
        Err(e) => {
            warn!(error = %e, "PostgreSQL connection failed; starting degraded");
            None
        }
    };

    info!("Connecting to Redis counter store...");
    let counter = match RedisCounterStore::connect(
        &config.redis,
        config.sale.counter_ttl_secs,
        config.sale.code_ttl_secs,
    )
    .await
    {
        Ok(store) => {
            info!("Counter store connected");
            Some(Arc::new(store))
        }
        Err(e) => {
            warn!(error = %e, "Redis connection failed; starting degraded");
            None
        }
    };

    let catalog = Arc::new(ItemCatalog::new());
    catalog.preload_common_items();

    let (state, scheduler) = match (counter, record) {
        (Some(counter), Some(record)) => {
            let services = AppServices::new(&config, counter, record, catalog);
            let scheduler = SaleScheduler::new(Arc::clone(&services.sales)).spawn();
            (AppState::new(Arc::clone(&config), services), Some(scheduler))
        }
        _ => {
            warn!("Skipping sale scheduler (stores not available)");
            (
                AppState::<RedisCounterStore, PostgresRecordStore>::degraded(Arc::clone(
                    &config,
                )),
                None,
            )
        }
    };

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        info!("Stopping sale scheduler...");
        scheduler.shutdown().await;
    }

    info!("Server exited");
    Ok(())
}
