//! Router configuration.

use super::health::{health_check, service_descriptor};
use super::state::AppState;
use crate::api;
use crate::stores::{CounterStore, RecordStore};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Routes:
/// - `GET /`: service descriptor
/// - `GET /health`: liveness check
/// - `POST /checkout`: issue a checkout code
/// - `POST /purchase`: consume a code and complete a purchase
pub fn build_router<C, R>(state: AppState<C, R>) -> Router
where
    C: CounterStore + 'static,
    R: RecordStore + 'static,
{
    Router::new()
        .route("/", get(service_descriptor))
        .route("/health", get(health_check))
        .route("/checkout", post(api::checkout::handle_checkout::<C, R>))
        .route("/purchase", post(api::purchase::handle_purchase::<C, R>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
