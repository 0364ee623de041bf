//! `POST /checkout` handler.

use crate::error::SaleError;
use crate::models::Item;
use crate::server::state::AppState;
use crate::server::WebResult;
use crate::stores::{CounterStore, RecordStore};
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Checkout request body. The same fields are accepted as query parameters
/// for easier manual testing; the body wins when both are present.
#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
}

/// Successful checkout response.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub success: bool,
    pub checkout_code: String,
    pub expires_at: DateTime<Utc>,
    pub item: Item,
    pub message: String,
}

/// Handle `POST /checkout`.
pub async fn handle_checkout<C, R>(
    State(state): State<AppState<C, R>>,
    Query(query): Query<CheckoutRequest>,
    body: Option<Json<CheckoutRequest>>,
) -> WebResult<Json<CheckoutResponse>>
where
    C: CounterStore + 'static,
    R: RecordStore + 'static,
{
    let Some(services) = state.services.as_ref() else {
        return Err(SaleError::Unavailable.into());
    };

    let body = body.map(|Json(b)| b).unwrap_or_default();
    let user_id = body.user_id.or(query.user_id).unwrap_or_default();
    let item_id = body.item_id.or(query.item_id).unwrap_or_default();

    let grant = services.checkout.checkout(&user_id, &item_id).await?;

    Ok(Json(CheckoutResponse {
        success: true,
        checkout_code: grant.code,
        expires_at: grant.expires_at,
        item: grant.item,
        message: "Checkout code generated successfully".to_string(),
    }))
}
