//! `POST /purchase` handler.

use crate::error::SaleError;
use crate::models::Item;
use crate::server::state::AppState;
use crate::server::WebResult;
use crate::stores::{CounterStore, RecordStore};
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Purchase request body; `?code=` is accepted as a query fallback.
#[derive(Debug, Default, Deserialize)]
pub struct PurchaseRequest {
    #[serde(default)]
    pub checkout_code: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Successful purchase response.
#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub success: bool,
    pub purchase_id: i64,
    pub item: Item,
    pub total_price: f64,
    pub purchased_at: DateTime<Utc>,
    /// The user's purchase count in this sale, including this purchase.
    pub user_purchases: i64,
    pub message: String,
}

/// Handle `POST /purchase`.
pub async fn handle_purchase<C, R>(
    State(state): State<AppState<C, R>>,
    Query(query): Query<PurchaseRequest>,
    body: Option<Json<PurchaseRequest>>,
) -> WebResult<Json<PurchaseResponse>>
where
    C: CounterStore + 'static,
    R: RecordStore + 'static,
{
    let Some(services) = state.services.as_ref() else {
        return Err(SaleError::Unavailable.into());
    };

    let body = body.map(|Json(b)| b).unwrap_or_default();
    let code = body
        .checkout_code
        .or(body.code)
        .or(query.checkout_code)
        .or(query.code)
        .unwrap_or_default();

    let receipt = services.purchase.purchase(&code).await?;

    Ok(Json(PurchaseResponse {
        success: true,
        purchase_id: receipt.purchase.id,
        total_price: receipt.purchase.price,
        purchased_at: receipt.purchase.purchased_at,
        item: receipt.item,
        user_purchases: receipt.user_purchases,
        message: "Purchase completed successfully".to_string(),
    }))
}
