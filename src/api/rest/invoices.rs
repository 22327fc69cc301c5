use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::api::rest::envelope::ApiResponse;
use crate::error::AppError;
use crate::models::invoice::{Invoice, SaveInvoiceRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/travelers/save_invoice", post(save_invoice))
        .route("/travelers/get_invoice", get(get_invoice))
        .route("/travelers/save-all-invoices", post(save_all_invoices))
}

#[derive(Deserialize)]
pub struct InvoiceQuery {
    pub traveler_id: u64,
}

async fn save_invoice(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SaveInvoiceRequest>, JsonRejection>,
) -> Result<ApiResponse<Invoice>, AppError> {
    let Json(payload) = payload?;
    let invoice = state.service.save_invoice(payload).await?;
    state.invalidate_listing().await;
    Ok(ApiResponse::success_with_message(invoice, "Invoice saved"))
}

async fn get_invoice(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InvoiceQuery>,
) -> Result<ApiResponse<Invoice>, AppError> {
    let invoice = state.service.get_invoice(query.traveler_id).await?;
    Ok(ApiResponse::success(invoice))
}

async fn save_all_invoices(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse<Map<String, Value>>, AppError> {
    let result = state.service.save_all_invoices().await?;
    state.invalidate_listing().await;

    let message = result
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::Internal("bulk invoice result is missing a message".to_string())
        })?;

    Ok(ApiResponse::success_with_message(result, message))
}
