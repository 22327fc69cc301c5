use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::api::rest::envelope::ApiResponse;
use crate::cache::{CacheError, LISTING_KEY};
use crate::error::AppError;
use crate::models::traveler::{FieldUpdates, FieldValue, QuestionKey, Traveler, TravelerField};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/travelers", post(create_traveler).get(list_travelers))
        .route("/travelers/find-by-passport", get(find_by_passport))
        .route("/travelers/get_form_data", get(get_form_data))
        .route("/travelers/get_full_data", get(get_full_data))
        .route(
            "/travelers/:id",
            get(get_traveler).patch(update_field).delete(delete_traveler),
        )
        .route("/travelers/:id/bulk", patch(update_fields))
        .route("/travelers/:id/lock-status", post(set_lock_status))
        .route("/travelers/:id/questions", patch(update_question_field))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub summary: bool,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    50
}

#[derive(Deserialize)]
pub struct IdQuery {
    pub id: u64,
}

#[derive(Deserialize)]
pub struct PassportQuery {
    pub passport_no: String,
}

/// Body of the single-field and question-field endpoints. Both entries
/// accept any JSON scalar and are stored as text.
#[derive(Deserialize)]
pub struct UpdateFieldRequest {
    #[serde(default)]
    pub field: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
}

impl UpdateFieldRequest {
    fn into_parts(self) -> Result<(String, String), AppError> {
        let field = scalar_text("field", self.field)?;
        if field.is_empty() {
            return Err(AppError::BadRequest("field is required".to_string()));
        }
        Ok((field, scalar_text("value", self.value)?))
    }
}

fn scalar_text(name: &str, value: Option<Value>) -> Result<String, AppError> {
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(text)) => Ok(text),
        Some(Value::Number(number)) => Ok(number.to_string()),
        Some(Value::Bool(flag)) => Ok(flag.to_string()),
        Some(Value::Array(_) | Value::Object(_)) => {
            Err(AppError::BadRequest(format!("{name} must be a scalar")))
        }
    }
}

/// `locked` may be a number or a numeric string; only 1 locks.
#[derive(Deserialize)]
pub struct LockStatusRequest {
    #[serde(default)]
    pub locked: Option<Value>,
}

impl LockStatusRequest {
    fn is_locked(&self) -> Result<bool, AppError> {
        let invalid = || AppError::BadRequest("locked must be an integer".to_string());
        let flag = match &self.locked {
            None | Some(Value::Null) => 0,
            Some(Value::Number(number)) => number.as_i64().ok_or_else(invalid)?,
            Some(Value::String(text)) => text.trim().parse::<i64>().map_err(|_| invalid())?,
            Some(_) => return Err(invalid()),
        };
        Ok(flag == 1)
    }
}

#[derive(Serialize)]
pub struct CreatedTraveler {
    pub id: u64,
}

#[derive(Serialize)]
pub struct LockStatus {
    pub locked: bool,
}

async fn create_traveler(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse<CreatedTraveler>, AppError> {
    let id = state.service.create_traveler().await?;
    state.invalidate_listing().await;
    Ok(ApiResponse::success(CreatedTraveler { id }))
}

/// Serves the full listing from the response cache. Paging parameters are
/// accepted but the cached artifact always holds every traveler. Any
/// failure is a bare 500.
async fn list_travelers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    debug!(
        page = params.page,
        limit = params.limit,
        summary = params.summary,
        "listing travelers"
    );

    let service = state.service.clone();
    let fetch_limit = state.list_fetch_limit;
    let result = state
        .cache
        .get_or_compute(LISTING_KEY, || async move {
            let travelers = service.list_travelers(1, fetch_limit, false).await?;
            Ok::<_, CacheError>(serde_json::to_vec(&ApiResponse::success(travelers))?)
        })
        .await;

    match result {
        Ok((outcome, body)) => {
            state
                .metrics
                .listing_cache_lookups_total
                .with_label_values(&[outcome.as_str()])
                .inc();
            ([(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        Err(err) => {
            error!(error = %err, "failed to serve traveler listing");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_traveler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<ApiResponse<Traveler>, AppError> {
    let traveler = state.service.get_traveler(id).await?;
    Ok(ApiResponse::success(traveler))
}

async fn update_field(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    payload: Result<Json<UpdateFieldRequest>, JsonRejection>,
) -> Result<ApiResponse<()>, AppError> {
    let Json(payload) = payload?;
    let (field, value) = payload.into_parts()?;
    let field: TravelerField = field.parse()?;

    state
        .service
        .update_field(id, field, FieldValue::Text(value))
        .await?;
    state.invalidate_listing().await;
    Ok(ApiResponse::message("Field updated successfully"))
}

async fn update_fields(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<ApiResponse<()>, AppError> {
    let Json(payload) = payload?;
    let updates = match payload {
        Value::Object(mut body) => match body.remove("updates") {
            Some(Value::Object(updates)) => updates,
            _ => {
                return Err(AppError::BadRequest(
                    "updates object is required".to_string(),
                ));
            }
        },
        _ => return Err(AppError::BadRequest("expected a JSON object".to_string())),
    };
    let updates = FieldUpdates::from_json(updates)?;

    state.service.update_fields(id, updates).await?;
    state.invalidate_listing().await;
    Ok(ApiResponse::message("Fields updated successfully"))
}

async fn delete_traveler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<ApiResponse<()>, AppError> {
    state.service.delete_traveler(id).await?;
    state.invalidate_listing().await;
    Ok(ApiResponse::message("Traveler deleted successfully"))
}

async fn find_by_passport(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PassportQuery>,
) -> Result<ApiResponse<Traveler>, AppError> {
    match state.service.find_by_passport(&query.passport_no).await? {
        Some(traveler) => Ok(ApiResponse::success(traveler)),
        None => Ok(ApiResponse::NotFound),
    }
}

async fn get_form_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<ApiResponse<Traveler>, AppError> {
    let traveler = state.service.get_traveler(query.id).await?;
    Ok(ApiResponse::success(traveler))
}

async fn get_full_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<ApiResponse<Traveler>, AppError> {
    let traveler = state.service.get_traveler(query.id).await?;
    Ok(ApiResponse::success(traveler))
}

async fn set_lock_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    payload: Result<Json<LockStatusRequest>, JsonRejection>,
) -> Result<ApiResponse<LockStatus>, AppError> {
    let Json(payload) = payload?;
    let locked = payload.is_locked()?;
    state.service.set_lock_status(id, locked).await?;
    state.invalidate_listing().await;
    Ok(ApiResponse::success(LockStatus { locked }))
}

async fn update_question_field(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    payload: Result<Json<UpdateFieldRequest>, JsonRejection>,
) -> Result<ApiResponse<()>, AppError> {
    let Json(payload) = payload?;
    let (field, value) = payload.into_parts()?;
    let field = QuestionKey::try_from(field)?;

    state.service.update_question_field(id, field, value).await?;
    state.invalidate_listing().await;
    Ok(ApiResponse::message("Question field updated successfully"))
}
