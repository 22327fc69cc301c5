use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::api::rest::envelope::ApiResponse;
use crate::error::AppError;
use crate::models::traveler::QuestionKey;
use crate::service::FileUpload;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/travelers/:id/files",
        post(upload_file).delete(delete_file),
    )
}

#[derive(Deserialize)]
pub struct FileQuery {
    pub field: String,
}

#[derive(Serialize)]
pub struct UploadedFile {
    pub path: String,
    pub message: &'static str,
}

async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Query(query): Query<FileQuery>,
) -> Result<ApiResponse<()>, AppError> {
    let category = QuestionKey::try_from(query.field)?;
    state.service.delete_question_file(id, category).await?;
    state.invalidate_listing().await;
    Ok(ApiResponse::message("File deleted successfully"))
}

/// Stores a multipart upload (`file` + `category`). I/O failures while
/// storing are reported inside the envelope with the underlying detail;
/// other failures propagate like every other endpoint.
async fn upload_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (category, file) = read_upload(multipart).await?;

    match state.service.upload_question_file(id, category, file).await {
        Ok(path) => {
            state
                .metrics
                .file_uploads_total
                .with_label_values(&["success"])
                .inc();
            state.invalidate_listing().await;
            Ok(ApiResponse::success(UploadedFile {
                path,
                message: "File uploaded successfully",
            })
            .into_response())
        }
        Err(AppError::Io(err)) => {
            state
                .metrics
                .file_uploads_total
                .with_label_values(&["io_error"])
                .inc();
            error!(traveler_id = id, error = %err, "failed to store uploaded file");
            Ok(ApiResponse::error(format!("Failed to upload file: {err}")).into_response())
        }
        Err(err) => Err(err),
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<(QuestionKey, FileUpload), AppError> {
    let mut category = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(format!("invalid multipart body: {err}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::BadRequest(format!("failed to read file: {err}")))?;
                file = Some(FileUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("category") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(format!("failed to read category: {err}")))?;
                category = Some(text);
            }
            _ => {}
        }
    }

    let category = category
        .ok_or_else(|| AppError::BadRequest("category is required".to_string()))?;
    let file = file.ok_or_else(|| AppError::BadRequest("file is required".to_string()))?;

    Ok((QuestionKey::try_from(category)?, file))
}
