#![allow(dead_code)]

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use serde_json::{Map, Value};
use tempfile::TempDir;

use traveler_api::api::rest::router;
use traveler_api::cache::ResponseCache;
use traveler_api::error::AppError;
use traveler_api::models::invoice::{Invoice, SaveInvoiceRequest};
use traveler_api::models::traveler::{
    FieldUpdates, FieldValue, QuestionKey, Traveler, TravelerField, TravelerListItem,
};
use traveler_api::service::{FileUpload, InMemoryTravelerService, TravelerService};
use traveler_api::state::AppState;

pub const BOUNDARY: &str = "traveler-test-boundary";

/// Wraps the in-memory service, counting listing fetches and optionally
/// injecting failures.
pub struct InstrumentedService {
    inner: InMemoryTravelerService,
    pub list_calls: AtomicUsize,
    pub fail_list: AtomicBool,
    pub fail_uploads: AtomicBool,
}

impl InstrumentedService {
    pub fn new(upload_dir: &Path) -> Self {
        Self {
            inner: InMemoryTravelerService::new(upload_dir),
            list_calls: AtomicUsize::new(0),
            fail_list: AtomicBool::new(false),
            fail_uploads: AtomicBool::new(false),
        }
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TravelerService for InstrumentedService {
    async fn create_traveler(&self) -> Result<u64, AppError> {
        self.inner.create_traveler().await
    }

    async fn list_travelers(
        &self,
        page: usize,
        limit: usize,
        summary: bool,
    ) -> Result<Vec<TravelerListItem>, AppError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(AppError::Internal("database unavailable".to_string()));
        }
        self.inner.list_travelers(page, limit, summary).await
    }

    async fn get_traveler(&self, id: u64) -> Result<Traveler, AppError> {
        self.inner.get_traveler(id).await
    }

    async fn update_field(
        &self,
        id: u64,
        field: TravelerField,
        value: FieldValue,
    ) -> Result<(), AppError> {
        self.inner.update_field(id, field, value).await
    }

    async fn update_fields(&self, id: u64, updates: FieldUpdates) -> Result<(), AppError> {
        self.inner.update_fields(id, updates).await
    }

    async fn delete_traveler(&self, id: u64) -> Result<(), AppError> {
        self.inner.delete_traveler(id).await
    }

    async fn find_by_passport(&self, passport_no: &str) -> Result<Option<Traveler>, AppError> {
        self.inner.find_by_passport(passport_no).await
    }

    async fn set_lock_status(&self, id: u64, locked: bool) -> Result<(), AppError> {
        self.inner.set_lock_status(id, locked).await
    }

    async fn save_invoice(&self, request: SaveInvoiceRequest) -> Result<Invoice, AppError> {
        self.inner.save_invoice(request).await
    }

    async fn get_invoice(&self, traveler_id: u64) -> Result<Invoice, AppError> {
        self.inner.get_invoice(traveler_id).await
    }

    async fn save_all_invoices(&self) -> Result<Map<String, Value>, AppError> {
        self.inner.save_all_invoices().await
    }

    async fn update_question_field(
        &self,
        id: u64,
        field: QuestionKey,
        value: String,
    ) -> Result<(), AppError> {
        self.inner.update_question_field(id, field, value).await
    }

    async fn delete_question_file(&self, id: u64, category: QuestionKey) -> Result<(), AppError> {
        self.inner.delete_question_file(id, category).await
    }

    async fn upload_question_file(
        &self,
        id: u64,
        category: QuestionKey,
        file: FileUpload,
    ) -> Result<String, AppError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::Io(io::Error::other("disk quota exceeded")));
        }
        self.inner.upload_question_file(id, category, file).await
    }
}

pub struct TestApp {
    pub app: axum::Router,
    pub state: Arc<AppState>,
    pub service: Arc<InstrumentedService>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn cache_file(&self) -> std::path::PathBuf {
        self.dir.path().join("static_travelers_cache.json")
    }
}

pub fn setup() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(InstrumentedService::new(&dir.path().join("uploads")));
    let state = Arc::new(AppState::new(
        service.clone(),
        ResponseCache::new(dir.path()),
    ));

    TestApp {
        app: router(state.clone()),
        state,
        service,
        dir,
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    empty_request("GET", uri)
}

pub fn multipart_request(uri: &str, category: Option<&str>, file: Option<(&str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(category) = category {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"category\"\r\n\r\n{category}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_string(response: axum::response::Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
