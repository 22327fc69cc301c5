//! Port to the traveler domain. Handlers only ever talk to
//! [`TravelerService`]; persistence lives behind it.

pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::models::invoice::{Invoice, SaveInvoiceRequest};
use crate::models::traveler::{
    FieldUpdates, FieldValue, QuestionKey, Traveler, TravelerField, TravelerListItem,
};

pub use memory::InMemoryTravelerService;

/// An uploaded attachment as received from the client.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait TravelerService: Send + Sync {
    /// Allocates a traveler in its default state and returns the new id.
    async fn create_traveler(&self) -> Result<u64, AppError>;

    async fn list_travelers(
        &self,
        page: usize,
        limit: usize,
        summary: bool,
    ) -> Result<Vec<TravelerListItem>, AppError>;

    async fn get_traveler(&self, id: u64) -> Result<Traveler, AppError>;

    async fn update_field(
        &self,
        id: u64,
        field: TravelerField,
        value: FieldValue,
    ) -> Result<(), AppError>;

    async fn update_fields(&self, id: u64, updates: FieldUpdates) -> Result<(), AppError>;

    async fn delete_traveler(&self, id: u64) -> Result<(), AppError>;

    async fn find_by_passport(&self, passport_no: &str) -> Result<Option<Traveler>, AppError>;

    async fn set_lock_status(&self, id: u64, locked: bool) -> Result<(), AppError>;

    async fn save_invoice(&self, request: SaveInvoiceRequest) -> Result<Invoice, AppError>;

    async fn get_invoice(&self, traveler_id: u64) -> Result<Invoice, AppError>;

    /// Generates invoices in bulk. The returned map always carries a
    /// human-readable `message` entry.
    async fn save_all_invoices(&self) -> Result<Map<String, Value>, AppError>;

    async fn update_question_field(
        &self,
        id: u64,
        field: QuestionKey,
        value: String,
    ) -> Result<(), AppError>;

    async fn delete_question_file(&self, id: u64, category: QuestionKey) -> Result<(), AppError>;

    /// Stores the file and returns the path it was written to.
    async fn upload_question_file(
        &self,
        id: u64,
        category: QuestionKey,
        file: FileUpload,
    ) -> Result<String, AppError>;
}
