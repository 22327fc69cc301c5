use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::invoice::{Invoice, InvoiceItem, InvoiceStatus, SaveInvoiceRequest};
use crate::models::traveler::{
    FieldUpdates, FieldValue, QuestionKey, Traveler, TravelerField, TravelerListItem,
};
use crate::service::{FileUpload, TravelerService};

/// Process-local traveler store. Attachments are written under
/// `upload_dir/<traveler_id>/`.
pub struct InMemoryTravelerService {
    travelers: DashMap<u64, Traveler>,
    invoices: DashMap<u64, Invoice>,
    next_traveler_id: AtomicU64,
    next_invoice_id: AtomicU64,
    upload_dir: PathBuf,
}

impl InMemoryTravelerService {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            travelers: DashMap::new(),
            invoices: DashMap::new(),
            next_traveler_id: AtomicU64::new(1),
            next_invoice_id: AtomicU64::new(1),
            upload_dir: upload_dir.into(),
        }
    }

    fn not_found(id: u64) -> AppError {
        AppError::NotFound(format!("traveler {id} not found"))
    }

    /// Runs `mutate` against a traveler that exists and is not locked.
    fn mutate_unlocked<R>(
        &self,
        id: u64,
        mutate: impl FnOnce(&mut Traveler) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let mut traveler = self
            .travelers
            .get_mut(&id)
            .ok_or_else(|| Self::not_found(id))?;

        if traveler.locked {
            return Err(AppError::Locked(id));
        }

        let result = mutate(traveler.value_mut())?;
        traveler.updated_at = Utc::now();
        Ok(result)
    }

    fn ensure_unlocked(&self, id: u64) -> Result<(), AppError> {
        let traveler = self.travelers.get(&id).ok_or_else(|| Self::not_found(id))?;
        if traveler.locked {
            return Err(AppError::Locked(id));
        }
        Ok(())
    }

    fn attachment_path(&self, id: u64, category: &QuestionKey, file_name: Option<&str>) -> PathBuf {
        let extension = file_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_default();

        self.upload_dir
            .join(id.to_string())
            .join(format!("{category}_{}{extension}", Uuid::new_v4()))
    }

    /// Best effort: the record is already gone, so failures are only logged.
    async fn remove_attachments(&self, traveler: &Traveler) {
        for path in traveler.files.values() {
            if let Err(err) = remove_if_present(Path::new(path)).await {
                warn!(
                    traveler_id = traveler.id,
                    path = %path,
                    error = %err,
                    "failed to remove attachment"
                );
            }
        }

        let dir = self.upload_dir.join(traveler.id.to_string());
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(
                    traveler_id = traveler.id,
                    path = %dir.display(),
                    error = %err,
                    "failed to remove upload directory"
                );
            }
        }
    }

    fn invoice_from_traveler(&self, traveler: &Traveler) -> Invoice {
        let description = traveler
            .field(TravelerField::Package)
            .and_then(FieldValue::as_text)
            .filter(|text| !text.trim().is_empty())
            .unwrap_or("Visa service")
            .to_string();
        let unit_price = traveler
            .field(TravelerField::Price)
            .and_then(FieldValue::as_f64)
            .unwrap_or(0.0);

        let now = Utc::now();
        let mut invoice = Invoice {
            id: self.next_invoice_id.fetch_add(1, Ordering::SeqCst),
            traveler_id: traveler.id,
            invoice_number: Invoice::number_for(traveler.id),
            items: vec![InvoiceItem {
                description,
                quantity: 1,
                unit_price,
            }],
            subtotal: 0.0,
            discount: 0.0,
            total: 0.0,
            status: InvoiceStatus::Draft,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        invoice.recompute_totals();
        invoice
    }
}

async fn remove_if_present(path: &Path) -> Result<(), AppError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::Io(err)),
    }
}

#[async_trait]
impl TravelerService for InMemoryTravelerService {
    async fn create_traveler(&self) -> Result<u64, AppError> {
        let id = self.next_traveler_id.fetch_add(1, Ordering::SeqCst);
        self.travelers.insert(id, Traveler::new(id));
        info!(traveler_id = id, "traveler created");
        Ok(id)
    }

    async fn list_travelers(
        &self,
        page: usize,
        limit: usize,
        summary: bool,
    ) -> Result<Vec<TravelerListItem>, AppError> {
        let page = page.max(1);
        let limit = limit.max(1);

        let mut travelers: Vec<Traveler> = self
            .travelers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        travelers.sort_by_key(|traveler| traveler.id);

        Ok(travelers
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .map(|traveler| {
                if summary {
                    TravelerListItem::Summary(traveler.summary())
                } else {
                    TravelerListItem::Full(traveler)
                }
            })
            .collect())
    }

    async fn get_traveler(&self, id: u64) -> Result<Traveler, AppError> {
        self.travelers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Self::not_found(id))
    }

    async fn update_field(
        &self,
        id: u64,
        field: TravelerField,
        value: FieldValue,
    ) -> Result<(), AppError> {
        self.mutate_unlocked(id, |traveler| {
            traveler.fields.insert(field, value);
            Ok(())
        })?;
        debug!(traveler_id = id, field = %field, "field updated");
        Ok(())
    }

    async fn update_fields(&self, id: u64, updates: FieldUpdates) -> Result<(), AppError> {
        let count = self.mutate_unlocked(id, |traveler| {
            let mut count = 0;
            for (field, value) in updates {
                traveler.fields.insert(field, value);
                count += 1;
            }
            Ok(count)
        })?;
        debug!(traveler_id = id, count, "fields updated");
        Ok(())
    }

    async fn delete_traveler(&self, id: u64) -> Result<(), AppError> {
        // Lock check and removal happen under the same shard lock.
        let Some((_, traveler)) = self.travelers.remove_if(&id, |_, traveler| !traveler.locked)
        else {
            return Err(if self.travelers.contains_key(&id) {
                AppError::Locked(id)
            } else {
                Self::not_found(id)
            });
        };
        self.invoices.remove(&id);
        self.remove_attachments(&traveler).await;
        info!(traveler_id = id, "traveler deleted");
        Ok(())
    }

    async fn find_by_passport(&self, passport_no: &str) -> Result<Option<Traveler>, AppError> {
        let needle = passport_no.trim();
        if needle.is_empty() {
            return Ok(None);
        }

        let found = self
            .travelers
            .iter()
            .filter(|entry| {
                entry
                    .field(TravelerField::PassportNo)
                    .and_then(FieldValue::as_text)
                    .is_some_and(|passport| passport.trim() == needle)
            })
            .map(|entry| entry.value().clone())
            .min_by_key(|traveler| traveler.id);

        Ok(found)
    }

    async fn set_lock_status(&self, id: u64, locked: bool) -> Result<(), AppError> {
        let mut traveler = self
            .travelers
            .get_mut(&id)
            .ok_or_else(|| Self::not_found(id))?;
        traveler.locked = locked;
        traveler.updated_at = Utc::now();
        info!(traveler_id = id, locked, "lock status changed");
        Ok(())
    }

    async fn save_invoice(&self, request: SaveInvoiceRequest) -> Result<Invoice, AppError> {
        if !self.travelers.contains_key(&request.traveler_id) {
            return Err(Self::not_found(request.traveler_id));
        }
        if request.discount < 0.0 {
            return Err(AppError::BadRequest("discount cannot be negative".to_string()));
        }
        if request.items.iter().any(|item| item.unit_price < 0.0) {
            return Err(AppError::BadRequest("unit_price cannot be negative".to_string()));
        }

        let now = Utc::now();
        let mut entry = self
            .invoices
            .entry(request.traveler_id)
            .or_insert_with(|| Invoice {
                id: self.next_invoice_id.fetch_add(1, Ordering::SeqCst),
                traveler_id: request.traveler_id,
                invoice_number: Invoice::number_for(request.traveler_id),
                items: Vec::new(),
                subtotal: 0.0,
                discount: 0.0,
                total: 0.0,
                status: InvoiceStatus::Draft,
                notes: None,
                created_at: now,
                updated_at: now,
            });

        let invoice = entry.value_mut();
        invoice.items = request.items;
        invoice.discount = request.discount;
        invoice.status = request.status;
        invoice.notes = request.notes;
        invoice.updated_at = now;
        invoice.recompute_totals();

        info!(
            traveler_id = invoice.traveler_id,
            invoice_number = %invoice.invoice_number,
            "invoice saved"
        );
        Ok(invoice.clone())
    }

    async fn get_invoice(&self, traveler_id: u64) -> Result<Invoice, AppError> {
        self.invoices
            .get(&traveler_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                AppError::NotFound(format!("invoice for traveler {traveler_id} not found"))
            })
    }

    async fn save_all_invoices(&self) -> Result<Map<String, Value>, AppError> {
        let mut travelers: Vec<Traveler> = self
            .travelers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        travelers.sort_by_key(|traveler| traveler.id);

        let mut created = 0usize;
        let mut skipped = 0usize;
        for traveler in &travelers {
            let mut inserted = false;
            self.invoices.entry(traveler.id).or_insert_with(|| {
                inserted = true;
                self.invoice_from_traveler(traveler)
            });
            if inserted {
                created += 1;
            } else {
                skipped += 1;
            }
        }

        info!(created, skipped, "bulk invoice generation finished");

        let mut result = Map::new();
        result.insert("created".to_string(), json!(created));
        result.insert("skipped".to_string(), json!(skipped));
        result.insert(
            "message".to_string(),
            json!(format!("Generated {created} invoice(s), skipped {skipped}")),
        );
        Ok(result)
    }

    async fn update_question_field(
        &self,
        id: u64,
        field: QuestionKey,
        value: String,
    ) -> Result<(), AppError> {
        self.mutate_unlocked(id, |traveler| {
            traveler.questions.insert(field, value);
            Ok(())
        })
    }

    async fn delete_question_file(&self, id: u64, category: QuestionKey) -> Result<(), AppError> {
        let path = self.mutate_unlocked(id, |traveler| {
            traveler.files.remove(&category).ok_or_else(|| {
                AppError::NotFound(format!("no file {category} on traveler {id}"))
            })
        })?;

        remove_if_present(Path::new(&path)).await?;
        info!(traveler_id = id, category = %category, "file deleted");
        Ok(())
    }

    async fn upload_question_file(
        &self,
        id: u64,
        category: QuestionKey,
        file: FileUpload,
    ) -> Result<String, AppError> {
        self.ensure_unlocked(id)?;

        let path = self.attachment_path(id, &category, file.file_name.as_deref());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &file.bytes).await?;
        let stored = path.to_string_lossy().into_owned();

        let replaced = match self.mutate_unlocked(id, |traveler| {
            Ok(traveler.files.insert(category.clone(), stored.clone()))
        }) {
            Ok(replaced) => replaced,
            Err(err) => {
                if let Err(cleanup) = remove_if_present(&path).await {
                    warn!(
                        traveler_id = id,
                        path = %path.display(),
                        error = %cleanup,
                        "failed to remove orphaned upload"
                    );
                }
                return Err(err);
            }
        };

        if let Some(old) = replaced {
            if let Err(err) = remove_if_present(Path::new(&old)).await {
                warn!(traveler_id = id, path = %old, error = %err, "failed to remove replaced file");
            }
        }

        info!(
            traveler_id = id,
            category = %category,
            bytes = file.bytes.len(),
            content_type = file.content_type.as_deref().unwrap_or("unknown"),
            "file uploaded"
        );
        Ok(stored)
    }
}
