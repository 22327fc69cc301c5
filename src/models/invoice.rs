use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub unit_price: f64,
}

fn default_quantity() -> u32 {
    1
}

impl InvoiceItem {
    pub fn line_total(&self) -> f64 {
        f64::from(self.quantity) * self.unit_price
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Issued,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveInvoiceRequest {
    pub traveler_id: u64,
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    pub id: u64,
    pub traveler_id: u64,
    pub invoice_number: String,
    pub items: Vec<InvoiceItem>,
    pub subtotal: f64,
    pub discount: f64,
    pub total: f64,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn number_for(traveler_id: u64) -> String {
        format!("INV-{traveler_id:06}")
    }

    /// Recomputes subtotal and total from the line items; the total never
    /// drops below zero.
    pub fn recompute_totals(&mut self) {
        self.subtotal = self.items.iter().map(InvoiceItem::line_total).sum();
        self.total = (self.subtotal - self.discount).max(0.0);
    }
}
