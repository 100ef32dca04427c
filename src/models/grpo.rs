use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::DocumentStatus;
use super::ServerRecord;

/// A goods-receipt-against-purchase-order document.
///
/// `id` is server-assigned; a locally created document carries a provisional
/// rowid until its first successful upload re-keys it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpoDocument {
    #[serde(default)]
    pub id: i64,
    pub po_number: String,
    pub supplier_code: Option<String>,
    pub supplier_name: Option<String>,
    pub warehouse_code: Option<String>,
    pub user_id: Option<i64>,
    pub qc_approver_id: Option<i64>,
    pub qc_approved_at: Option<DateTime<Utc>>,
    pub qc_notes: Option<String>,
    pub status: DocumentStatus,
    pub po_total: Option<f64>,
    pub sap_document_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GrpoDocument {
    pub fn new(po_number: impl Into<String>, user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            po_number: po_number.into(),
            supplier_code: None,
            supplier_name: None,
            warehouse_code: None,
            user_id: Some(user_id),
            qc_approver_id: None,
            qc_approved_at: None,
            qc_notes: None,
            status: DocumentStatus::Draft,
            po_total: None,
            sap_document_number: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_supplier(
        mut self,
        code: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        self.supplier_code = Some(code.into());
        self.supplier_name = name;
        self
    }

    pub fn with_warehouse(mut self, code: impl Into<String>) -> Self {
        self.warehouse_code = Some(code.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

impl ServerRecord for GrpoDocument {
    fn record_id(&self) -> i64 {
        self.id
    }

    fn last_updated(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl fmt::Display for GrpoDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GRPO #{} PO {} [{}] {}",
            self.id,
            self.po_number,
            self.status,
            self.warehouse_code.as_deref().unwrap_or("-")
        )
    }
}

/// One received line on a GRPO document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpoItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub grpo_document_id: i64,
    pub line_number: i64,
    pub item_code: String,
    pub item_name: Option<String>,
    pub received_quantity: f64,
    pub ordered_quantity: Option<f64>,
    pub unit_of_measure: Option<String>,
    pub batch_number: Option<String>,
    pub expiration_date: Option<String>,
    pub serial_number: Option<String>,
    pub warehouse_code: Option<String>,
    pub bin_location: Option<String>,
}

impl GrpoItem {
    pub fn new(line_number: i64, item_code: impl Into<String>, received_quantity: f64) -> Self {
        Self {
            id: 0,
            grpo_document_id: 0,
            line_number,
            item_code: item_code.into(),
            item_name: None,
            received_quantity,
            ordered_quantity: None,
            unit_of_measure: None,
            batch_number: None,
            expiration_date: None,
            serial_number: None,
            warehouse_code: None,
            bin_location: None,
        }
    }

    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.bin_location = Some(bin.into());
        self
    }
}
