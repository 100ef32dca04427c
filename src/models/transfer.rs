use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::DocumentStatus;
use super::ServerRecord;

/// A warehouse-to-warehouse inventory transfer document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryTransfer {
    #[serde(default)]
    pub id: i64,
    pub transfer_request_number: Option<String>,
    pub sap_document_number: Option<String>,
    pub status: DocumentStatus,
    pub user_id: Option<i64>,
    pub qc_approver_id: Option<i64>,
    pub qc_approved_at: Option<DateTime<Utc>>,
    pub qc_notes: Option<String>,
    pub from_warehouse: Option<String>,
    pub to_warehouse: Option<String>,
    pub transfer_type: Option<String>,
    pub priority: Option<String>,
    pub reason_code: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryTransfer {
    pub fn new(user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            transfer_request_number: None,
            sap_document_number: None,
            status: DocumentStatus::Draft,
            user_id: Some(user_id),
            qc_approver_id: None,
            qc_approved_at: None,
            qc_notes: None,
            from_warehouse: None,
            to_warehouse: None,
            transfer_type: None,
            priority: None,
            reason_code: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_request_number(mut self, number: impl Into<String>) -> Self {
        self.transfer_request_number = Some(number.into());
        self
    }

    pub fn with_route(
        mut self,
        from_warehouse: impl Into<String>,
        to_warehouse: impl Into<String>,
    ) -> Self {
        self.from_warehouse = Some(from_warehouse.into());
        self.to_warehouse = Some(to_warehouse.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }
}

impl ServerRecord for InventoryTransfer {
    fn record_id(&self) -> i64 {
        self.id
    }

    fn last_updated(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl fmt::Display for InventoryTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer #{} {} -> {} [{}]",
            self.id,
            self.from_warehouse.as_deref().unwrap_or("-"),
            self.to_warehouse.as_deref().unwrap_or("-"),
            self.status
        )
    }
}

/// One line on an inventory transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub inventory_transfer_id: i64,
    pub line_number: i64,
    pub item_code: String,
    pub item_name: Option<String>,
    pub quantity: f64,
    pub unit_of_measure: Option<String>,
    pub batch_number: Option<String>,
    pub from_bin_location: Option<String>,
    pub to_bin_location: Option<String>,
}

impl TransferItem {
    pub fn new(line_number: i64, item_code: impl Into<String>, quantity: f64) -> Self {
        Self {
            id: 0,
            inventory_transfer_id: 0,
            line_number,
            item_code: item_code.into(),
            item_name: None,
            quantity,
            unit_of_measure: None,
            batch_number: None,
            from_bin_location: None,
            to_bin_location: None,
        }
    }
}
