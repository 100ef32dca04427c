use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::DocumentStatus;
use super::ServerRecord;

/// A pick list for fulfilling a sales order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickList {
    #[serde(default)]
    pub id: i64,
    pub sales_order_number: Option<String>,
    pub customer_code: Option<String>,
    pub customer_name: Option<String>,
    pub warehouse_code: Option<String>,
    pub user_id: Option<i64>,
    pub status: DocumentStatus,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PickList {
    pub fn new(user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            sales_order_number: None,
            customer_code: None,
            customer_name: None,
            warehouse_code: None,
            user_id: Some(user_id),
            status: DocumentStatus::Draft,
            priority: None,
            due_date: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_sales_order(mut self, number: impl Into<String>) -> Self {
        self.sales_order_number = Some(number.into());
        self
    }

    pub fn with_customer(mut self, code: impl Into<String>, name: Option<String>) -> Self {
        self.customer_code = Some(code.into());
        self.customer_name = name;
        self
    }

    pub fn with_warehouse(mut self, code: impl Into<String>) -> Self {
        self.warehouse_code = Some(code.into());
        self
    }
}

impl ServerRecord for PickList {
    fn record_id(&self) -> i64 {
        self.id
    }

    fn last_updated(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl fmt::Display for PickList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pick list #{} SO {} [{}]",
            self.id,
            self.sales_order_number.as_deref().unwrap_or("-"),
            self.status
        )
    }
}

/// One line on a pick list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickListItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub pick_list_id: i64,
    pub line_number: i64,
    pub item_code: String,
    pub item_name: Option<String>,
    pub ordered_quantity: f64,
    pub picked_quantity: f64,
    pub unit_of_measure: Option<String>,
    pub batch_number: Option<String>,
    pub bin_location: Option<String>,
}

impl PickListItem {
    pub fn new(line_number: i64, item_code: impl Into<String>, ordered_quantity: f64) -> Self {
        Self {
            id: 0,
            pick_list_id: 0,
            line_number,
            item_code: item_code.into(),
            item_name: None,
            ordered_quantity,
            picked_quantity: 0.0,
            unit_of_measure: None,
            batch_number: None,
            bin_location: None,
        }
    }
}
