//! Remote warehouse API contract.
//!
//! One method per (table, operation) pair the sync engine can replay, plus
//! the collection downloads and a reachability probe. The engine is generic
//! over this trait so tests can substitute an in-memory fake.

mod client;
mod error;

pub use client::{HttpApi, LookupResult};
pub use error::ApiError;

use async_trait::async_trait;

use crate::models::{GrpoDocument, GrpoItem, InventoryTransfer, PickList, PickListItem,
    TransferItem};

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Reachability probe; a failure aborts a sync pass before any phase runs.
    async fn ping(&self) -> Result<(), ApiError>;

    // GRPO documents
    async fn create_grpo(
        &self,
        document: &GrpoDocument,
        items: &[GrpoItem],
    ) -> Result<i64, ApiError>;
    async fn update_grpo(&self, id: i64, document: &GrpoDocument) -> Result<(), ApiError>;
    async fn submit_grpo(&self, id: i64) -> Result<(), ApiError>;
    async fn approve_grpo(&self, id: i64, qc_notes: Option<&str>) -> Result<(), ApiError>;
    async fn reject_grpo(&self, id: i64, qc_notes: Option<&str>) -> Result<(), ApiError>;
    async fn list_grpos(&self) -> Result<Vec<GrpoDocument>, ApiError>;

    // Inventory transfers
    async fn create_transfer(
        &self,
        document: &InventoryTransfer,
        items: &[TransferItem],
    ) -> Result<i64, ApiError>;
    async fn update_transfer(
        &self,
        id: i64,
        document: &InventoryTransfer,
    ) -> Result<(), ApiError>;
    async fn submit_transfer(&self, id: i64) -> Result<(), ApiError>;
    async fn approve_transfer(&self, id: i64, qc_notes: Option<&str>) -> Result<(), ApiError>;
    async fn reject_transfer(&self, id: i64, qc_notes: Option<&str>) -> Result<(), ApiError>;
    async fn reopen_transfer(&self, id: i64) -> Result<(), ApiError>;
    async fn list_transfers(&self) -> Result<Vec<InventoryTransfer>, ApiError>;

    // Pick lists
    async fn create_pick_list(
        &self,
        document: &PickList,
        items: &[PickListItem],
    ) -> Result<i64, ApiError>;
    async fn update_pick_list(&self, id: i64, document: &PickList) -> Result<(), ApiError>;
    async fn list_pick_lists(&self) -> Result<Vec<PickList>, ApiError>;
}
