//! reqwest-based implementation of the warehouse API contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use super::error::ApiError;
use super::RemoteApi;
use crate::models::{GrpoDocument, GrpoItem, InventoryTransfer, PickList, PickListItem,
    TransferItem};

/// HTTP client for the warehouse backend. Sends a bearer token on every
/// request and enforces a fixed per-request timeout.
pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct CreatedResponse {
    id: i64,
}

#[derive(Deserialize)]
struct GrpoListResponse {
    grpos: Vec<GrpoDocument>,
}

#[derive(Deserialize)]
struct TransferListResponse {
    transfers: Vec<InventoryTransfer>,
}

#[derive(Deserialize)]
struct PickListListResponse {
    pick_lists: Vec<PickList>,
}

#[derive(Serialize)]
struct DocumentBody<'a, D: Serialize, L: Serialize> {
    document: &'a D,
    items: &'a [L],
}

/// Outcome of a validation lookup (barcode, PO, transfer request).
#[derive(Debug, Deserialize)]
pub struct LookupResult {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl HttpApi {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        self.check(response).await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ApiError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        self.check(response).await
    }

    async fn put_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ApiError> {
        let response = self
            .http
            .put(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        self.check(response).await
    }

    async fn post_action(&self, path: &str, qc_notes: Option<&str>) -> Result<(), ApiError> {
        match qc_notes {
            Some(notes) => {
                self.post_json(path, &json!({ "qc_notes": notes })).await?;
            }
            None => {
                self.post_json(path, &json!({})).await?;
            }
        }
        Ok(())
    }

    async fn created_id(&self, response: reqwest::Response) -> Result<i64, ApiError> {
        let body: CreatedResponse = response
            .json()
            .await
            .map_err(|e| ApiError::UnexpectedResponse(e.to_string()))?;
        Ok(body.id)
    }

    /// Barcode validation lookup used by scan flows; not part of the sync
    /// contract.
    pub async fn validate_barcode(&self, barcode: &str) -> Result<LookupResult, ApiError> {
        let response = self
            .post_json("/api/validate_barcode", &json!({ "barcode": barcode }))
            .await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::UnexpectedResponse(e.to_string()))
    }

    pub async fn get_purchase_order(&self, po_number: &str) -> Result<LookupResult, ApiError> {
        let response = self
            .get(&format!("/api/purchase_orders/{}", po_number))
            .await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::UnexpectedResponse(e.to_string()))
    }

    pub async fn get_transfer_request(
        &self,
        request_number: &str,
    ) -> Result<LookupResult, ApiError> {
        let response = self
            .get(&format!("/api/transfer_requests/{}", request_number))
            .await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::UnexpectedResponse(e.to_string()))
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn ping(&self) -> Result<(), ApiError> {
        self.get("/api/health").await?;
        Ok(())
    }

    async fn create_grpo(
        &self,
        document: &GrpoDocument,
        items: &[GrpoItem],
    ) -> Result<i64, ApiError> {
        let response = self
            .post_json("/api/grpo_documents", &DocumentBody { document, items })
            .await?;
        self.created_id(response).await
    }

    async fn update_grpo(&self, id: i64, document: &GrpoDocument) -> Result<(), ApiError> {
        self.put_json(&format!("/api/grpo_documents/{}", id), document)
            .await?;
        Ok(())
    }

    async fn submit_grpo(&self, id: i64) -> Result<(), ApiError> {
        self.post_action(&format!("/api/grpo_documents/{}/submit", id), None)
            .await
    }

    async fn approve_grpo(&self, id: i64, qc_notes: Option<&str>) -> Result<(), ApiError> {
        self.post_action(&format!("/api/grpo_documents/{}/approve", id), qc_notes)
            .await
    }

    async fn reject_grpo(&self, id: i64, qc_notes: Option<&str>) -> Result<(), ApiError> {
        self.post_action(&format!("/api/grpo_documents/{}/reject", id), qc_notes)
            .await
    }

    async fn list_grpos(&self) -> Result<Vec<GrpoDocument>, ApiError> {
        let response = self.get("/api/grpo_documents").await?;
        let body: GrpoListResponse = response
            .json()
            .await
            .map_err(|e| ApiError::UnexpectedResponse(e.to_string()))?;
        Ok(body.grpos)
    }

    async fn create_transfer(
        &self,
        document: &InventoryTransfer,
        items: &[TransferItem],
    ) -> Result<i64, ApiError> {
        let response = self
            .post_json("/api/inventory_transfers", &DocumentBody { document, items })
            .await?;
        self.created_id(response).await
    }

    async fn update_transfer(
        &self,
        id: i64,
        document: &InventoryTransfer,
    ) -> Result<(), ApiError> {
        self.put_json(&format!("/api/inventory_transfers/{}", id), document)
            .await?;
        Ok(())
    }

    async fn submit_transfer(&self, id: i64) -> Result<(), ApiError> {
        self.post_action(&format!("/api/inventory_transfers/{}/submit", id), None)
            .await
    }

    async fn approve_transfer(&self, id: i64, qc_notes: Option<&str>) -> Result<(), ApiError> {
        self.post_action(
            &format!("/api/inventory_transfers/{}/approve", id),
            qc_notes,
        )
        .await
    }

    async fn reject_transfer(&self, id: i64, qc_notes: Option<&str>) -> Result<(), ApiError> {
        self.post_action(
            &format!("/api/inventory_transfers/{}/reject", id),
            qc_notes,
        )
        .await
    }

    async fn reopen_transfer(&self, id: i64) -> Result<(), ApiError> {
        self.post_action(&format!("/api/inventory_transfers/{}/reopen", id), None)
            .await
    }

    async fn list_transfers(&self) -> Result<Vec<InventoryTransfer>, ApiError> {
        let response = self.get("/api/inventory_transfers").await?;
        let body: TransferListResponse = response
            .json()
            .await
            .map_err(|e| ApiError::UnexpectedResponse(e.to_string()))?;
        Ok(body.transfers)
    }

    async fn create_pick_list(
        &self,
        document: &PickList,
        items: &[PickListItem],
    ) -> Result<i64, ApiError> {
        let response = self
            .post_json("/api/pick_lists", &DocumentBody { document, items })
            .await?;
        self.created_id(response).await
    }

    async fn update_pick_list(&self, id: i64, document: &PickList) -> Result<(), ApiError> {
        self.put_json(&format!("/api/pick_lists/{}", id), document)
            .await?;
        Ok(())
    }

    async fn list_pick_lists(&self) -> Result<Vec<PickList>, ApiError> {
        let response = self.get("/api/pick_lists").await?;
        let body: PickListListResponse = response
            .json()
            .await
            .map_err(|e| ApiError::UnexpectedResponse(e.to_string()))?;
        Ok(body.pick_lists)
    }
}
