use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::queue_repo::enqueue_with;
use super::DocumentStore;
use crate::models::{parse_timestamp, DocumentStatus, InventoryTransfer, QueuePayload,
    TransferItem, TransferMutation, TRANSFER_TABLE};

pub struct TransferRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct TransferRow {
    id: i64,
    transfer_request_number: Option<String>,
    sap_document_number: Option<String>,
    status: String,
    user_id: Option<i64>,
    qc_approver_id: Option<i64>,
    qc_approved_at: Option<String>,
    qc_notes: Option<String>,
    from_warehouse: Option<String>,
    to_warehouse: Option<String>,
    transfer_type: Option<String>,
    priority: Option<String>,
    reason_code: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct TransferItemRow {
    id: i64,
    inventory_transfer_id: i64,
    line_number: i64,
    item_code: String,
    item_name: Option<String>,
    quantity: f64,
    unit_of_measure: Option<String>,
    batch_number: Option<String>,
    from_bin_location: Option<String>,
    to_bin_location: Option<String>,
}

fn hydrate(row: TransferRow) -> InventoryTransfer {
    InventoryTransfer {
        id: row.id,
        transfer_request_number: row.transfer_request_number,
        sap_document_number: row.sap_document_number,
        status: DocumentStatus::parse(&row.status),
        user_id: row.user_id,
        qc_approver_id: row.qc_approver_id,
        qc_approved_at: row.qc_approved_at.as_deref().map(parse_timestamp),
        qc_notes: row.qc_notes,
        from_warehouse: row.from_warehouse,
        to_warehouse: row.to_warehouse,
        transfer_type: row.transfer_type,
        priority: row.priority,
        reason_code: row.reason_code,
        notes: row.notes,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

fn hydrate_item(row: TransferItemRow) -> TransferItem {
    TransferItem {
        id: row.id,
        inventory_transfer_id: row.inventory_transfer_id,
        line_number: row.line_number,
        item_code: row.item_code,
        item_name: row.item_name,
        quantity: row.quantity,
        unit_of_measure: row.unit_of_measure,
        batch_number: row.batch_number,
        from_bin_location: row.from_bin_location,
        to_bin_location: row.to_bin_location,
    }
}

impl TransferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a transfer with its lines and queue the INSERT, atomically.
    pub async fn create(
        &self,
        document: &InventoryTransfer,
        items: &[TransferItem],
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO inventory_transfers
                (transfer_request_number, status, user_id, from_warehouse, to_warehouse,
                 transfer_type, priority, reason_code, notes, created_at, updated_at, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&document.transfer_request_number)
        .bind(document.status.as_str())
        .bind(document.user_id)
        .bind(&document.from_warehouse)
        .bind(&document.to_warehouse)
        .bind(&document.transfer_type)
        .bind(&document.priority)
        .bind(&document.reason_code)
        .bind(&document.notes)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO inventory_transfer_items
                    (inventory_transfer_id, line_number, item_code, item_name, quantity,
                     unit_of_measure, batch_number, from_bin_location, to_bin_location,
                     created_at, updated_at, synced)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
                "#,
            )
            .bind(id)
            .bind(item.line_number)
            .bind(&item.item_code)
            .bind(&item.item_name)
            .bind(item.quantity)
            .bind(&item.unit_of_measure)
            .bind(&item.batch_number)
            .bind(&item.from_bin_location)
            .bind(&item.to_bin_location)
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        let mut snapshot = document.clone();
        snapshot.id = id;
        snapshot.created_at = now;
        snapshot.updated_at = now;
        let snapshot_items: Vec<TransferItem> = items
            .iter()
            .map(|item| {
                let mut item = item.clone();
                item.inventory_transfer_id = id;
                item
            })
            .collect();
        enqueue_with(
            &mut tx,
            id,
            &QueuePayload::Transfer(TransferMutation::Insert {
                document: snapshot,
                items: snapshot_items,
            }),
        )
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    pub async fn update(
        &self,
        id: i64,
        document: &InventoryTransfer,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE inventory_transfers
            SET transfer_request_number = ?, status = ?, from_warehouse = ?,
                to_warehouse = ?, transfer_type = ?, priority = ?, reason_code = ?,
                notes = ?, updated_at = ?, synced = 0
            WHERE id = ?
            "#,
        )
        .bind(&document.transfer_request_number)
        .bind(document.status.as_str())
        .bind(&document.from_warehouse)
        .bind(&document.to_warehouse)
        .bind(&document.transfer_type)
        .bind(&document.priority)
        .bind(&document.reason_code)
        .bind(&document.notes)
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        let mut snapshot = document.clone();
        snapshot.id = id;
        snapshot.updated_at = now;
        enqueue_with(
            &mut tx,
            id,
            &QueuePayload::Transfer(TransferMutation::Update { document: snapshot }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn submit(&self, id: i64) -> Result<(), sqlx::Error> {
        self.transition(
            id,
            DocumentStatus::Submitted,
            QueuePayload::Transfer(TransferMutation::Submit),
        )
        .await
    }

    pub async fn reopen(&self, id: i64) -> Result<(), sqlx::Error> {
        self.transition(
            id,
            DocumentStatus::Reopened,
            QueuePayload::Transfer(TransferMutation::Reopen),
        )
        .await
    }

    pub async fn approve(&self, id: i64, qc_notes: Option<String>) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE inventory_transfers
            SET status = ?, qc_notes = ?, qc_approved_at = ?, updated_at = ?, synced = 0
            WHERE id = ?
            "#,
        )
        .bind(DocumentStatus::QcApproved.as_str())
        .bind(&qc_notes)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        enqueue_with(
            &mut tx,
            id,
            &QueuePayload::Transfer(TransferMutation::Approve { qc_notes }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn reject(&self, id: i64, qc_notes: Option<String>) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE inventory_transfers
            SET status = ?, qc_notes = ?, updated_at = ?, synced = 0
            WHERE id = ?
            "#,
        )
        .bind(DocumentStatus::Rejected.as_str())
        .bind(&qc_notes)
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        enqueue_with(
            &mut tx,
            id,
            &QueuePayload::Transfer(TransferMutation::Reject { qc_notes }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn transition(
        &self,
        id: i64,
        status: DocumentStatus,
        payload: QueuePayload,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE inventory_transfers SET status = ?, updated_at = ?, synced = 0 WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        enqueue_with(&mut tx, id, &payload).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn items(&self, transfer_id: i64) -> Result<Vec<TransferItem>, sqlx::Error> {
        let rows: Vec<TransferItemRow> = sqlx::query_as(
            "SELECT id, inventory_transfer_id, line_number, item_code, item_name, quantity, \
             unit_of_measure, batch_number, from_bin_location, to_bin_location \
             FROM inventory_transfer_items WHERE inventory_transfer_id = ? ORDER BY line_number",
        )
        .bind(transfer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(hydrate_item).collect())
    }

    pub async fn list_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<InventoryTransfer>, sqlx::Error> {
        let rows: Vec<TransferRow> = sqlx::query_as(
            "SELECT * FROM inventory_transfers WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(hydrate).collect())
    }

    pub async fn synced_flag(&self, id: i64) -> Result<Option<bool>, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT synced FROM inventory_transfers WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(flag,)| flag != 0))
    }
}

#[async_trait]
impl DocumentStore for TransferRepository {
    type Doc = InventoryTransfer;

    fn table(&self) -> &'static str {
        TRANSFER_TABLE
    }

    async fn get(&self, id: i64) -> Result<Option<InventoryTransfer>, sqlx::Error> {
        let row: Option<TransferRow> =
            sqlx::query_as("SELECT * FROM inventory_transfers WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(hydrate))
    }

    async fn upsert_from_server(&self, doc: &InventoryTransfer) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO inventory_transfers
                (id, transfer_request_number, sap_document_number, status, user_id,
                 qc_approver_id, qc_approved_at, qc_notes, from_warehouse, to_warehouse,
                 transfer_type, priority, reason_code, notes, created_at, updated_at, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT (id) DO UPDATE SET
                transfer_request_number = excluded.transfer_request_number,
                sap_document_number = excluded.sap_document_number,
                status = excluded.status,
                user_id = excluded.user_id,
                qc_approver_id = excluded.qc_approver_id,
                qc_approved_at = excluded.qc_approved_at,
                qc_notes = excluded.qc_notes,
                from_warehouse = excluded.from_warehouse,
                to_warehouse = excluded.to_warehouse,
                transfer_type = excluded.transfer_type,
                priority = excluded.priority,
                reason_code = excluded.reason_code,
                notes = excluded.notes,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                synced = 1
            "#,
        )
        .bind(doc.id)
        .bind(&doc.transfer_request_number)
        .bind(&doc.sap_document_number)
        .bind(doc.status.as_str())
        .bind(doc.user_id)
        .bind(doc.qc_approver_id)
        .bind(doc.qc_approved_at.map(|dt| dt.to_rfc3339()))
        .bind(&doc.qc_notes)
        .bind(&doc.from_warehouse)
        .bind(&doc.to_warehouse)
        .bind(&doc.transfer_type)
        .bind(&doc.priority)
        .bind(&doc.reason_code)
        .bind(&doc.notes)
        .bind(doc.created_at.to_rfc3339())
        .bind(doc.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_synced(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE inventory_transfers SET synced = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rekey(&self, old_id: i64, server_id: i64) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if old_id != server_id {
            sqlx::query("UPDATE inventory_transfers SET id = ? WHERE id = ?")
                .bind(server_id)
                .bind(old_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE sync_queue SET record_id = ? WHERE table_name = ? AND record_id = ?",
            )
            .bind(server_id)
            .bind(TRANSFER_TABLE)
            .bind(old_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, SyncQueueRepository};
    use crate::models::Operation;
    use tempfile::TempDir;

    struct TestContext {
        repo: TransferRepository,
        queue: SyncQueueRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(db_path).await.unwrap();
        TestContext {
            repo: TransferRepository::new(pool.clone()),
            queue: SyncQueueRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_create_and_reopen_flow() {
        let ctx = setup_repo().await;

        let doc = InventoryTransfer::new(1)
            .with_request_number("TR-100")
            .with_route("WH01", "WH02")
            .with_priority("high");
        let mut item = TransferItem::new(1, "ITEM-A", 3.0);
        item.from_bin_location = Some("A-01".into());
        item.to_bin_location = Some("B-02".into());
        let items = vec![item];

        let id = ctx.repo.create(&doc, &items).await.unwrap();
        ctx.repo.submit(id).await.unwrap();
        ctx.repo.reject(id, Some("wrong bin".into())).await.unwrap();
        ctx.repo.reopen(id).await.unwrap();

        let stored = ctx.repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Reopened);
        assert_eq!(ctx.repo.synced_flag(id).await.unwrap(), Some(false));

        let ops: Vec<Operation> = ctx
            .queue
            .drain()
            .await
            .unwrap()
            .iter()
            .map(|e| e.payload.as_ref().unwrap().operation())
            .collect();
        assert_eq!(
            ops,
            vec![
                Operation::Insert,
                Operation::Submit,
                Operation::Reject,
                Operation::Reopen
            ]
        );
    }

    #[tokio::test]
    async fn test_update_rewrites_fields_and_queues() {
        let ctx = setup_repo().await;

        let id = ctx
            .repo
            .create(&InventoryTransfer::new(1).with_route("WH01", "WH02"), &[])
            .await
            .unwrap();
        let mut doc = ctx.repo.get(id).await.unwrap().unwrap();
        doc.to_warehouse = Some("WH03".into());
        doc.priority = Some("urgent".into());
        ctx.repo.update(id, &doc).await.unwrap();

        let stored = ctx.repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.to_warehouse.as_deref(), Some("WH03"));
        assert_eq!(stored.priority.as_deref(), Some("urgent"));
        assert_eq!(ctx.repo.synced_flag(id).await.unwrap(), Some(false));

        let ops: Vec<Operation> = ctx
            .queue
            .drain()
            .await
            .unwrap()
            .iter()
            .map(|e| e.payload.as_ref().unwrap().operation())
            .collect();
        assert_eq!(ops, vec![Operation::Insert, Operation::Update]);
    }

    #[tokio::test]
    async fn test_approve_sets_qc_fields() {
        let ctx = setup_repo().await;

        let id = ctx
            .repo
            .create(&InventoryTransfer::new(1), &[])
            .await
            .unwrap();
        ctx.repo.submit(id).await.unwrap();
        ctx.repo
            .approve(id, Some("checked".into()))
            .await
            .unwrap();

        let stored = ctx.repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::QcApproved);
        assert_eq!(stored.qc_notes.as_deref(), Some("checked"));
        assert!(stored.qc_approved_at.is_some());
    }
}
