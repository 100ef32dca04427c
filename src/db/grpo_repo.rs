use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::queue_repo::enqueue_with;
use super::DocumentStore;
use crate::models::{parse_timestamp, DocumentStatus, GrpoDocument, GrpoItem, GrpoMutation,
    QueuePayload, GRPO_TABLE};

pub struct GrpoRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct GrpoRow {
    id: i64,
    po_number: String,
    supplier_code: Option<String>,
    supplier_name: Option<String>,
    warehouse_code: Option<String>,
    user_id: Option<i64>,
    qc_approver_id: Option<i64>,
    qc_approved_at: Option<String>,
    qc_notes: Option<String>,
    status: String,
    po_total: Option<f64>,
    sap_document_number: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct GrpoItemRow {
    id: i64,
    grpo_document_id: i64,
    line_number: i64,
    item_code: String,
    item_name: Option<String>,
    received_quantity: f64,
    ordered_quantity: Option<f64>,
    unit_of_measure: Option<String>,
    batch_number: Option<String>,
    expiration_date: Option<String>,
    serial_number: Option<String>,
    warehouse_code: Option<String>,
    bin_location: Option<String>,
}

fn hydrate(row: GrpoRow) -> GrpoDocument {
    GrpoDocument {
        id: row.id,
        po_number: row.po_number,
        supplier_code: row.supplier_code,
        supplier_name: row.supplier_name,
        warehouse_code: row.warehouse_code,
        user_id: row.user_id,
        qc_approver_id: row.qc_approver_id,
        qc_approved_at: row.qc_approved_at.as_deref().map(parse_timestamp),
        qc_notes: row.qc_notes,
        status: DocumentStatus::parse(&row.status),
        po_total: row.po_total,
        sap_document_number: row.sap_document_number,
        notes: row.notes,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

fn hydrate_item(row: GrpoItemRow) -> GrpoItem {
    GrpoItem {
        id: row.id,
        grpo_document_id: row.grpo_document_id,
        line_number: row.line_number,
        item_code: row.item_code,
        item_name: row.item_name,
        received_quantity: row.received_quantity,
        ordered_quantity: row.ordered_quantity,
        unit_of_measure: row.unit_of_measure,
        batch_number: row.batch_number,
        expiration_date: row.expiration_date,
        serial_number: row.serial_number,
        warehouse_code: row.warehouse_code,
        bin_location: row.bin_location,
    }
}

impl GrpoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a GRPO document with its line items and queue the INSERT for
    /// upload. The domain write and the queue append commit in one
    /// transaction. Returns the provisional local id.
    pub async fn create(
        &self,
        document: &GrpoDocument,
        items: &[GrpoItem],
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO grpo_documents
                (po_number, supplier_code, supplier_name, warehouse_code, user_id,
                 status, po_total, notes, created_at, updated_at, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&document.po_number)
        .bind(&document.supplier_code)
        .bind(&document.supplier_name)
        .bind(&document.warehouse_code)
        .bind(document.user_id)
        .bind(document.status.as_str())
        .bind(document.po_total)
        .bind(&document.notes)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO grpo_items
                    (grpo_document_id, line_number, item_code, item_name,
                     received_quantity, ordered_quantity, unit_of_measure, batch_number,
                     expiration_date, serial_number, warehouse_code, bin_location,
                     created_at, updated_at, synced)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
                "#,
            )
            .bind(id)
            .bind(item.line_number)
            .bind(&item.item_code)
            .bind(&item.item_name)
            .bind(item.received_quantity)
            .bind(item.ordered_quantity)
            .bind(&item.unit_of_measure)
            .bind(&item.batch_number)
            .bind(&item.expiration_date)
            .bind(&item.serial_number)
            .bind(&item.warehouse_code)
            .bind(&item.bin_location)
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        let mut snapshot = document.clone();
        snapshot.id = id;
        snapshot.created_at = now;
        snapshot.updated_at = now;
        let snapshot_items: Vec<GrpoItem> = items
            .iter()
            .map(|item| {
                let mut item = item.clone();
                item.grpo_document_id = id;
                item
            })
            .collect();
        enqueue_with(
            &mut tx,
            id,
            &QueuePayload::Grpo(GrpoMutation::Insert {
                document: snapshot,
                items: snapshot_items,
            }),
        )
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Rewrite an existing document's fields and queue the UPDATE.
    pub async fn update(&self, id: i64, document: &GrpoDocument) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE grpo_documents
            SET po_number = ?, supplier_code = ?, supplier_name = ?, warehouse_code = ?,
                status = ?, po_total = ?, notes = ?, updated_at = ?, synced = 0
            WHERE id = ?
            "#,
        )
        .bind(&document.po_number)
        .bind(&document.supplier_code)
        .bind(&document.supplier_name)
        .bind(&document.warehouse_code)
        .bind(document.status.as_str())
        .bind(document.po_total)
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
            &QueuePayload::Grpo(GrpoMutation::Update { document: snapshot }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Move the document to `submitted` and queue the state transition.
    pub async fn submit(&self, id: i64) -> Result<(), sqlx::Error> {
        self.transition(id, DocumentStatus::Submitted, QueuePayload::Grpo(GrpoMutation::Submit))
            .await
    }

    pub async fn approve(&self, id: i64, qc_notes: Option<String>) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE grpo_documents
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
            &QueuePayload::Grpo(GrpoMutation::Approve { qc_notes }),
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
            UPDATE grpo_documents
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
            &QueuePayload::Grpo(GrpoMutation::Reject { qc_notes }),
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
            "UPDATE grpo_documents SET status = ?, updated_at = ?, synced = 0 WHERE id = ?",
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

    pub async fn items(&self, document_id: i64) -> Result<Vec<GrpoItem>, sqlx::Error> {
        let rows: Vec<GrpoItemRow> = sqlx::query_as(
            "SELECT id, grpo_document_id, line_number, item_code, item_name, \
             received_quantity, ordered_quantity, unit_of_measure, batch_number, \
             expiration_date, serial_number, warehouse_code, bin_location \
             FROM grpo_items WHERE grpo_document_id = ? ORDER BY line_number",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(hydrate_item).collect())
    }

    /// Documents owned by one user, newest first.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<GrpoDocument>, sqlx::Error> {
        let rows: Vec<GrpoRow> = sqlx::query_as(
            "SELECT * FROM grpo_documents WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(hydrate).collect())
    }

    pub async fn synced_flag(&self, id: i64) -> Result<Option<bool>, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT synced FROM grpo_documents WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(flag,)| flag != 0))
    }
}

#[async_trait]
impl DocumentStore for GrpoRepository {
    type Doc = GrpoDocument;

    fn table(&self) -> &'static str {
        GRPO_TABLE
    }

    async fn get(&self, id: i64) -> Result<Option<GrpoDocument>, sqlx::Error> {
        let row: Option<GrpoRow> = sqlx::query_as("SELECT * FROM grpo_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hydrate))
    }

    /// Authoritative write from the download phase; bypasses the queue and
    /// marks the record synced.
    async fn upsert_from_server(&self, doc: &GrpoDocument) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO grpo_documents
                (id, po_number, supplier_code, supplier_name, warehouse_code, user_id,
                 qc_approver_id, qc_approved_at, qc_notes, status, po_total,
                 sap_document_number, notes, created_at, updated_at, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT (id) DO UPDATE SET
                po_number = excluded.po_number,
                supplier_code = excluded.supplier_code,
                supplier_name = excluded.supplier_name,
                warehouse_code = excluded.warehouse_code,
                user_id = excluded.user_id,
                qc_approver_id = excluded.qc_approver_id,
                qc_approved_at = excluded.qc_approved_at,
                qc_notes = excluded.qc_notes,
                status = excluded.status,
                po_total = excluded.po_total,
                sap_document_number = excluded.sap_document_number,
                notes = excluded.notes,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                synced = 1
            "#,
        )
        .bind(doc.id)
        .bind(&doc.po_number)
        .bind(&doc.supplier_code)
        .bind(&doc.supplier_name)
        .bind(&doc.warehouse_code)
        .bind(doc.user_id)
        .bind(doc.qc_approver_id)
        .bind(doc.qc_approved_at.map(|dt| dt.to_rfc3339()))
        .bind(&doc.qc_notes)
        .bind(doc.status.as_str())
        .bind(doc.po_total)
        .bind(&doc.sap_document_number)
        .bind(&doc.notes)
        .bind(doc.created_at.to_rfc3339())
        .bind(doc.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_synced(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE grpo_documents SET synced = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace the provisional local id with the server-assigned one after a
    /// successful INSERT upload. Line items follow via ON UPDATE CASCADE;
    /// still-queued entries for the record move in the same transaction.
    async fn rekey(&self, old_id: i64, server_id: i64) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if old_id != server_id {
            sqlx::query("UPDATE grpo_documents SET id = ? WHERE id = ?")
                .bind(server_id)
                .bind(old_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE sync_queue SET record_id = ? WHERE table_name = ? AND record_id = ?",
            )
            .bind(server_id)
            .bind(GRPO_TABLE)
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
        repo: GrpoRepository,
        queue: SyncQueueRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(db_path).await.unwrap();
        TestContext {
            repo: GrpoRepository::new(pool.clone()),
            queue: SyncQueueRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_create_writes_document_items_and_queue_entry() {
        let ctx = setup_repo().await;

        let doc = GrpoDocument::new("PO-1001", 1)
            .with_supplier("SUP01", Some("Acme Supply".into()))
            .with_warehouse("WH01");
        let mut batch_item = GrpoItem::new(2, "ITEM-B", 4.0);
        batch_item.batch_number = Some("B-550".into());
        let items = vec![GrpoItem::new(1, "ITEM-A", 10.0).with_bin("A-01-01"), batch_item];

        let id = ctx.repo.create(&doc, &items).await.unwrap();

        let stored = ctx.repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.po_number, "PO-1001");
        assert_eq!(stored.status, DocumentStatus::Draft);
        assert_eq!(ctx.repo.synced_flag(id).await.unwrap(), Some(false));

        let items = ctx.repo.items(id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_code, "ITEM-A");

        let entries = ctx.queue.drain().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record_id, id);
        assert_eq!(
            entries[0].payload.as_ref().unwrap().operation(),
            Operation::Insert
        );
    }

    #[tokio::test]
    async fn test_submit_transitions_and_queues() {
        let ctx = setup_repo().await;

        let id = ctx
            .repo
            .create(&GrpoDocument::new("PO-2", 1), &[])
            .await
            .unwrap();
        ctx.repo.submit(id).await.unwrap();

        let stored = ctx.repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Submitted);

        let ops: Vec<Operation> = ctx
            .queue
            .drain()
            .await
            .unwrap()
            .iter()
            .map(|e| e.payload.as_ref().unwrap().operation())
            .collect();
        assert_eq!(ops, vec![Operation::Insert, Operation::Submit]);
    }

    #[tokio::test]
    async fn test_update_rewrites_fields_and_queues() {
        let ctx = setup_repo().await;

        let id = ctx
            .repo
            .create(&GrpoDocument::new("PO-2", 1), &[])
            .await
            .unwrap();
        let mut doc = ctx.repo.get(id).await.unwrap().unwrap();
        doc.warehouse_code = Some("WH02".into());
        doc.notes = Some("recount on arrival".into());
        ctx.repo.update(id, &doc).await.unwrap();

        let stored = ctx.repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.warehouse_code.as_deref(), Some("WH02"));
        assert_eq!(stored.notes.as_deref(), Some("recount on arrival"));
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
    async fn test_transition_on_missing_document_fails() {
        let ctx = setup_repo().await;
        let err = ctx.repo.submit(99).await.unwrap_err();
        assert!(matches!(err, sqlx::Error::RowNotFound));
        // Nothing queued for the failed transition.
        assert_eq!(ctx.queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_from_server_marks_synced() {
        let ctx = setup_repo().await;

        let mut doc = GrpoDocument::new("PO-77", 1);
        doc.id = 77;
        ctx.repo.upsert_from_server(&doc).await.unwrap();

        assert_eq!(ctx.repo.synced_flag(77).await.unwrap(), Some(true));
        assert_eq!(ctx.queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rekey_moves_items_and_queue_entries() {
        let ctx = setup_repo().await;

        let doc = GrpoDocument::new("PO-3", 1);
        let items = vec![GrpoItem::new(1, "ITEM-C", 1.0)];
        let local_id = ctx.repo.create(&doc, &items).await.unwrap();
        ctx.repo.submit(local_id).await.unwrap();

        ctx.repo.rekey(local_id, 500).await.unwrap();

        assert!(ctx.repo.get(local_id).await.unwrap().is_none());
        let stored = ctx.repo.get(500).await.unwrap().unwrap();
        assert_eq!(stored.po_number, "PO-3");
        assert_eq!(ctx.repo.items(500).await.unwrap().len(), 1);
        // re-keying alone does not mark the record synced
        assert_eq!(ctx.repo.synced_flag(500).await.unwrap(), Some(false));

        for entry in ctx.queue.drain().await.unwrap() {
            assert_eq!(entry.record_id, 500);
        }
    }
}
