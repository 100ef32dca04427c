use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::queue_repo::enqueue_with;
use super::DocumentStore;
use crate::models::{parse_timestamp, DocumentStatus, PickList, PickListItem, PickListMutation,
    QueuePayload, PICK_LIST_TABLE};

pub struct PickListRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct PickListRow {
    id: i64,
    sales_order_number: Option<String>,
    customer_code: Option<String>,
    customer_name: Option<String>,
    warehouse_code: Option<String>,
    user_id: Option<i64>,
    status: String,
    priority: Option<String>,
    due_date: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct PickListItemRow {
    id: i64,
    pick_list_id: i64,
    line_number: i64,
    item_code: String,
    item_name: Option<String>,
    ordered_quantity: f64,
    picked_quantity: f64,
    unit_of_measure: Option<String>,
    batch_number: Option<String>,
    bin_location: Option<String>,
}

fn hydrate(row: PickListRow) -> PickList {
    PickList {
        id: row.id,
        sales_order_number: row.sales_order_number,
        customer_code: row.customer_code,
        customer_name: row.customer_name,
        warehouse_code: row.warehouse_code,
        user_id: row.user_id,
        status: DocumentStatus::parse(&row.status),
        priority: row.priority,
        due_date: row.due_date,
        notes: row.notes,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

fn hydrate_item(row: PickListItemRow) -> PickListItem {
    PickListItem {
        id: row.id,
        pick_list_id: row.pick_list_id,
        line_number: row.line_number,
        item_code: row.item_code,
        item_name: row.item_name,
        ordered_quantity: row.ordered_quantity,
        picked_quantity: row.picked_quantity,
        unit_of_measure: row.unit_of_measure,
        batch_number: row.batch_number,
        bin_location: row.bin_location,
    }
}

impl PickListRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a pick list with its lines and queue the INSERT, atomically.
    pub async fn create(
        &self,
        document: &PickList,
        items: &[PickListItem],
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO pick_lists
                (sales_order_number, customer_code, customer_name, warehouse_code,
                 user_id, status, priority, due_date, notes, created_at, updated_at, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&document.sales_order_number)
        .bind(&document.customer_code)
        .bind(&document.customer_name)
        .bind(&document.warehouse_code)
        .bind(document.user_id)
        .bind(document.status.as_str())
        .bind(&document.priority)
        .bind(&document.due_date)
        .bind(&document.notes)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO pick_list_items
                    (pick_list_id, line_number, item_code, item_name, ordered_quantity,
                     picked_quantity, unit_of_measure, batch_number, bin_location,
                     created_at, updated_at, synced)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
                "#,
            )
            .bind(id)
            .bind(item.line_number)
            .bind(&item.item_code)
            .bind(&item.item_name)
            .bind(item.ordered_quantity)
            .bind(item.picked_quantity)
            .bind(&item.unit_of_measure)
            .bind(&item.batch_number)
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
        let snapshot_items: Vec<PickListItem> = items
            .iter()
            .map(|item| {
                let mut item = item.clone();
                item.pick_list_id = id;
                item
            })
            .collect();
        enqueue_with(
            &mut tx,
            id,
            &QueuePayload::PickList(PickListMutation::Insert {
                document: snapshot,
                items: snapshot_items,
            }),
        )
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Rewrite pick list fields (including picked quantities on lines via a
    /// follow-up call) and queue the UPDATE.
    pub async fn update(&self, id: i64, document: &PickList) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE pick_lists
            SET sales_order_number = ?, customer_code = ?, customer_name = ?,
                warehouse_code = ?, status = ?, priority = ?, due_date = ?, notes = ?,
                updated_at = ?, synced = 0
            WHERE id = ?
            "#,
        )
        .bind(&document.sales_order_number)
        .bind(&document.customer_code)
        .bind(&document.customer_name)
        .bind(&document.warehouse_code)
        .bind(document.status.as_str())
        .bind(&document.priority)
        .bind(&document.due_date)
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
            &QueuePayload::PickList(PickListMutation::Update { document: snapshot }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Record a picked quantity against one line. Local-only until the next
    /// document UPDATE is queued by the caller.
    pub async fn set_picked_quantity(
        &self,
        item_id: i64,
        picked_quantity: f64,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pick_list_items SET picked_quantity = ?, updated_at = ?, synced = 0 \
             WHERE id = ?",
        )
        .bind(picked_quantity)
        .bind(Utc::now().to_rfc3339())
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    pub async fn items(&self, pick_list_id: i64) -> Result<Vec<PickListItem>, sqlx::Error> {
        let rows: Vec<PickListItemRow> = sqlx::query_as(
            "SELECT id, pick_list_id, line_number, item_code, item_name, ordered_quantity, \
             picked_quantity, unit_of_measure, batch_number, bin_location \
             FROM pick_list_items WHERE pick_list_id = ? ORDER BY line_number",
        )
        .bind(pick_list_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(hydrate_item).collect())
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<PickList>, sqlx::Error> {
        let rows: Vec<PickListRow> = sqlx::query_as(
            "SELECT * FROM pick_lists WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(hydrate).collect())
    }

    pub async fn synced_flag(&self, id: i64) -> Result<Option<bool>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT synced FROM pick_lists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(flag,)| flag != 0))
    }
}

#[async_trait]
impl DocumentStore for PickListRepository {
    type Doc = PickList;

    fn table(&self) -> &'static str {
        PICK_LIST_TABLE
    }

    async fn get(&self, id: i64) -> Result<Option<PickList>, sqlx::Error> {
        let row: Option<PickListRow> = sqlx::query_as("SELECT * FROM pick_lists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hydrate))
    }

    async fn upsert_from_server(&self, doc: &PickList) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO pick_lists
                (id, sales_order_number, customer_code, customer_name, warehouse_code,
                 user_id, status, priority, due_date, notes, created_at, updated_at, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT (id) DO UPDATE SET
                sales_order_number = excluded.sales_order_number,
                customer_code = excluded.customer_code,
                customer_name = excluded.customer_name,
                warehouse_code = excluded.warehouse_code,
                user_id = excluded.user_id,
                status = excluded.status,
                priority = excluded.priority,
                due_date = excluded.due_date,
                notes = excluded.notes,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                synced = 1
            "#,
        )
        .bind(doc.id)
        .bind(&doc.sales_order_number)
        .bind(&doc.customer_code)
        .bind(&doc.customer_name)
        .bind(&doc.warehouse_code)
        .bind(doc.user_id)
        .bind(doc.status.as_str())
        .bind(&doc.priority)
        .bind(&doc.due_date)
        .bind(&doc.notes)
        .bind(doc.created_at.to_rfc3339())
        .bind(doc.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_synced(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE pick_lists SET synced = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rekey(&self, old_id: i64, server_id: i64) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if old_id != server_id {
            sqlx::query("UPDATE pick_lists SET id = ? WHERE id = ?")
                .bind(server_id)
                .bind(old_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE sync_queue SET record_id = ? WHERE table_name = ? AND record_id = ?",
            )
            .bind(server_id)
            .bind(PICK_LIST_TABLE)
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
        repo: PickListRepository,
        queue: SyncQueueRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(db_path).await.unwrap();
        TestContext {
            repo: PickListRepository::new(pool.clone()),
            queue: SyncQueueRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_create_update_and_pick() {
        let ctx = setup_repo().await;

        let doc = PickList::new(1)
            .with_sales_order("SO-500")
            .with_customer("CUST01", Some("Northwind".into()))
            .with_warehouse("WH01");
        let items = vec![PickListItem::new(1, "ITEM-A", 6.0)];

        let id = ctx.repo.create(&doc, &items).await.unwrap();

        let lines = ctx.repo.items(id).await.unwrap();
        ctx.repo
            .set_picked_quantity(lines[0].id, 6.0)
            .await
            .unwrap();

        let mut updated = ctx.repo.get(id).await.unwrap().unwrap();
        updated.notes = Some("picked complete".into());
        ctx.repo.update(id, &updated).await.unwrap();

        let lines = ctx.repo.items(id).await.unwrap();
        assert_eq!(lines[0].picked_quantity, 6.0);

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
    async fn test_list_for_user_orders_newest_first() {
        let ctx = setup_repo().await;

        let first = ctx
            .repo
            .create(&PickList::new(9).with_sales_order("SO-1"), &[])
            .await
            .unwrap();
        // Force distinct creation timestamps.
        sqlx::query("UPDATE pick_lists SET created_at = '2024-01-01T00:00:00+00:00' WHERE id = ?")
            .bind(first)
            .execute(&ctx.repo.pool)
            .await
            .unwrap();
        ctx.repo
            .create(&PickList::new(9).with_sales_order("SO-2"), &[])
            .await
            .unwrap();

        let lists = ctx.repo.list_for_user(9).await.unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].sales_order_number.as_deref(), Some("SO-2"));
    }
}
