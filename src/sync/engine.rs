use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::{SyncError, SyncOutcome, SyncReport, SyncStatus};
use crate::api::RemoteApi;
use crate::db::{
    DocumentStore, GrpoRepository, PickListRepository, QueueEntry, SyncQueueRepository,
    TransferRepository,
};
use crate::models::{
    GrpoMutation, PickListMutation, QueuePayload, ServerRecord, TransferMutation,
};

/// What a successful upload of one queue entry did remotely.
enum UploadEffect {
    /// The server created the record and assigned this id.
    Created(i64),
    /// The server applied the mutation to an existing record.
    Applied,
}

/// Orchestrates upload-then-download sync passes against the remote API.
///
/// Constructed explicitly from a pool and an API implementation; tests pass
/// an in-memory fake. The `in_progress` flag gives at-most-one concurrency:
/// a pass requested while another runs is dropped.
pub struct SyncEngine<A: RemoteApi> {
    api: A,
    grpos: GrpoRepository,
    transfers: TransferRepository,
    pick_lists: PickListRepository,
    queue: SyncQueueRepository,
    in_progress: AtomicBool,
    status: Mutex<SyncStatus>,
}

/// Clears the in-progress flag on every exit path, including early returns.
struct InProgressGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl<A: RemoteApi> SyncEngine<A> {
    pub fn new(pool: SqlitePool, api: A) -> Self {
        Self {
            api,
            grpos: GrpoRepository::new(pool.clone()),
            transfers: TransferRepository::new(pool.clone()),
            pick_lists: PickListRepository::new(pool.clone()),
            queue: SyncQueueRepository::new(pool),
            in_progress: AtomicBool::new(false),
            status: Mutex::new(SyncStatus::Idle),
        }
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.lock().unwrap()
    }

    fn set_status(&self, status: SyncStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Run one full pass: upload queued mutations in creation order, then
    /// merge the server's collections. Returns `AlreadyRunning` without
    /// touching anything if a pass is in flight, and `SyncError::Offline`
    /// if the server is unreachable.
    pub async fn perform_full_sync(&self) -> Result<SyncOutcome, SyncError> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            debug!("sync already in progress, dropping request");
            return Ok(SyncOutcome::AlreadyRunning);
        }
        let _guard = InProgressGuard {
            flag: &self.in_progress,
        };

        self.set_status(SyncStatus::Syncing);

        if let Err(e) = self.api.ping().await {
            self.set_status(SyncStatus::Error);
            return Err(SyncError::Offline(e.to_string()));
        }

        info!("starting full synchronization");
        let mut report = SyncReport::default();
        match self.run_phases(&mut report).await {
            Ok(()) => {
                info!(
                    uploaded = report.uploaded,
                    failed = report.upload_failures,
                    inserted = report.inserted,
                    updated = report.updated,
                    "synchronization complete"
                );
                self.set_status(SyncStatus::Success);
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                warn!(error = %e, "synchronization failed");
                self.set_status(SyncStatus::Error);
                Err(e)
            }
        }
    }

    async fn run_phases(&self, report: &mut SyncReport) -> Result<(), SyncError> {
        self.upload_pending(report).await?;
        self.download_server_data(report).await?;
        Ok(())
    }

    /// Upload phase: replay queued mutations strictly in creation order. A
    /// failing entry is recorded and skipped; it never aborts the batch.
    async fn upload_pending(&self, report: &mut SyncReport) -> Result<(), SyncError> {
        let entries = self.queue.drain().await?;
        if entries.is_empty() {
            debug!("no pending local changes");
            return Ok(());
        }
        info!(pending = entries.len(), "uploading local changes");

        // Re-keys performed earlier in this batch. The drained snapshot still
        // carries provisional ids for entries queued before their INSERT
        // uploaded, so later entries must be translated before dispatch.
        let mut rekeyed: HashMap<(&'static str, i64), i64> = HashMap::new();

        for entry in entries {
            let Some(payload) = entry.payload.as_ref() else {
                warn!(entry = entry.id, table = %entry.table_name,
                    "dropping queue entry that no longer decodes");
                self.queue.acknowledge(entry.id).await?;
                report.dropped += 1;
                continue;
            };

            let record_id = rekeyed
                .get(&(payload.table_name(), entry.record_id))
                .copied()
                .unwrap_or(entry.record_id);

            match self.apply_entry(record_id, payload).await {
                Ok(effect) => {
                    if let UploadEffect::Created(server_id) = &effect {
                        rekeyed.insert((payload.table_name(), entry.record_id), *server_id);
                    }
                    if let Err(e) = self.record_success(&entry, record_id, payload, effect).await {
                        warn!(entry = entry.id, error = %e,
                            "failed to record upload locally, will retry");
                        self.queue.mark_failed(entry.id, &e.to_string()).await?;
                        report.upload_failures += 1;
                    } else {
                        report.uploaded += 1;
                    }
                }
                Err(e) => {
                    warn!(entry = entry.id, table = %entry.table_name, error = %e,
                        "queue entry failed, leaving for next pass");
                    self.queue.mark_failed(entry.id, &e.to_string()).await?;
                    report.upload_failures += 1;
                }
            }
        }
        Ok(())
    }

    /// Dispatch one typed mutation to its remote endpoint.
    async fn apply_entry(
        &self,
        record_id: i64,
        payload: &QueuePayload,
    ) -> Result<UploadEffect, crate::api::ApiError> {
        let effect = match payload {
            QueuePayload::Grpo(mutation) => match mutation {
                GrpoMutation::Insert { document, items } => {
                    let server_id = self.api.create_grpo(document, items).await?;
                    UploadEffect::Created(server_id)
                }
                GrpoMutation::Update { document } => {
                    self.api.update_grpo(record_id, document).await?;
                    UploadEffect::Applied
                }
                GrpoMutation::Submit => {
                    self.api.submit_grpo(record_id).await?;
                    UploadEffect::Applied
                }
                GrpoMutation::Approve { qc_notes } => {
                    self.api.approve_grpo(record_id, qc_notes.as_deref()).await?;
                    UploadEffect::Applied
                }
                GrpoMutation::Reject { qc_notes } => {
                    self.api.reject_grpo(record_id, qc_notes.as_deref()).await?;
                    UploadEffect::Applied
                }
            },
            QueuePayload::Transfer(mutation) => match mutation {
                TransferMutation::Insert { document, items } => {
                    let server_id = self.api.create_transfer(document, items).await?;
                    UploadEffect::Created(server_id)
                }
                TransferMutation::Update { document } => {
                    self.api.update_transfer(record_id, document).await?;
                    UploadEffect::Applied
                }
                TransferMutation::Submit => {
                    self.api.submit_transfer(record_id).await?;
                    UploadEffect::Applied
                }
                TransferMutation::Approve { qc_notes } => {
                    self.api
                        .approve_transfer(record_id, qc_notes.as_deref())
                        .await?;
                    UploadEffect::Applied
                }
                TransferMutation::Reject { qc_notes } => {
                    self.api
                        .reject_transfer(record_id, qc_notes.as_deref())
                        .await?;
                    UploadEffect::Applied
                }
                TransferMutation::Reopen => {
                    self.api.reopen_transfer(record_id).await?;
                    UploadEffect::Applied
                }
            },
            QueuePayload::PickList(mutation) => match mutation {
                PickListMutation::Insert { document, items } => {
                    let server_id = self.api.create_pick_list(document, items).await?;
                    UploadEffect::Created(server_id)
                }
                PickListMutation::Update { document } => {
                    self.api.update_pick_list(record_id, document).await?;
                    UploadEffect::Applied
                }
            },
        };
        Ok(effect)
    }

    /// After the server accepted an entry: re-key on create, flip the
    /// record's synced flag once nothing else is queued for it, then drop
    /// the entry. Acknowledged immediately, never batched.
    async fn record_success(
        &self,
        entry: &QueueEntry,
        record_id: i64,
        payload: &QueuePayload,
        effect: UploadEffect,
    ) -> Result<(), sqlx::Error> {
        let final_id = match effect {
            UploadEffect::Created(server_id) => {
                match payload {
                    QueuePayload::Grpo(_) => self.grpos.rekey(record_id, server_id).await?,
                    QueuePayload::Transfer(_) => {
                        self.transfers.rekey(record_id, server_id).await?
                    }
                    QueuePayload::PickList(_) => {
                        self.pick_lists.rekey(record_id, server_id).await?
                    }
                }
                server_id
            }
            UploadEffect::Applied => record_id,
        };
        let pending = self
            .queue
            .has_pending_for(payload.table_name(), final_id, entry.id)
            .await?;
        if !pending {
            match payload {
                QueuePayload::Grpo(_) => self.grpos.mark_synced(final_id).await?,
                QueuePayload::Transfer(_) => self.transfers.mark_synced(final_id).await?,
                QueuePayload::PickList(_) => self.pick_lists.mark_synced(final_id).await?,
            }
        }
        self.queue.acknowledge(entry.id).await
    }

    /// Download phase: pull each collection and merge it with last-write-wins.
    /// The three collections are independent; a failed fetch skips only that
    /// collection.
    async fn download_server_data(&self, report: &mut SyncReport) -> Result<(), SyncError> {
        info!("downloading server data");

        match self.api.list_grpos().await {
            Ok(docs) => self.merge_collection(&self.grpos, docs, report).await?,
            Err(e) => {
                warn!(error = %e, "failed to fetch GRPO documents");
                report.skipped += 1;
            }
        }

        match self.api.list_transfers().await {
            Ok(docs) => self.merge_collection(&self.transfers, docs, report).await?,
            Err(e) => {
                warn!(error = %e, "failed to fetch inventory transfers");
                report.skipped += 1;
            }
        }

        match self.api.list_pick_lists().await {
            Ok(docs) => self.merge_collection(&self.pick_lists, docs, report).await?,
            Err(e) => {
                warn!(error = %e, "failed to fetch pick lists");
                report.skipped += 1;
            }
        }

        Ok(())
    }

    /// Merge one server collection into the local table. Insert unknown
    /// records; overwrite known ones only when the server copy is strictly
    /// newer. Per-record failures are logged and skipped.
    async fn merge_collection<S>(
        &self,
        store: &S,
        server_docs: Vec<S::Doc>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError>
    where
        S: DocumentStore,
    {
        for doc in server_docs {
            let id = doc.record_id();
            match store.get(id).await {
                Ok(None) => match store.upsert_from_server(&doc).await {
                    Ok(()) => report.inserted += 1,
                    Err(e) => {
                        warn!(table = store.table(), record = id, error = %e,
                            "failed to insert server record");
                        report.skipped += 1;
                    }
                },
                Ok(Some(local)) => {
                    if doc.last_updated() > local.last_updated() {
                        match store.upsert_from_server(&doc).await {
                            Ok(()) => report.updated += 1,
                            Err(e) => {
                                warn!(table = store.table(), record = id, error = %e,
                                    "failed to overwrite stale local record");
                                report.skipped += 1;
                            }
                        }
                    } else {
                        report.unchanged += 1;
                    }
                }
                Err(e) => {
                    warn!(table = store.table(), record = id, error = %e,
                        "failed to read local record during merge");
                    report.skipped += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::db::init_db;
    use crate::models::{GrpoDocument, GrpoItem, InventoryTransfer, PickList,
        PickListItem, TransferItem};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::AtomicI64;
    use std::time::Duration;
    use tempfile::TempDir;

    /// In-memory stand-in for the remote API. Creates hand out ids starting
    /// at 500; calls are recorded for ordering assertions; `fail_po` makes
    /// `create_grpo` reject one specific purchase order and `fail_submit_id`
    /// makes `submit_grpo` reject one specific document.
    #[derive(Default)]
    struct FakeApi {
        offline: Mutex<bool>,
        slow_ping: Mutex<bool>,
        fail_po: Mutex<Option<String>>,
        fail_submit_id: Mutex<Option<i64>>,
        calls: Mutex<Vec<String>>,
        next_id: AtomicI64,
        grpos: Mutex<Vec<GrpoDocument>>,
        transfers: Mutex<Vec<InventoryTransfer>>,
        pick_lists: Mutex<Vec<PickList>>,
    }

    impl FakeApi {
        fn new() -> Self {
            let api = Self::default();
            api.next_id.store(500, Ordering::SeqCst);
            api
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn server_error() -> ApiError {
            ApiError::Status {
                status: 500,
                message: "internal error".into(),
            }
        }
    }

    #[async_trait]
    impl RemoteApi for FakeApi {
        async fn ping(&self) -> Result<(), ApiError> {
            if *self.slow_ping.lock().unwrap() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.record("ping");
            if *self.offline.lock().unwrap() {
                return Err(ApiError::Status {
                    status: 503,
                    message: "unreachable".into(),
                });
            }
            Ok(())
        }

        async fn create_grpo(
            &self,
            document: &GrpoDocument,
            _items: &[GrpoItem],
        ) -> Result<i64, ApiError> {
            self.record(format!("create_grpo({})", document.po_number));
            if self.fail_po.lock().unwrap().as_deref() == Some(document.po_number.as_str()) {
                return Err(Self::server_error());
            }
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn update_grpo(&self, id: i64, _document: &GrpoDocument) -> Result<(), ApiError> {
            self.record(format!("update_grpo({})", id));
            Ok(())
        }

        async fn submit_grpo(&self, id: i64) -> Result<(), ApiError> {
            self.record(format!("submit_grpo({})", id));
            if *self.fail_submit_id.lock().unwrap() == Some(id) {
                return Err(Self::server_error());
            }
            Ok(())
        }

        async fn approve_grpo(&self, id: i64, _qc_notes: Option<&str>) -> Result<(), ApiError> {
            self.record(format!("approve_grpo({})", id));
            Ok(())
        }

        async fn reject_grpo(&self, id: i64, _qc_notes: Option<&str>) -> Result<(), ApiError> {
            self.record(format!("reject_grpo({})", id));
            Ok(())
        }

        async fn list_grpos(&self) -> Result<Vec<GrpoDocument>, ApiError> {
            self.record("list_grpos");
            Ok(self.grpos.lock().unwrap().clone())
        }

        async fn create_transfer(
            &self,
            _document: &InventoryTransfer,
            _items: &[TransferItem],
        ) -> Result<i64, ApiError> {
            self.record("create_transfer");
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn update_transfer(
            &self,
            id: i64,
            _document: &InventoryTransfer,
        ) -> Result<(), ApiError> {
            self.record(format!("update_transfer({})", id));
            Ok(())
        }

        async fn submit_transfer(&self, id: i64) -> Result<(), ApiError> {
            self.record(format!("submit_transfer({})", id));
            Ok(())
        }

        async fn approve_transfer(
            &self,
            id: i64,
            _qc_notes: Option<&str>,
        ) -> Result<(), ApiError> {
            self.record(format!("approve_transfer({})", id));
            Ok(())
        }

        async fn reject_transfer(
            &self,
            id: i64,
            _qc_notes: Option<&str>,
        ) -> Result<(), ApiError> {
            self.record(format!("reject_transfer({})", id));
            Ok(())
        }

        async fn reopen_transfer(&self, id: i64) -> Result<(), ApiError> {
            self.record(format!("reopen_transfer({})", id));
            Ok(())
        }

        async fn list_transfers(&self) -> Result<Vec<InventoryTransfer>, ApiError> {
            self.record("list_transfers");
            Ok(self.transfers.lock().unwrap().clone())
        }

        async fn create_pick_list(
            &self,
            _document: &PickList,
            _items: &[PickListItem],
        ) -> Result<i64, ApiError> {
            self.record("create_pick_list");
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn update_pick_list(&self, id: i64, _document: &PickList) -> Result<(), ApiError> {
            self.record(format!("update_pick_list({})", id));
            Ok(())
        }

        async fn list_pick_lists(&self) -> Result<Vec<PickList>, ApiError> {
            self.record("list_pick_lists");
            Ok(self.pick_lists.lock().unwrap().clone())
        }
    }

    struct TestContext {
        engine: SyncEngine<FakeApi>,
        pool: SqlitePool,
        grpos: GrpoRepository,
        queue: SyncQueueRepository,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(db_path).await.unwrap();
        TestContext {
            engine: SyncEngine::new(pool.clone(), FakeApi::new()),
            grpos: GrpoRepository::new(pool.clone()),
            queue: SyncQueueRepository::new(pool.clone()),
            pool,
            _temp_dir: temp_dir,
        }
    }

    fn ts(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn server_grpo(id: i64, po: &str, updated_at: &str) -> GrpoDocument {
        let mut doc = GrpoDocument::new(po, 1);
        doc.id = id;
        doc.created_at = ts("2024-01-01T00:00:00Z");
        doc.updated_at = ts(updated_at);
        doc
    }

    #[tokio::test]
    async fn test_insert_upload_drains_queue_and_rekeys() {
        let ctx = setup().await;

        let local_id = ctx
            .grpos
            .create(
                &GrpoDocument::new("PO-1", 1),
                &[GrpoItem::new(1, "ITEM-A", 2.0)],
            )
            .await
            .unwrap();

        let outcome = ctx.engine.perform_full_sync().await.unwrap();
        let report = match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(report.uploaded, 1);
        assert_eq!(ctx.queue.pending_count().await.unwrap(), 0);

        // Record now lives under the server-assigned id, marked synced.
        assert!(ctx.grpos.get(local_id).await.unwrap().is_none());
        let stored = ctx.grpos.get(500).await.unwrap().unwrap();
        assert_eq!(stored.po_number, "PO-1");
        assert_eq!(ctx.grpos.synced_flag(500).await.unwrap(), Some(true));
        assert_eq!(ctx.grpos.items(500).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_queued_submit_follows_insert_with_server_id() {
        let ctx = setup().await;

        let local_id = ctx
            .grpos
            .create(&GrpoDocument::new("PO-1", 1), &[])
            .await
            .unwrap();
        ctx.grpos.submit(local_id).await.unwrap();

        ctx.engine.perform_full_sync().await.unwrap();

        let calls = ctx.engine.api.calls();
        let create_pos = calls.iter().position(|c| c == "create_grpo(PO-1)").unwrap();
        let submit_pos = calls.iter().position(|c| c == "submit_grpo(500)").unwrap();
        assert!(create_pos < submit_pos);
        assert_eq!(ctx.queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let ctx = setup().await;

        ctx.grpos
            .create(&GrpoDocument::new("PO-OK", 1), &[])
            .await
            .unwrap();
        let failing_id = ctx
            .grpos
            .create(&GrpoDocument::new("PO-FAIL", 1), &[])
            .await
            .unwrap();
        ctx.grpos
            .create(&GrpoDocument::new("PO-ALSO-OK", 1), &[])
            .await
            .unwrap();
        *ctx.engine.api.fail_po.lock().unwrap() = Some("PO-FAIL".into());

        let outcome = ctx.engine.perform_full_sync().await.unwrap();
        let report = match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("unexpected outcome: {:?}", other),
        };

        // Entries before and after the failing one were still applied.
        assert_eq!(report.uploaded, 2);
        assert_eq!(report.upload_failures, 1);

        let remaining = ctx.queue.drain().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].record_id, failing_id);
        assert_eq!(remaining[0].retry_count, 1);
        assert!(remaining[0]
            .last_error
            .as_deref()
            .unwrap()
            .contains("500"));
        assert_eq!(
            ctx.grpos.synced_flag(failing_id).await.unwrap(),
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_record_stays_unsynced_while_follow_up_entry_is_queued() {
        let ctx = setup().await;

        // Queue an insert and a submit, then let the server accept the
        // insert but reject the submit.
        let local_id = ctx
            .grpos
            .create(&GrpoDocument::new("PO-1", 1), &[])
            .await
            .unwrap();
        ctx.grpos.submit(local_id).await.unwrap();
        *ctx.engine.api.fail_submit_id.lock().unwrap() = Some(500);

        let outcome = ctx.engine.perform_full_sync().await.unwrap();
        let report = match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.upload_failures, 1);

        // The submit is still pending under the server id, so the record
        // must still read as awaiting upload.
        let remaining = ctx.queue.drain().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].record_id, 500);
        assert_eq!(ctx.grpos.synced_flag(500).await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_download_inserts_unknown_records() {
        let ctx = setup().await;
        ctx.engine
            .api
            .grpos
            .lock()
            .unwrap()
            .push(server_grpo(7, "PO-7", "2024-01-02T00:00:00Z"));

        let outcome = ctx.engine.perform_full_sync().await.unwrap();
        let report = match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(report.inserted, 1);

        let stored = ctx.grpos.get(7).await.unwrap().unwrap();
        assert_eq!(stored.po_number, "PO-7");
        assert_eq!(ctx.grpos.synced_flag(7).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_download_overwrites_only_when_strictly_newer() {
        let ctx = setup().await;

        let mut local = server_grpo(7, "PO-LOCAL", "2024-01-01T00:00:00Z");
        local.notes = Some("local copy".into());
        ctx.grpos.upsert_from_server(&local).await.unwrap();
        sqlx::query("UPDATE grpo_documents SET synced = 0 WHERE id = 7")
            .execute(&ctx.pool)
            .await
            .unwrap();

        let mut newer = server_grpo(7, "PO-SERVER", "2024-01-02T00:00:00Z");
        newer.notes = Some("server copy".into());
        ctx.engine.api.grpos.lock().unwrap().push(newer);

        let outcome = ctx.engine.perform_full_sync().await.unwrap();
        let report = match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(report.updated, 1);

        let stored = ctx.grpos.get(7).await.unwrap().unwrap();
        assert_eq!(stored.po_number, "PO-SERVER");
        assert_eq!(stored.notes.as_deref(), Some("server copy"));
        assert_eq!(ctx.grpos.synced_flag(7).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_download_leaves_stale_server_record_alone() {
        let ctx = setup().await;

        let local = server_grpo(9, "PO-LOCAL", "2024-02-01T00:00:00Z");
        ctx.grpos.upsert_from_server(&local).await.unwrap();
        sqlx::query("UPDATE grpo_documents SET synced = 0 WHERE id = 9")
            .execute(&ctx.pool)
            .await
            .unwrap();

        let stale = server_grpo(9, "PO-STALE", "2024-01-01T00:00:00Z");
        ctx.engine.api.grpos.lock().unwrap().push(stale);

        let outcome = ctx.engine.perform_full_sync().await.unwrap();
        let report = match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(report.unchanged, 1);

        // Fields and synced flag untouched.
        let stored = ctx.grpos.get(9).await.unwrap().unwrap();
        assert_eq!(stored.po_number, "PO-LOCAL");
        assert_eq!(ctx.grpos.synced_flag(9).await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_download_is_idempotent_on_equal_timestamps() {
        let ctx = setup().await;

        ctx.engine
            .api
            .grpos
            .lock()
            .unwrap()
            .push(server_grpo(7, "PO-7", "2024-01-02T00:00:00Z"));

        ctx.engine.perform_full_sync().await.unwrap();
        let first = ctx.grpos.get(7).await.unwrap().unwrap();

        // Same record, same updated_at: the second pass changes nothing.
        let outcome = ctx.engine.perform_full_sync().await.unwrap();
        let report = match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(report.unchanged, 1);

        let second = ctx.grpos.get(7).await.unwrap().unwrap();
        assert_eq!(second.po_number, first.po_number);
        assert_eq!(second.updated_at, first.updated_at);
    }

    #[tokio::test]
    async fn test_download_replaces_record_with_unreadable_timestamp() {
        let ctx = setup().await;

        // A corrupt local updated_at reads as the epoch, so any server copy
        // wins the comparison.
        ctx.grpos
            .upsert_from_server(&server_grpo(7, "PO-STALE", "2024-01-02T00:00:00Z"))
            .await
            .unwrap();
        sqlx::query("UPDATE grpo_documents SET updated_at = 'garbage' WHERE id = 7")
            .execute(&ctx.pool)
            .await
            .unwrap();
        ctx.engine
            .api
            .grpos
            .lock()
            .unwrap()
            .push(server_grpo(7, "PO-FRESH", "2024-01-03T00:00:00Z"));

        let outcome = ctx.engine.perform_full_sync().await.unwrap();
        let report = match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(report.updated, 1);
        assert_eq!(ctx.grpos.get(7).await.unwrap().unwrap().po_number, "PO-FRESH");
    }

    #[tokio::test]
    async fn test_offline_aborts_before_any_phase() {
        let ctx = setup().await;
        ctx.grpos
            .create(&GrpoDocument::new("PO-1", 1), &[])
            .await
            .unwrap();
        *ctx.engine.api.offline.lock().unwrap() = true;

        let err = ctx.engine.perform_full_sync().await.unwrap_err();
        assert!(matches!(err, SyncError::Offline(_)));
        assert_eq!(ctx.engine.status(), SyncStatus::Error);

        // Nothing was uploaded or acknowledged.
        assert_eq!(ctx.queue.pending_count().await.unwrap(), 1);
        assert_eq!(ctx.engine.api.calls(), vec!["ping".to_string()]);

        // The in-progress flag was released; a later pass succeeds.
        *ctx.engine.api.offline.lock().unwrap() = false;
        let outcome = ctx.engine.perform_full_sync().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Completed(_)));
        assert_eq!(ctx.engine.status(), SyncStatus::Success);
    }

    #[tokio::test]
    async fn test_second_concurrent_sync_is_dropped() {
        let ctx = setup().await;
        *ctx.engine.api.slow_ping.lock().unwrap() = true;

        let (first, second) =
            tokio::join!(ctx.engine.perform_full_sync(), async {
                // Give the first pass time to take the flag.
                tokio::time::sleep(Duration::from_millis(10)).await;
                ctx.engine.perform_full_sync().await
            });

        assert!(matches!(first.unwrap(), SyncOutcome::Completed(_)));
        assert!(matches!(second.unwrap(), SyncOutcome::AlreadyRunning));

        // The dropped pass never reached the API.
        let pings = ctx
            .engine
            .api
            .calls()
            .iter()
            .filter(|c| *c == "ping")
            .count();
        assert_eq!(pings, 1);
    }

    #[tokio::test]
    async fn test_undecodable_entry_dropped_with_warning() {
        let ctx = setup().await;

        sqlx::query(
            "INSERT INTO sync_queue (table_name, record_id, operation, data, created_at) \
             VALUES ('pick_lists', 4, 'APPROVE', NULL, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&ctx.pool)
        .await
        .unwrap();

        let outcome = ctx.engine.perform_full_sync().await.unwrap();
        let report = match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(report.dropped, 1);
        assert_eq!(ctx.queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_collection_fetch_failure_skips_only_that_collection() {
        let ctx = setup().await;

        // list_grpos succeeds with one record while transfers/pick lists
        // are empty; nothing fatal either way.
        ctx.engine
            .api
            .grpos
            .lock()
            .unwrap()
            .push(server_grpo(3, "PO-3", "2024-01-02T00:00:00Z"));

        let outcome = ctx.engine.perform_full_sync().await.unwrap();
        let report = match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(report.inserted, 1);
        assert_eq!(ctx.engine.status(), SyncStatus::Success);
    }
}
