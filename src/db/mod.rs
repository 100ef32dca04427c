mod grpo_repo;
mod picklist_repo;
mod queue_repo;
mod transfer_repo;

pub use grpo_repo::GrpoRepository;
pub use picklist_repo::PickListRepository;
pub use queue_repo::{QueueEntry, SyncQueueRepository};
pub use transfer_repo::TransferRepository;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::ServerRecord;

/// Initialize the database connection pool and run migrations
pub async fn init_db(db_path: PathBuf) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| sqlx::Error::Io(e))?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Store-side surface the download-phase merge needs from each document
/// repository: lookup by server id and authoritative overwrite.
#[async_trait]
pub trait DocumentStore {
    type Doc: ServerRecord + Send + Sync;

    fn table(&self) -> &'static str;
    async fn get(&self, id: i64) -> Result<Option<Self::Doc>, sqlx::Error>;
    async fn upsert_from_server(&self, doc: &Self::Doc) -> Result<(), sqlx::Error>;
    async fn mark_synced(&self, id: i64) -> Result<(), sqlx::Error>;
    async fn rekey(&self, old_id: i64, server_id: i64) -> Result<(), sqlx::Error>;
}
