//! Sync CLI commands.

use clap::{Args, Subcommand};
use sqlx::SqlitePool;
use std::time::Duration;

use crate::api::HttpApi;
use crate::config::{Config, ConfigError};
use crate::db::SyncQueueRepository;
use crate::models::Operation;
use crate::sync::{SyncEngine, SyncOutcome, SyncReport};

/// Synchronize with the warehouse server
#[derive(Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,

    /// Keep running, syncing at the configured interval
    #[arg(long)]
    watch: bool,
}

#[derive(Subcommand)]
enum SyncSubcommand {
    /// Show pending queue entries and server configuration
    Status,
}

impl SyncCommand {
    pub async fn run(
        &self,
        pool: &SqlitePool,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            Some(SyncSubcommand::Status) => self.status(pool, config).await,
            None => {
                if self.watch {
                    self.watch_loop(pool, config).await
                } else {
                    self.sync_once(pool, config).await
                }
            }
        }
    }

    fn build_engine(
        &self,
        pool: &SqlitePool,
        config: &Config,
    ) -> Result<SyncEngine<HttpApi>, Box<dyn std::error::Error>> {
        let url = config
            .server
            .url
            .as_ref()
            .ok_or(ConfigError::NotConfigured)?;
        let api_key = config
            .server
            .api_key
            .as_ref()
            .ok_or(ConfigError::NotConfigured)?;
        let api = HttpApi::new(
            url.clone(),
            api_key.clone(),
            Duration::from_secs(config.server.timeout_secs),
        )?;
        Ok(SyncEngine::new(pool.clone(), api))
    }

    async fn sync_once(
        &self,
        pool: &SqlitePool,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let engine = self.build_engine(pool, config)?;

        println!("Syncing with server...");
        match engine.perform_full_sync().await? {
            SyncOutcome::Completed(report) => print_report(&report),
            SyncOutcome::AlreadyRunning => println!("Sync already in progress."),
        }
        Ok(())
    }

    async fn watch_loop(
        &self,
        pool: &SqlitePool,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let engine = self.build_engine(pool, config)?;
        let mut interval =
            tokio::time::interval(Duration::from_secs(config.server.watch_interval_secs));

        println!(
            "Watching; syncing every {}s (Ctrl-C to stop)",
            config.server.watch_interval_secs
        );
        loop {
            interval.tick().await;
            match engine.perform_full_sync().await {
                Ok(SyncOutcome::Completed(report)) => print_report(&report),
                Ok(SyncOutcome::AlreadyRunning) => {}
                Err(e) => eprintln!("Sync failed ({}): {}", engine.status(), e),
            }
        }
    }

    async fn status(
        &self,
        pool: &SqlitePool,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        if !config.server.is_configured() {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  server:");
            println!("    url: \"http://localhost:5000\"");
            println!("    api_key: \"your-api-key\"");
            println!();
            println!("Or set environment variables:");
            println!("  STOCKSYNC_SERVER_URL");
            println!("  STOCKSYNC_API_KEY");
        } else if let (Some(url), Some(api_key)) =
            (config.server.url.as_ref(), config.server.api_key.as_ref())
        {
            println!("Server:  {}", url);
            println!("API Key: {}...", key_preview(api_key));
            println!("Timeout: {}s", config.server.timeout_secs);
        }
        println!();

        let queue = SyncQueueRepository::new(pool.clone());
        let pending = queue.pending_count().await?;
        println!("Pending queue entries: {}", pending);

        let failed = queue.failed_entries().await?;
        if !failed.is_empty() {
            println!();
            println!("Entries with failed attempts:");
            for entry in failed {
                let operation: Option<Operation> = entry.payload.as_ref().map(|p| p.operation());
                println!(
                    "  #{} {} {} record {} queued {} ({} attempts): {}",
                    entry.id,
                    entry.table_name,
                    operation.map(|op| op.as_str()).unwrap_or("?"),
                    entry.record_id,
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    entry.retry_count,
                    entry.last_error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        Ok(())
    }
}

fn print_report(report: &SyncReport) {
    println!(
        "  uploaded {} (failed {}), downloaded: {} new, {} updated, {} unchanged",
        report.uploaded,
        report.upload_failures,
        report.inserted,
        report.updated,
        report.unchanged
    );
    if report.dropped > 0 {
        println!("  dropped {} undecodable queue entries", report.dropped);
    }
    if report.skipped > 0 {
        println!("  skipped {} records due to errors", report.skipped);
    }
    if report.is_clean() {
        println!("Sync complete.");
    } else {
        println!("Sync completed with warnings; failed entries will retry next pass.");
    }
}

/// First few characters of the key, respecting char boundaries.
fn key_preview(api_key: &str) -> String {
    api_key.chars().take(8).collect()
}
