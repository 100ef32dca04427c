use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod api;
mod commands;
mod config;
mod db;
mod models;
mod sync;

use commands::{
    ConfigCommand, GrpoCommand, PickListCommand, ScanCommand, SyncCommand, TransferCommand,
};
use config::Config;
use db::{GrpoRepository, PickListRepository, TransferRepository};

#[derive(Parser)]
#[command(name = "stocksync")]
#[command(version)]
#[command(about = "Offline-first warehouse document client", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage goods-receipt (GRPO) documents
    Grpo(GrpoCommand),

    /// Manage inventory transfers
    Transfer(TransferCommand),

    /// Manage pick lists
    Picklist(PickListCommand),

    /// Validate scanned codes against the server
    Scan(ScanCommand),

    /// Manage configuration
    Config(ConfigCommand),

    /// Sync with the warehouse server
    Sync(SyncCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "stocksync=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;

    match &cli.command {
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        Some(Commands::Scan(cmd)) => {
            cmd.run(&config).await?;
        }
        Some(Commands::Grpo(cmd)) => {
            let pool = db::init_db(config.database_path.clone()).await?;
            let repo = GrpoRepository::new(pool);
            cmd.run(&repo, &config).await?;
        }
        Some(Commands::Transfer(cmd)) => {
            let pool = db::init_db(config.database_path.clone()).await?;
            let repo = TransferRepository::new(pool);
            cmd.run(&repo, &config).await?;
        }
        Some(Commands::Picklist(cmd)) => {
            let pool = db::init_db(config.database_path.clone()).await?;
            let repo = PickListRepository::new(pool);
            cmd.run(&repo, &config).await?;
        }
        Some(Commands::Sync(cmd)) => {
            let pool = db::init_db(config.database_path.clone()).await?;
            cmd.run(&pool, &config).await?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
