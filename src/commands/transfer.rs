use clap::{Args, Subcommand};

use super::parse_item_spec;
use crate::config::Config;
use crate::db::{DocumentStore, TransferRepository};
use crate::models::{InventoryTransfer, TransferItem};

/// Manage inventory transfer documents
#[derive(Args)]
pub struct TransferCommand {
    #[command(subcommand)]
    command: TransferSubcommand,
}

#[derive(Subcommand)]
enum TransferSubcommand {
    /// Create a new inventory transfer
    Create {
        /// Source warehouse code
        #[arg(long)]
        from: String,

        /// Destination warehouse code
        #[arg(long)]
        to: String,

        /// Transfer request number, when created from a request
        #[arg(long)]
        request: Option<String>,

        /// Priority (low/normal/high/urgent)
        #[arg(long)]
        priority: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// Transferred line item, CODE:QTY or CODE:QTY:BIN with the source
        /// bin (can be repeated)
        #[arg(long = "item", value_name = "SPEC")]
        items: Vec<String>,
    },

    /// Edit fields on an existing transfer and queue the change
    Update {
        id: i64,

        /// Source warehouse code
        #[arg(long)]
        from: Option<String>,

        /// Destination warehouse code
        #[arg(long)]
        to: Option<String>,

        /// Priority (low/normal/high/urgent)
        #[arg(long)]
        priority: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// List this user's transfers, newest first
    List,

    /// Show one transfer with its line items
    Show { id: i64 },

    /// Submit a draft transfer for QC
    Submit { id: i64 },

    /// Approve a submitted transfer
    Approve {
        id: i64,
        /// QC notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Reject a submitted transfer
    Reject {
        id: i64,
        /// QC notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Reopen a rejected transfer for rework
    Reopen { id: i64 },
}

impl TransferCommand {
    pub async fn run(
        &self,
        repo: &TransferRepository,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            TransferSubcommand::Create {
                from,
                to,
                request,
                priority,
                notes,
                items,
            } => {
                let mut doc = InventoryTransfer::new(config.user_id).with_route(from, to);
                if let Some(request) = request {
                    doc = doc.with_request_number(request);
                }
                if let Some(priority) = priority {
                    doc = doc.with_priority(priority);
                }
                doc.notes = notes.clone();

                let mut lines = Vec::with_capacity(items.len());
                for (index, spec) in items.iter().enumerate() {
                    let (code, qty, bin) = parse_item_spec(spec)?;
                    let mut line = TransferItem::new(index as i64 + 1, code, qty);
                    line.from_bin_location = bin;
                    lines.push(line);
                }

                let id = repo.create(&doc, &lines).await?;
                println!(
                    "Created transfer #{} {} -> {} (queued for sync)",
                    id, from, to
                );
            }
            TransferSubcommand::Update {
                id,
                from,
                to,
                priority,
                notes,
            } => {
                let mut doc = repo
                    .get(*id)
                    .await?
                    .ok_or_else(|| format!("Transfer #{} not found", id))?;
                if let Some(code) = from {
                    doc.from_warehouse = Some(code.clone());
                }
                if let Some(code) = to {
                    doc.to_warehouse = Some(code.clone());
                }
                if let Some(priority) = priority {
                    doc.priority = Some(priority.clone());
                }
                if let Some(notes) = notes {
                    doc.notes = Some(notes.clone());
                }
                repo.update(*id, &doc).await?;
                println!("Transfer #{} updated (queued for sync)", id);
            }
            TransferSubcommand::List => {
                let docs = repo.list_for_user(config.user_id).await?;
                if docs.is_empty() {
                    println!("No inventory transfers.");
                    return Ok(());
                }
                for doc in docs {
                    println!("{}", doc);
                }
            }
            TransferSubcommand::Show { id } => {
                let doc = repo
                    .get(*id)
                    .await?
                    .ok_or_else(|| format!("Transfer #{} not found", id))?;
                println!("{}", doc);
                if let Some(false) = repo.synced_flag(*id).await? {
                    println!("  pending upload");
                }
                if let Some(notes) = &doc.qc_notes {
                    println!("  QC notes: {}", notes);
                }
                for item in repo.items(*id).await? {
                    println!(
                        "  {:>3}. {} x{}",
                        item.line_number, item.item_code, item.quantity
                    );
                }
            }
            TransferSubcommand::Submit { id } => {
                repo.submit(*id).await?;
                println!("Transfer #{} submitted for QC (queued for sync)", id);
            }
            TransferSubcommand::Approve { id, notes } => {
                repo.approve(*id, notes.clone()).await?;
                println!("Transfer #{} approved (queued for sync)", id);
            }
            TransferSubcommand::Reject { id, notes } => {
                repo.reject(*id, notes.clone()).await?;
                println!("Transfer #{} rejected (queued for sync)", id);
            }
            TransferSubcommand::Reopen { id } => {
                repo.reopen(*id).await?;
                println!("Transfer #{} reopened (queued for sync)", id);
            }
        }
        Ok(())
    }
}
