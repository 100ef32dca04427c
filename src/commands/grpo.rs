use clap::{Args, Subcommand};

use super::parse_item_spec;
use crate::config::Config;
use crate::db::{DocumentStore, GrpoRepository};
use crate::models::{GrpoDocument, GrpoItem};

/// Manage goods-receipt (GRPO) documents
#[derive(Args)]
pub struct GrpoCommand {
    #[command(subcommand)]
    command: GrpoSubcommand,
}

#[derive(Subcommand)]
enum GrpoSubcommand {
    /// Create a new GRPO document
    Create {
        /// Purchase order number
        po_number: String,

        /// Supplier code
        #[arg(long)]
        supplier: Option<String>,

        /// Supplier display name
        #[arg(long)]
        supplier_name: Option<String>,

        /// Receiving warehouse code
        #[arg(long)]
        warehouse: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// Received line item, CODE:QTY or CODE:QTY:BIN (can be repeated)
        #[arg(long = "item", value_name = "SPEC")]
        items: Vec<String>,
    },

    /// Edit fields on an existing document and queue the change
    Update {
        id: i64,

        /// Supplier code
        #[arg(long)]
        supplier: Option<String>,

        /// Supplier display name
        #[arg(long)]
        supplier_name: Option<String>,

        /// Receiving warehouse code
        #[arg(long)]
        warehouse: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// List this user's GRPO documents, newest first
    List,

    /// Show one document with its line items
    Show { id: i64 },

    /// Submit a draft document for QC
    Submit { id: i64 },

    /// Approve a submitted document
    Approve {
        id: i64,
        /// QC notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Reject a submitted document
    Reject {
        id: i64,
        /// QC notes
        #[arg(long)]
        notes: Option<String>,
    },
}

impl GrpoCommand {
    pub async fn run(
        &self,
        repo: &GrpoRepository,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            GrpoSubcommand::Create {
                po_number,
                supplier,
                supplier_name,
                warehouse,
                notes,
                items,
            } => {
                let mut doc = GrpoDocument::new(po_number, config.user_id);
                if let Some(code) = supplier {
                    doc = doc.with_supplier(code, supplier_name.clone());
                }
                if let Some(code) = warehouse {
                    doc = doc.with_warehouse(code);
                }
                if let Some(notes) = notes {
                    doc = doc.with_notes(notes);
                }

                let mut lines = Vec::with_capacity(items.len());
                for (index, spec) in items.iter().enumerate() {
                    let (code, qty, bin) = parse_item_spec(spec)?;
                    let mut line = GrpoItem::new(index as i64 + 1, code, qty);
                    if let Some(bin) = bin {
                        line = line.with_bin(bin);
                    }
                    lines.push(line);
                }

                let id = repo.create(&doc, &lines).await?;
                println!("Created GRPO #{} for PO {} (queued for sync)", id, po_number);
            }
            GrpoSubcommand::Update {
                id,
                supplier,
                supplier_name,
                warehouse,
                notes,
            } => {
                let mut doc = repo
                    .get(*id)
                    .await?
                    .ok_or_else(|| format!("GRPO #{} not found", id))?;
                if let Some(code) = supplier {
                    doc.supplier_code = Some(code.clone());
                }
                if let Some(name) = supplier_name {
                    doc.supplier_name = Some(name.clone());
                }
                if let Some(code) = warehouse {
                    doc.warehouse_code = Some(code.clone());
                }
                if let Some(notes) = notes {
                    doc.notes = Some(notes.clone());
                }
                repo.update(*id, &doc).await?;
                println!("GRPO #{} updated (queued for sync)", id);
            }
            GrpoSubcommand::List => {
                let docs = repo.list_for_user(config.user_id).await?;
                if docs.is_empty() {
                    println!("No GRPO documents.");
                    return Ok(());
                }
                for doc in docs {
                    println!("{}", doc);
                }
            }
            GrpoSubcommand::Show { id } => {
                let doc = repo
                    .get(*id)
                    .await?
                    .ok_or_else(|| format!("GRPO #{} not found", id))?;
                println!("{}", doc);
                if let Some(false) = repo.synced_flag(*id).await? {
                    println!("  pending upload");
                }
                if let Some(notes) = &doc.notes {
                    println!("  notes: {}", notes);
                }
                for item in repo.items(*id).await? {
                    println!(
                        "  {:>3}. {} x{} {}",
                        item.line_number,
                        item.item_code,
                        item.received_quantity,
                        item.bin_location.as_deref().unwrap_or("")
                    );
                }
            }
            GrpoSubcommand::Submit { id } => {
                repo.submit(*id).await?;
                println!("GRPO #{} submitted for QC (queued for sync)", id);
            }
            GrpoSubcommand::Approve { id, notes } => {
                repo.approve(*id, notes.clone()).await?;
                println!("GRPO #{} approved (queued for sync)", id);
            }
            GrpoSubcommand::Reject { id, notes } => {
                repo.reject(*id, notes.clone()).await?;
                println!("GRPO #{} rejected (queued for sync)", id);
            }
        }
        Ok(())
    }
}
