use clap::{Args, Subcommand};

use super::parse_item_spec;
use crate::config::Config;
use crate::db::{DocumentStore, PickListRepository};
use crate::models::{PickList, PickListItem};

/// Manage pick lists
#[derive(Args)]
pub struct PickListCommand {
    #[command(subcommand)]
    command: PickListSubcommand,
}

#[derive(Subcommand)]
enum PickListSubcommand {
    /// Create a new pick list
    Create {
        /// Sales order number
        #[arg(long)]
        sales_order: Option<String>,

        /// Customer code
        #[arg(long)]
        customer: Option<String>,

        /// Customer display name
        #[arg(long)]
        customer_name: Option<String>,

        /// Warehouse code
        #[arg(long)]
        warehouse: Option<String>,

        /// Line item to pick, CODE:QTY or CODE:QTY:BIN (can be repeated)
        #[arg(long = "item", value_name = "SPEC")]
        items: Vec<String>,
    },

    /// List this user's pick lists, newest first
    List,

    /// Show one pick list with its line items
    Show { id: i64 },

    /// Record a picked quantity against one line
    Pick {
        /// Pick list id
        id: i64,

        /// Line number within the pick list
        #[arg(long)]
        line: i64,

        /// Picked quantity
        #[arg(long)]
        qty: f64,
    },
}

impl PickListCommand {
    pub async fn run(
        &self,
        repo: &PickListRepository,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            PickListSubcommand::Create {
                sales_order,
                customer,
                customer_name,
                warehouse,
                items,
            } => {
                let mut doc = PickList::new(config.user_id);
                if let Some(number) = sales_order {
                    doc = doc.with_sales_order(number);
                }
                if let Some(code) = customer {
                    doc = doc.with_customer(code, customer_name.clone());
                }
                if let Some(code) = warehouse {
                    doc = doc.with_warehouse(code);
                }

                let mut lines = Vec::with_capacity(items.len());
                for (index, spec) in items.iter().enumerate() {
                    let (code, qty, bin) = parse_item_spec(spec)?;
                    let mut line = PickListItem::new(index as i64 + 1, code, qty);
                    line.bin_location = bin;
                    lines.push(line);
                }

                let id = repo.create(&doc, &lines).await?;
                println!("Created pick list #{} (queued for sync)", id);
            }
            PickListSubcommand::List => {
                let docs = repo.list_for_user(config.user_id).await?;
                if docs.is_empty() {
                    println!("No pick lists.");
                    return Ok(());
                }
                for doc in docs {
                    println!("{}", doc);
                }
            }
            PickListSubcommand::Show { id } => {
                let doc = repo
                    .get(*id)
                    .await?
                    .ok_or_else(|| format!("Pick list #{} not found", id))?;
                println!("{}", doc);
                if let Some(false) = repo.synced_flag(*id).await? {
                    println!("  pending upload");
                }
                for item in repo.items(*id).await? {
                    println!(
                        "  {:>3}. {} picked {}/{} {}",
                        item.line_number,
                        item.item_code,
                        item.picked_quantity,
                        item.ordered_quantity,
                        item.bin_location.as_deref().unwrap_or("")
                    );
                }
            }
            PickListSubcommand::Pick { id, line, qty } => {
                let items = repo.items(*id).await?;
                let item = items
                    .iter()
                    .find(|item| item.line_number == *line)
                    .ok_or_else(|| format!("Pick list #{} has no line {}", id, line))?;
                repo.set_picked_quantity(item.id, *qty).await?;

                // Queue the document update so the picked quantity reaches
                // the server on the next pass.
                let doc = repo
                    .get(*id)
                    .await?
                    .ok_or_else(|| format!("Pick list #{} not found", id))?;
                repo.update(*id, &doc).await?;
                println!(
                    "Picked {} x{} on pick list #{} (queued for sync)",
                    item.item_code, qty, id
                );
            }
        }
        Ok(())
    }
}
