use clap::{Args, Subcommand};
use std::time::Duration;

use crate::api::{HttpApi, LookupResult};
use crate::config::{Config, ConfigError};

/// Validate scanned codes against the server
#[derive(Args)]
pub struct ScanCommand {
    #[command(subcommand)]
    command: ScanSubcommand,
}

#[derive(Subcommand)]
enum ScanSubcommand {
    /// Validate an item barcode
    Barcode { code: String },

    /// Look up a purchase order by number
    Po { number: String },

    /// Look up a transfer request by number
    Request { number: String },
}

impl ScanCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
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

        let (label, result) = match &self.command {
            ScanSubcommand::Barcode { code } => ("Barcode", api.validate_barcode(code).await?),
            ScanSubcommand::Po { number } => {
                ("Purchase order", api.get_purchase_order(number).await?)
            }
            ScanSubcommand::Request { number } => {
                ("Transfer request", api.get_transfer_request(number).await?)
            }
        };

        print_lookup(label, &result)?;
        Ok(())
    }
}

fn print_lookup(label: &str, result: &LookupResult) -> Result<(), Box<dyn std::error::Error>> {
    if result.success {
        println!("{} found.", label);
        if let Some(payload) = &result.payload {
            println!("{}", serde_json::to_string_pretty(payload)?);
        }
    } else {
        println!(
            "{} not recognized: {}",
            label,
            result.error.as_deref().unwrap_or("no match")
        );
    }
    Ok(())
}
