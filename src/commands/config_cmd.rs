use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;

use crate::config::Config;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        println!("Config file: {}", Config::default_config_path().display());
                        println!();

                        println!("database_path: {}", config.database_path.display());
                        println!("user_id: {}", config.user_id);
                        println!();

                        match &config.server.url {
                            Some(url) => println!("server.url: {}", url),
                            None => println!("server.url: (not set)"),
                        }
                        println!(
                            "server.api_key: {}",
                            if config.server.api_key.is_some() {
                                "(set)"
                            } else {
                                "(not set)"
                            }
                        );
                        println!("server.timeout_secs: {}", config.server.timeout_secs);
                        println!(
                            "server.watch_interval_secs: {}",
                            config.server.watch_interval_secs
                        );
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'stocksync config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let default_config = r#"# stocksync configuration

# Path to SQLite database (default: ~/.local/share/stocksync/stocksync.db)
# database_path: ~/.local/share/stocksync/stocksync.db

# Local user id stamped on documents created on this device
user_id: 1

# Remote server (leave unset to work offline only)
# server:
#   url: "http://localhost:5000"
#   api_key: "your-api-key"
#   timeout_secs: 30
#   watch_interval_secs: 30
"#;

                let mut file = fs::File::create(&config_path)?;
                file.write_all(default_config.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
