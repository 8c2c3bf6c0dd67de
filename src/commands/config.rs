//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use crate::output::{self, OutputFormat};
use orgtree_core::error::AppError;
use orgtree_database::connection::mask_password;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (file, overlay, and environment)
    Show,
    /// Validate the configuration file
    Validate,
}

/// Execute config commands
pub fn execute(args: &ConfigArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let mut config = super::load_config(config_path)?;
            config.database.url = mask_password(&config.database.url);

            match format {
                OutputFormat::Json => output::print_json(&config),
                OutputFormat::Table => {
                    let db = &config.database;
                    let tree = &config.hierarchy;
                    println!("[database]");
                    output::print_kv("url", &db.url);
                    output::print_kv("max_connections", &db.max_connections.to_string());
                    output::print_kv(
                        "acquire_timeout_seconds",
                        &db.acquire_timeout_seconds.to_string(),
                    );
                    println!("[logging]");
                    output::print_kv("level", &config.logging.level);
                    output::print_kv("format", &config.logging.format);
                    println!("[hierarchy]");
                    output::print_kv("path_separator", &format!("{:?}", tree.path_separator));
                    output::print_kv("max_depth", &tree.max_depth.to_string());
                    output::print_kv("max_name_length", &tree.max_name_length.to_string());
                    output::print_kv("cascade_batch_size", &tree.cascade_batch_size.to_string());
                    output::print_kv("name_uniqueness", &tree.name_uniqueness.to_string());
                }
            }
        }
        ConfigCommand::Validate => match super::load_config(config_path) {
            Ok(config) => {
                output::print_success(&format!("Configuration '{config_path}' is valid"));
                output::print_kv("Database", &mask_password(&config.database.url));
                output::print_kv("Max depth", &config.hierarchy.max_depth.to_string());
                output::print_kv(
                    "Name uniqueness",
                    &config.hierarchy.name_uniqueness.to_string(),
                );
            }
            Err(e) => {
                output::print_error(&format!("Configuration invalid: {e}"));
                return Err(e);
            }
        },
    }

    Ok(())
}
