//! CLI command definitions and dispatch.

pub mod config;
pub mod entity;
pub mod migrate;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use orgtree_core::config::AppConfig;
use orgtree_core::error::AppError;
use orgtree_database::DatabasePool;

/// OrgTree: multi-tenant organizational hierarchy manager
#[derive(Debug, Parser)]
#[command(name = "orgtree", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Configuration management
    Config(config::ConfigArgs),
    /// Entity hierarchy management
    Entity(entity::EntityArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &self.config, self.format).await,
            Commands::Config(args) => config::execute(args, &self.config, self.format),
            Commands::Entity(args) => entity::execute(args, &self.config, self.format).await,
        }
    }
}

/// Helper: load configuration from file
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load(config_path)
}

/// Helper: connect to the configured database
pub async fn connect(config: &AppConfig) -> Result<DatabasePool, AppError> {
    DatabasePool::connect(&config.database).await
}
