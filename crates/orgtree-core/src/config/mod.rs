//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod database;
pub mod hierarchy;
pub mod logging;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use self::database::DatabaseConfig;
pub use self::hierarchy::{HierarchyConfig, NameUniqueness};
pub use self::logging::LoggingConfig;

use crate::error::AppError;

/// Environment variable selecting the overlay file (`config/{env}.toml`).
pub const ENV_VAR: &str = "ORGTREE_ENV";

/// Prefix for environment variable overrides, e.g.
/// `ORGTREE__DATABASE__URL` or `ORGTREE__HIERARCHY__MAX_DEPTH`.
pub const ENV_PREFIX: &str = "ORGTREE";

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Tree-shape limits and naming policy.
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// Merges `path` with an optional `config/{ORGTREE_ENV}` overlay and
    /// environment variables prefixed with `ORGTREE__`.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let mut builder =
            config::Config::builder().add_source(config::File::with_name(path).required(false));

        if let Ok(env) = std::env::var(ENV_VAR) {
            debug!(env = %env, "Applying configuration overlay");
            builder = builder
                .add_source(config::File::with_name(&format!("config/{env}")).required(false));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let app: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        app.hierarchy.validate()?;
        Ok(app)
    }
}
