//! Database configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// PostgreSQL pool settings for the short-lived CLI process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Upper bound on pooled connections. One command rarely needs more
    /// than a transaction plus a streaming read.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for a free connection before failing.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

impl DatabaseConfig {
    /// Wait limit for a pooled connection.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

fn default_max_connections() -> u32 {
    4
}

fn default_acquire_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_url_is_required() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"url": "postgres://localhost/orgtree"}"#).unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.acquire_timeout(), Duration::from_secs(10));

        assert!(serde_json::from_str::<DatabaseConfig>("{}").is_err());
    }
}
