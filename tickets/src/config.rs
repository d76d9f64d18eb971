//! Configuration management for the helpdesk application.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Document store configuration.
    pub database: DatabaseConfig,
    /// Logging and metrics configuration.
    pub observability: ObservabilityConfig,
}

/// Document store configuration.
///
/// When `url` is unset the application runs against the in-memory store,
/// which is what the demo binary and tests use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL; `None` selects the in-memory store.
    pub url: Option<String>,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Connection timeout in seconds.
    pub connect_timeout: u64,
}

/// Logging and metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter (trace, debug, info, warn, error).
    pub log_level: String,
    /// Port for the Prometheus scrape endpoint; `None` disables it.
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok(),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                connect_timeout: env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            observability: ObservabilityConfig {
                log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
                metrics_port: env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_environment() {
        // Not hermetic against a polluted environment, but the defaults are
        // what matter here.
        let config = Config::from_env();
        assert!(config.database.max_connections >= 1);
        assert!(!config.observability.log_level.is_empty());
    }
}
