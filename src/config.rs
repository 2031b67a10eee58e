//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;

/// Which Expense Store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDriver {
    /// In-process map-backed store (volatile; dev/test).
    Memory,
    /// Postgres-backed store.
    Postgres,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; required only for the postgres driver
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, staging, production)
    pub environment: String,

    /// Selected expense store backend
    pub store_driver: StoreDriver,

    /// Whether the budget-exceedance automation pass runs after create
    pub automation_enabled: bool,

    /// TTL in seconds for the category-aggregation cache (0 disables it)
    pub aggregate_cache_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let database_url = env::var("DATABASE_URL").ok();

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        // Persistent storage in production-like environments, in-process
        // otherwise, unless the flag says so explicitly.
        let store_driver = match env::var("EXPENSE_STORE_DRIVER") {
            Ok(value) => match value.as_str() {
                "memory" => StoreDriver::Memory,
                "postgres" => StoreDriver::Postgres,
                _ => return Err(ConfigError::InvalidValue("EXPENSE_STORE_DRIVER")),
            },
            Err(_) => {
                if matches!(environment.as_str(), "production" | "staging") {
                    StoreDriver::Postgres
                } else {
                    StoreDriver::Memory
                }
            }
        };

        let automation_enabled = env::var("AUTOMATION_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let aggregate_cache_ttl_secs = env::var("AGGREGATE_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("AGGREGATE_CACHE_TTL_SECS"))?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            store_driver,
            automation_enabled,
            aggregate_cache_ttl_secs,
        })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
