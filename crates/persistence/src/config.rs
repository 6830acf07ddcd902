//! Database configuration and pool construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::{PersistenceError, PersistenceResult};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection settings for a PostgreSQL pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_acquire_timeout_secs() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_SECS
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }

    /// Read the connection url from `DATABASE_URL`.
    pub fn from_env() -> PersistenceResult<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| PersistenceError::Configuration("DATABASE_URL is not set".to_string()))?;
        Ok(Self::new(url))
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
    }

    /// Connect eagerly, verifying the database is reachable.
    pub async fn pool(&self) -> PersistenceResult<PgPool> {
        self.options()
            .connect(&self.url)
            .await
            .map_err(|e| PersistenceError::database("connect", e))
    }

    /// Build a pool without connecting; connections are established on first
    /// use.
    pub fn lazy_pool(&self) -> PersistenceResult<PgPool> {
        self.options()
            .connect_lazy(&self.url)
            .map_err(|e| PersistenceError::database("connect", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_omitted_from_json() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"url": "postgres://localhost/app"}"#).unwrap();

        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.acquire_timeout_secs, DEFAULT_ACQUIRE_TIMEOUT_SECS);
    }

    #[tokio::test]
    async fn lazy_pool_builds_without_a_server() {
        let config = DatabaseConfig::new("postgres://localhost:5432/groundwork_test");
        let pool = config.lazy_pool().unwrap();
        assert!(!pool.is_closed());
    }
}
