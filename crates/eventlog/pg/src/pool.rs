//! PostgreSQL connection pool.
//!
//! All engine components share one bounded [`ConnectionPool`]. Acquiring a
//! connection blocks up to `acquire_timeout`, after which it fails. Broken
//! connections are tested before being handed out again, so a retried
//! operation after a connection loss runs on a fresh connection.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Database URL.
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection acquisition timeout
    pub acquire_timeout: Duration,
    /// Idle connection lifetime
    pub idle_timeout: Duration,
    /// Maximum connection lifetime
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/eventlog".to_string(),
            max_connections: 20,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600), // 10 minutes
            max_lifetime: Duration::from_secs(1800), // 30 minutes
        }
    }
}

impl PoolConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_min_connections(mut self, min_connections: u32) -> Self {
        self.min_connections = min_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Create config from environment variables
    ///
    /// - `EVENTLOG_DATABASE_URL` or `DATABASE_URL`
    /// - `EVENTLOG_DB_MAX_CONNECTIONS`
    /// - `EVENTLOG_DB_MIN_CONNECTIONS`
    /// - `EVENTLOG_DB_ACQUIRE_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, PoolError> {
        let url = std::env::var("EVENTLOG_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| PoolError::MissingUrl)?;

        let defaults = Self::default();
        let max_connections = std::env::var("EVENTLOG_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_connections);

        let min_connections = std::env::var("EVENTLOG_DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.min_connections);

        let acquire_timeout = std::env::var("EVENTLOG_DB_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.acquire_timeout);

        Ok(Self {
            url,
            max_connections,
            min_connections,
            acquire_timeout,
            ..defaults
        })
    }
}

/// Shared PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    pool: PgPool,
}

impl ConnectionPool {
    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or the URL is invalid.
    pub async fn connect(config: &PoolConfig) -> Result<Self, PoolError> {
        info!(
            "Creating PostgreSQL pool (min={}, max={}, timeout={:?})",
            config.min_connections, config.max_connections, config.acquire_timeout
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .test_before_acquire(true)
            .connect(&config.url)
            .await
            .map_err(|e| PoolError::ConnectionFailed(e.to_string()))?;

        info!("PostgreSQL pool created successfully");

        Ok(Self { pool })
    }

    /// Wrap an existing `PgPool`.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the inner `PgPool` for use with sqlx
    #[inline]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Errors that can occur when creating the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Missing database URL in environment")]
    MissingUrl,
}
