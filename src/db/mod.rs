//! Database connection management

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;

/// PostgreSQL connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect with default pool limits
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::connect_with(&DatabaseConfig {
            url: database_url.to_string(),
            max_connections: 50,
            acquire_timeout_secs: 5,
        })
        .await
    }

    pub async fn connect_with(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "PostgreSQL connection pool established"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
