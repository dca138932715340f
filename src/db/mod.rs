//! # Database: PostgreSQL Storage Layer
//!
//! Async database operations for water-quality measurements, trained-model
//! rows and the user lookup the training lifecycle needs, via `sqlx::PgPool`.
//!
//! ## Schema
//!
//! - `users`: id, name, role
//! - `models`: id, uid, name, target, method, created_at, rmse (NULL while training)
//! - `measurements`: id, station, taken_at, ph, dissolved_oxygen, ammonia_nitrogen
//!
//! Created idempotently by [`Database::migrate`] from `migrations/001_create_tables.sql`.
//!
//! ## Module Structure
//!
//! Operations are split into submodules by table, each implementing one of
//! the [`crate::store`] traits:
//!
//! - [`measurements`]: range queries, monthly averages, distinct days, CRUD
//! - [`models`]: pending-row creation, RMSE commit, rollback delete, catalogue
//! - [`users`]: owner lookup for training requests

mod measurements;
mod models;
mod users;

use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

const SCHEMA_SQL: &str = include_str!("../../migrations/001_create_tables.sql");

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// The URL is parsed by hand so percent-encoded credentials survive intact.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SCHEMA_SQL;

    #[test]
    fn schema_creates_every_table_idempotently() {
        for table in ["users", "models", "measurements"] {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "schema is missing table {}",
                table
            );
        }
        assert!(!SCHEMA_SQL.contains("DROP TABLE"));
    }
}
