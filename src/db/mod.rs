//! Postgres connection pool and table bootstrap.
//!
//! The source and target tables live wherever [`StoreLocation`] points;
//! their names are validated identifiers, so they are formatted into SQL
//! (quoted) while every value goes through a bind parameter.

pub mod admin;
pub mod work;

use crate::config::StoreLocation;
use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Database handle. Owns the connection pool and the table location.
pub struct Db {
    pool: PgPool,
    location: StoreLocation,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str, location: StoreLocation) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await?;
        Ok(Self { pool, location })
    }

    /// Create the schema and both tables if they do not exist.
    pub async fn ensure_tables(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "CREATE SCHEMA IF NOT EXISTS \"{}\"",
            self.location.schema
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING'
             )",
            self.location.source()
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                context TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
             )",
            self.location.target()
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
