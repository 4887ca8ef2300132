//! Migration history tracking.
//!
//! This module manages the `schemata_migrations` table that records which
//! migration files have been applied, together with the checksum each one
//! had at the time.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool};

use crate::error::Result;

/// Name of the history table. Introspection skips it.
pub const HISTORY_TABLE: &str = "schemata_migrations";

/// SQL to create the migrations history table.
pub const CREATE_MIGRATIONS_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schemata_migrations (
    name TEXT PRIMARY KEY,
    checksum TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
";

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Migration name (file stem).
    pub name: String,
    /// Checksum of the body when it was applied.
    pub checksum: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

/// Manages the migration history in the database.
#[derive(Debug, Clone)]
pub struct MigrationHistory {
    pool: PgPool,
}

impl MigrationHistory {
    /// Creates a new migration history manager.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Ensures the migrations table exists.
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(CREATE_MIGRATIONS_TABLE_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether the migrations table exists yet.
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn exists(&self) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as("SELECT to_regclass($1) IS NOT NULL")
            .bind(HISTORY_TABLE)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Records a migration as applied on `conn`, typically the transaction
    /// that ran it.
    ///
    /// # Errors
    ///
    /// Fails on database errors, including a duplicate name.
    pub async fn record_applied(conn: &mut PgConnection, name: &str, checksum: &str) -> Result<()> {
        sqlx::query("INSERT INTO schemata_migrations (name, checksum) VALUES ($1, $2)")
            .bind(name)
            .bind(checksum)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Looks up one applied migration.
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn get(&self, name: &str) -> Result<Option<AppliedMigration>> {
        let row: Option<(String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT name, checksum, applied_at FROM schemata_migrations WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(name, checksum, applied_at)| AppliedMigration {
            name,
            checksum,
            applied_at,
        }))
    }

    /// Gets all applied migrations, oldest first.
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn get_applied(&self) -> Result<Vec<AppliedMigration>> {
        let rows: Vec<(String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT name, checksum, applied_at FROM schemata_migrations ORDER BY applied_at, name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, checksum, applied_at)| AppliedMigration {
                name,
                checksum,
                applied_at,
            })
            .collect())
    }

    /// Counts applied migrations.
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn count_applied(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schemata_migrations")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
