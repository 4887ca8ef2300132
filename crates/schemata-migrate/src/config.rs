//! Runtime settings, resolved from command-line flags and the environment.

use std::path::PathBuf;

use clap::Args;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::debug;

use crate::error::{MigrateError, Result};

/// Postgres schema used when neither a flag nor a declaration names one.
pub const DEFAULT_PG_SCHEMA: &str = "public";

/// Settings shared by every command.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// JSON file holding the declared schema.
    #[arg(long, env = "SCHEMATA_SCHEMA_FILE", default_value = "schema.json", global = true)]
    pub schema_file: PathBuf,

    /// Directory holding generated migration files.
    #[arg(long, env = "SCHEMATA_MIGRATIONS_DIR", default_value = "migrations", global = true)]
    pub migrations_dir: PathBuf,

    /// Postgres schema to manage. Defaults to the declaration's schema.
    #[arg(long, env = "SCHEMATA_PG_SCHEMA", global = true)]
    pub pg_schema: Option<String>,

    /// Maximum pool connections.
    #[arg(long, default_value_t = 5, global = true)]
    pub max_connections: u32,
}

impl Settings {
    /// Returns the configured database URL.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MissingDatabaseUrl`] if none was given.
    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(MigrateError::MissingDatabaseUrl)
    }

    /// Postgres schema to introspect and migrate: the flag, then the
    /// declaration's schema, then `public`.
    #[must_use]
    pub fn target_schema<'a>(&'a self, declared: Option<&'a str>) -> &'a str {
        [self.pg_schema.as_deref(), declared]
            .into_iter()
            .flatten()
            .find(|schema| !schema.is_empty())
            .unwrap_or(DEFAULT_PG_SCHEMA)
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Fails without a database URL or if the connection fails.
    pub async fn connect(&self) -> Result<PgPool> {
        let url = self.database_url()?;
        debug!(max_connections = self.max_connections, "connecting to database");
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(url)
            .await?;
        Ok(pool)
    }
}
