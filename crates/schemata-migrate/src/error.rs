//! Error types for the migration driver.

use std::path::PathBuf;

use schemata_core::CompileError;

/// Errors raised while introspecting, generating or applying migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The schema compiler rejected the declaration or the diff.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Database error during introspection or execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading/writing migration or schema files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to parse a migration file.
    #[error("Failed to parse migration file '{path}': {message}")]
    ParseError {
        /// Path to the migration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// No migrations directory found.
    #[error("Migrations directory not found: {0}")]
    MigrationsDirNotFound(PathBuf),

    /// A migration body no longer matches its recorded checksum.
    #[error("Migration '{name}' has checksum {actual} but {expected} was recorded")]
    ChecksumMismatch {
        /// Migration name.
        name: String,
        /// Checksum from the header or the history table.
        expected: String,
        /// Checksum of the current body.
        actual: String,
    },

    /// The generated migration drops or renames something and the caller
    /// did not allow it.
    #[error("Destructive changes require --allow-destructive:\n{}", .0.iter().map(|op| format!("  - {op}")).collect::<Vec<_>>().join("\n"))]
    DestructiveChanges(Vec<String>),

    /// No database URL was configured.
    #[error("No database URL configured (set DATABASE_URL or pass --database-url)")]
    MissingDatabaseUrl,
}

impl MigrateError {
    /// Stable name of the error kind, printed by the CLI.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Compile(err) => err.kind(),
            Self::Database(_) => "DatabaseError",
            Self::Io(_) => "IoError",
            Self::Serialization(_) => "SerializationError",
            Self::ParseError { .. } => "ParseError",
            Self::MigrationExists(_) => "MigrationExistsError",
            Self::MigrationsDirNotFound(_) => "MigrationsDirNotFoundError",
            Self::ChecksumMismatch { .. } => "ChecksumMismatchError",
            Self::DestructiveChanges(_) => "DestructiveChangesError",
            Self::MissingDatabaseUrl => "ConfigurationError",
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
