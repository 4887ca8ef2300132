//! Postgres driver for the schemata schema compiler.
//!
//! `schemata-migrate` connects [`schemata_core`] to a live database:
//!
//! - **Introspector** - Reads the Postgres catalog into a live schema graph
//! - **Files** - Writes and reads checksummed migration files
//! - **Executor** - Applies migration files in transactions, tracking history
//! - **Loader** - Reads declared schemas from JSON
//!
//! # CLI Usage
//!
//! ```bash
//! # Diff schema.json against the database and write a migration file
//! schemata generate add_albums
//!
//! # Apply pending migration files
//! schemata apply
//!
//! # Check the declaration and the migration files without a database
//! schemata validate
//!
//! # Show which migration files have been applied
//! schemata status
//!
//! # Dump the live schema as a JSON declaration
//! schemata introspect --output schema.json
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod file;
pub mod history;
pub mod introspector;
pub mod loader;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{ApplyOutcome, MigrationExecutor, MigrationStatus};
    pub use crate::file::{discover, MigrationFile};
    pub use crate::history::{AppliedMigration, MigrationHistory};
    pub use crate::introspector::PgIntrospector;
    pub use crate::loader::{declaration_json, load_declaration};
}
