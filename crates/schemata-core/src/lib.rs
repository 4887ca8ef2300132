//! # schemata-core
//!
//! A declarative schema compiler.
//!
//! An application describes the schema it wants (extensions, enum types,
//! functions, tables with their constraints, indexes and triggers) as plain
//! data. This crate:
//!
//! - registers the description into a dependency graph ([`register`]),
//! - orders creation and deletion so no statement references a missing
//!   object ([`resolver::order`]),
//! - diffs the declared graph against the live one ([`diff`]),
//! - renders the resulting change set as DDL ([`emit`]).
//!
//! Nothing here talks to a database. Live state comes in as catalog rows
//! ([`introspect::CatalogSnapshot`]) read by a driver.
//!
//! ```rust
//! use schemata_core::model::{EnumType, Extension, TableBuilder, enumeration, uuid};
//! use schemata_core::{compile, register, DiffOptions, PostgresDialect, SchemaGraph};
//!
//! let declared = register([
//!     Extension::new("pg_trgm").into(),
//!     EnumType::new("status", ["ACTIVE", "ARCHIVED"]).into(),
//!     TableBuilder::new("asset")
//!         .column(uuid("id").primary_key())
//!         .column(enumeration("status", "status").not_null().default_str("ACTIVE"))
//!         .build()
//!         .into(),
//! ])
//! .unwrap();
//!
//! let (changes, script) = compile(
//!     &declared,
//!     &SchemaGraph::new(),
//!     &DiffOptions::default(),
//!     &PostgresDialect::new(),
//! )
//! .unwrap();
//! assert_eq!(changes.len(), 3);
//! assert!(script.to_sql().starts_with("CREATE EXTENSION IF NOT EXISTS \"pg_trgm\";"));
//! ```

pub mod declaration;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod graph;
pub mod introspect;
pub mod model;
pub mod naming;
pub mod normalize;
pub mod registry;
pub mod resolver;
pub mod script;

pub use declaration::DatabaseDeclaration;
pub use dialect::{emit, MigrationDialect, PostgresDialect, SqliteDialect};
pub use diff::{diff, diff_with, ChangeSet, DiffOptions, Operation};
pub use error::{CompileError, Result};
pub use graph::SchemaGraph;
pub use registry::{register, register_declaration};
pub use resolver::Direction;
pub use script::MigrationScript;

/// Diffs `declared` against `live` and renders the change set.
///
/// # Errors
///
/// Returns the first [`CompileError`] raised by the differ or the dialect.
pub fn compile<D>(
    declared: &SchemaGraph,
    live: &SchemaGraph,
    options: &DiffOptions,
    dialect: &D,
) -> Result<(ChangeSet, MigrationScript)>
where
    D: MigrationDialect + ?Sized,
{
    let changes = diff_with(declared, live, options)?;
    let script = MigrationScript::render(&changes, dialect)?;
    Ok((changes, script))
}
