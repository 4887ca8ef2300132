//! Generating migration files without a database: the live schema is the
//! previous declaration with its change sets applied.

mod common;

use std::fs;

use common::{day, shop};
use schemata_core::model::text;
use schemata_core::{
    compile, diff, register_declaration, DiffOptions, PostgresDialect, SchemaGraph,
};
use schemata_migrate::prelude::*;

#[test]
fn test_declaration_file_to_migration_file() {
    let dir = tempfile::tempdir().unwrap();
    let schema_file = dir.path().join("schema.json");
    let migrations = dir.path().join("migrations");
    fs::write(&schema_file, declaration_json(&shop()).unwrap()).unwrap();

    let declared = register_declaration(&load_declaration(&schema_file).unwrap()).unwrap();
    let (changes, script) = compile(
        &declared,
        &SchemaGraph::new(),
        &DiffOptions::default(),
        &PostgresDialect::new(),
    )
    .unwrap();
    assert!(!changes.has_destructive());

    let file = MigrationFile::new("initial", &script, day(18));
    file.write(&migrations).unwrap();

    let files = discover(&migrations).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "20261018093000_initial");
    files[0].verify().unwrap();

    let body = &files[0].body;
    let create_type = body.find("CREATE TYPE").unwrap();
    let create_product = body.find("CREATE TABLE \"product\"").unwrap();
    let create_trigger = body.find("CREATE TRIGGER").unwrap();
    assert!(create_type < create_product);
    assert!(create_product < create_trigger);
    assert!(body.contains("FOREIGN KEY (\"productId\")"));
}

#[test]
fn test_second_migration_only_holds_the_delta() {
    let dir = tempfile::tempdir().unwrap();
    let dialect = PostgresDialect::new();
    let options = DiffOptions::default();

    let first = register_declaration(&shop()).unwrap();
    let (initial, script) = compile(&first, &SchemaGraph::new(), &options, &dialect).unwrap();
    MigrationFile::new("initial", &script, day(18))
        .write(dir.path())
        .unwrap();
    let live = initial.apply_to(&SchemaGraph::new()).unwrap();

    let mut next = shop();
    next.tables[0].columns.push(text("sku").build());
    let declared = register_declaration(&next).unwrap();
    let (changes, script) = compile(&declared, &live, &options, &dialect).unwrap();

    assert_eq!(changes.len(), 1);
    assert_eq!(
        script.statements,
        ["ALTER TABLE \"product\" ADD COLUMN \"sku\" TEXT"]
    );
    MigrationFile::new("add sku", &script, day(19))
        .write(dir.path())
        .unwrap();

    let names: Vec<String> = discover(dir.path())
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, ["20261018093000_initial", "20261019093000_add_sku"]);

    // Applying the delta reaches the declared schema.
    let live = changes.apply_to(&live).unwrap();
    assert!(diff(&declared, &live).unwrap().is_empty());
}

#[test]
fn test_dropping_a_table_is_reported_as_destructive() {
    let live = register_declaration(&shop()).unwrap();
    let mut declaration = shop();
    declaration.tables.retain(|t| t.name != "stock");
    let declared = register_declaration(&declaration).unwrap();

    let changes = diff(&declared, &live).unwrap();
    assert!(changes.has_destructive());

    let err = MigrateError::DestructiveChanges(
        changes
            .destructive_operations()
            .iter()
            .map(ToString::to_string)
            .collect(),
    );
    assert_eq!(err.kind(), "DestructiveChangesError");
    assert!(err.to_string().contains("  - Drop table stock"));
}

#[test]
fn test_edited_file_on_disk_fails_verification() {
    let dir = tempfile::tempdir().unwrap();
    let declared = register_declaration(&shop()).unwrap();
    let (_, script) = compile(
        &declared,
        &SchemaGraph::new(),
        &DiffOptions::default(),
        &PostgresDialect::new(),
    )
    .unwrap();
    let path = MigrationFile::new("initial", &script, day(18))
        .write(dir.path())
        .unwrap();

    let edited = fs::read_to_string(&path)
        .unwrap()
        .replace("\"stock\"", "\"stocks\"");
    fs::write(&path, edited).unwrap();

    let files = discover(dir.path()).unwrap();
    assert!(matches!(
        files[0].verify(),
        Err(MigrateError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_unknown_enum_fails_before_any_file_is_written() {
    let mut declaration = shop();
    declaration.enums.clear();
    let err = register_declaration(&declaration).unwrap_err();
    let err = MigrateError::from(err);
    assert_eq!(err.kind(), "UnknownReferenceError");
}
