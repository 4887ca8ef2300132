#![allow(dead_code)]

use schemata_core::introspect::{
    CatalogSnapshot, ColumnRow, ConstraintRow, EnumRow, ExtensionRow, FunctionRow, IndexRow,
    TableRow, TriggerRow,
};
use schemata_core::model::{
    boolean, enumeration, text, timestamptz, uuid, varchar, ConstraintKind, EnumType,
    ForeignKeyAction, FunctionBuilder, IndexBuilder, IndexMethod, ParallelSafety, SchemaObject,
    TableBuilder, TriggerBuilder, TriggerEvent, TriggerTiming,
};
use schemata_core::{register_declaration, ChangeSet, DatabaseDeclaration, SchemaGraph};

/// A photo library schema: users own albums and assets, assets are linked
/// to albums through a join table.
pub fn library() -> DatabaseDeclaration {
    DatabaseDeclaration::new("library")
        .extension("pg_trgm")
        .enum_type(EnumType::new("asset_status", ["ACTIVE", "TRASHED", "DELETED"]))
        .function(
            FunctionBuilder::new("updated_at")
                .returns("trigger")
                .body("BEGIN\n  new.\"updatedAt\" = now();\n  RETURN new;\nEND;")
                .build(),
        )
        .function(
            FunctionBuilder::new("library_uuid_v7")
                .arguments("p_timestamp timestamp with time zone DEFAULT clock_timestamp()")
                .returns("uuid")
                .body("BEGIN RETURN gen_random_uuid(); END;")
                .parallel(ParallelSafety::Safe)
                .build(),
        )
        .table(
            TableBuilder::new("user")
                .column(uuid("id").primary_key().default_expr("library_uuid_v7()"))
                .column(varchar("email", 255).not_null().unique())
                .column(boolean("isAdmin").not_null().default_bool(false))
                .column(timestamptz("createdAt").not_null().default_expr("now()"))
                .build(),
        )
        .table(
            TableBuilder::new("album")
                .column(uuid("id").primary_key().default_expr("library_uuid_v7()"))
                .column(
                    uuid("ownerId").not_null().references_full(
                        "user",
                        "id",
                        ForeignKeyAction::Cascade,
                        ForeignKeyAction::NoAction,
                    ),
                )
                .column(
                    varchar("albumName", 255)
                        .not_null()
                        .default_str("Untitled Album"),
                )
                .column(text("description").comment("Shown under the album title"))
                .index(IndexBuilder::unnamed().columns(["ownerId"]))
                .build(),
        )
        .table(
            TableBuilder::new("asset")
                .column(uuid("id").primary_key().default_expr("library_uuid_v7()"))
                .column(
                    uuid("ownerId").not_null().references_full(
                        "user",
                        "id",
                        ForeignKeyAction::Cascade,
                        ForeignKeyAction::NoAction,
                    ),
                )
                .column(
                    enumeration("status", "asset_status")
                        .not_null()
                        .default_str("ACTIVE"),
                )
                .column(varchar("originalFileName", 255).not_null())
                .column(timestamptz("updatedAt").not_null().default_expr("now()"))
                .index(
                    IndexBuilder::new("idx_asset_file_name_trigram")
                        .expression("\"originalFileName\" gin_trgm_ops")
                        .using(IndexMethod::Gin),
                )
                .trigger(
                    TriggerBuilder::new("asset_updated_at", "updated_at")
                        .timing(TriggerTiming::Before)
                        .on(TriggerEvent::Update)
                        .for_each_row(),
                )
                .comment("Uploaded media")
                .build(),
        )
        .table(
            TableBuilder::new("album_asset")
                .column(uuid("albumId").not_null().references_full(
                    "album",
                    "id",
                    ForeignKeyAction::Cascade,
                    ForeignKeyAction::Cascade,
                ))
                .column(uuid("assetId").not_null().references_full(
                    "asset",
                    "id",
                    ForeignKeyAction::Cascade,
                    ForeignKeyAction::Cascade,
                ))
                .primary_key(["albumId", "assetId"])
                .build(),
        )
}

pub fn declared() -> SchemaGraph {
    register_declaration(&library()).unwrap()
}

/// Operation summaries, in order.
pub fn summaries(changes: &ChangeSet) -> Vec<String> {
    changes.iter().map(ToString::to_string).collect()
}

/// Generated name of the `label` constraint of `table` covering `columns`.
pub fn constraint_name(graph: &SchemaGraph, table: &str, label: &str, columns: &[&str]) -> String {
    graph
        .objects()
        .find_map(|object| {
            let constraint = match object {
                SchemaObject::Table(t) if t.name == table => {
                    t.constraints.iter().find(|c| matches(&c.kind, label, columns))
                }
                SchemaObject::Constraint(c) if c.table == table => {
                    Some(&c.constraint).filter(|c| matches(&c.kind, label, columns))
                }
                _ => None,
            };
            constraint.map(|c| c.name.clone())
        })
        .unwrap_or_else(|| panic!("no {label} constraint on {table}{columns:?}"))
}

fn matches(kind: &ConstraintKind, label: &str, columns: &[&str]) -> bool {
    kind.label() == label && kind.columns() == columns
}

/// Generated name of the index on `table` covering `columns`.
pub fn index_name(graph: &SchemaGraph, table: &str, columns: &[&str]) -> String {
    graph
        .objects()
        .find_map(|object| match object {
            SchemaObject::Index(i) if i.table == table && i.columns == columns => {
                Some(i.name.clone())
            }
            _ => None,
        })
        .unwrap_or_else(|| panic!("no index on {table}{columns:?}"))
}

fn column(
    table: &str,
    name: &str,
    position: i32,
    data_type: &str,
    nullable: bool,
    default: Option<&str>,
) -> ColumnRow {
    ColumnRow {
        table: table.into(),
        name: name.into(),
        position,
        data_type: data_type.into(),
        nullable,
        default: default.map(Into::into),
        comment: None,
    }
}

fn key(table: &str, name: String, kind: &str, columns: &[&str], definition: &str) -> ConstraintRow {
    ConstraintRow {
        table: table.into(),
        name,
        kind: kind.into(),
        columns: columns.iter().map(|c| (*c).to_string()).collect(),
        definition: definition.into(),
        references_table: None,
        references_columns: Vec::new(),
        on_update: " ".into(),
        on_delete: " ".into(),
        deferrable: false,
        initially_deferred: false,
    }
}

fn foreign_key(
    table: &str,
    name: String,
    column: &str,
    references: &str,
    on_update: &str,
) -> ConstraintRow {
    ConstraintRow {
        table: table.into(),
        name,
        kind: "f".into(),
        columns: vec![column.into()],
        definition: format!(
            "FOREIGN KEY (\"{column}\") REFERENCES \"{references}\"(id) ON DELETE CASCADE"
        ),
        references_table: Some(references.into()),
        references_columns: vec!["id".into()],
        on_update: on_update.into(),
        on_delete: "c".into(),
        deferrable: false,
        initially_deferred: false,
    }
}

/// Catalog rows a Postgres database reports after running the DDL for
/// [`library`]: spellings from `format_type`, deparsed defaults with casts
/// and `pg_get_indexdef` output.
pub fn library_catalog(graph: &SchemaGraph) -> CatalogSnapshot {
    let mut description = column("album", "description", 4, "text", true, None);
    description.comment = Some("Shown under the album title".into());

    CatalogSnapshot {
        extensions: vec![
            ExtensionRow {
                name: "pg_trgm".into(),
            },
            ExtensionRow {
                name: "plpgsql".into(),
            },
        ],
        enums: vec![EnumRow {
            name: "asset_status".into(),
            labels: vec!["ACTIVE".into(), "TRASHED".into(), "DELETED".into()],
        }],
        tables: vec![
            TableRow {
                name: "album".into(),
                comment: None,
            },
            TableRow {
                name: "album_asset".into(),
                comment: None,
            },
            TableRow {
                name: "asset".into(),
                comment: Some("Uploaded media".into()),
            },
            TableRow {
                name: "user".into(),
                comment: None,
            },
        ],
        columns: vec![
            column("user", "id", 1, "uuid", false, Some("library_uuid_v7()")),
            column("user", "email", 2, "character varying(255)", false, None),
            column("user", "isAdmin", 3, "boolean", false, Some("false")),
            column(
                "user",
                "createdAt",
                4,
                "timestamp with time zone",
                false,
                Some("now()"),
            ),
            column("album", "id", 1, "uuid", false, Some("library_uuid_v7()")),
            column("album", "ownerId", 2, "uuid", false, None),
            column(
                "album",
                "albumName",
                3,
                "character varying(255)",
                false,
                Some("'Untitled Album'::character varying"),
            ),
            description,
            column("asset", "id", 1, "uuid", false, Some("library_uuid_v7()")),
            column("asset", "ownerId", 2, "uuid", false, None),
            column(
                "asset",
                "status",
                3,
                "asset_status",
                false,
                Some("'ACTIVE'::asset_status"),
            ),
            column(
                "asset",
                "originalFileName",
                4,
                "character varying(255)",
                false,
                None,
            ),
            column(
                "asset",
                "updatedAt",
                5,
                "timestamp with time zone",
                false,
                Some("now()"),
            ),
            column("album_asset", "albumId", 1, "uuid", false, None),
            column("album_asset", "assetId", 2, "uuid", false, None),
        ],
        constraints: vec![
            key(
                "user",
                constraint_name(graph, "user", "primary key", &["id"]),
                "p",
                &["id"],
                "PRIMARY KEY (id)",
            ),
            key(
                "user",
                constraint_name(graph, "user", "unique", &["email"]),
                "u",
                &["email"],
                "UNIQUE (email)",
            ),
            key(
                "album",
                constraint_name(graph, "album", "primary key", &["id"]),
                "p",
                &["id"],
                "PRIMARY KEY (id)",
            ),
            key(
                "asset",
                constraint_name(graph, "asset", "primary key", &["id"]),
                "p",
                &["id"],
                "PRIMARY KEY (id)",
            ),
            key(
                "album_asset",
                constraint_name(graph, "album_asset", "primary key", &["albumId", "assetId"]),
                "p",
                &["albumId", "assetId"],
                "PRIMARY KEY (\"albumId\", \"assetId\")",
            ),
            foreign_key(
                "album",
                constraint_name(graph, "album", "foreign key", &["ownerId"]),
                "ownerId",
                "user",
                "a",
            ),
            foreign_key(
                "asset",
                constraint_name(graph, "asset", "foreign key", &["ownerId"]),
                "ownerId",
                "user",
                "a",
            ),
            foreign_key(
                "album_asset",
                constraint_name(graph, "album_asset", "foreign key", &["albumId"]),
                "albumId",
                "album",
                "c",
            ),
            foreign_key(
                "album_asset",
                constraint_name(graph, "album_asset", "foreign key", &["assetId"]),
                "assetId",
                "asset",
                "c",
            ),
        ],
        indexes: vec![
            IndexRow {
                table: "album".into(),
                name: index_name(graph, "album", &["ownerId"]),
                method: "btree".into(),
                unique: false,
                definition: format!(
                    "CREATE INDEX \"{}\" ON public.album USING btree (\"ownerId\")",
                    index_name(graph, "album", &["ownerId"])
                ),
                predicate: None,
            },
            IndexRow {
                table: "asset".into(),
                name: "idx_asset_file_name_trigram".into(),
                method: "gin".into(),
                unique: false,
                definition: "CREATE INDEX idx_asset_file_name_trigram ON public.asset USING gin (\"originalFileName\" gin_trgm_ops)".into(),
                predicate: None,
            },
        ],
        functions: vec![
            FunctionRow {
                name: "library_uuid_v7".into(),
                arguments: "p_timestamp timestamp with time zone DEFAULT clock_timestamp()".into(),
                returns: "uuid".into(),
                language: "plpgsql".into(),
                body: "BEGIN RETURN gen_random_uuid(); END;".into(),
                volatility: "v".into(),
                parallel: "s".into(),
            },
            FunctionRow {
                name: "updated_at".into(),
                arguments: String::new(),
                returns: "trigger".into(),
                language: "plpgsql".into(),
                body: "BEGIN\n  new.\"updatedAt\" = now();\n  RETURN new;\nEND;".into(),
                volatility: "v".into(),
                parallel: "u".into(),
            },
        ],
        triggers: vec![TriggerRow {
            table: "asset".into(),
            name: "asset_updated_at".into(),
            function: "updated_at".into(),
            // ROW | BEFORE | UPDATE
            tgtype: 1 | 2 | 16,
            definition: "CREATE TRIGGER asset_updated_at BEFORE UPDATE ON public.asset FOR EACH ROW EXECUTE FUNCTION updated_at()".into(),
            old_table: None,
            new_table: None,
        }],
    }
}
