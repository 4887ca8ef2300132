//! Postgres catalog introspection.
//!
//! Every catalog query runs concurrently on the pool; the snapshot is only
//! assembled once all of them have returned. Objects owned by extensions,
//! indexes backing constraints, internal triggers and the history table are
//! left out so the live graph only holds what a declaration can describe.

use schemata_core::introspect::{
    CatalogSnapshot, ColumnRow, ConstraintRow, EnumRow, ExtensionRow, FunctionRow, IndexRow,
    Introspect, TableRow, TriggerRow,
};
use schemata_core::SchemaGraph;
use sqlx::postgres::PgPool;
use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::history::HISTORY_TABLE;

const EXTENSIONS_SQL: &str = "
SELECT extname::text
FROM pg_extension
ORDER BY extname";

const ENUMS_SQL: &str = "
SELECT t.typname::text,
       array_agg(e.enumlabel::text ORDER BY e.enumsortorder)
FROM pg_type t
JOIN pg_enum e ON e.enumtypid = t.oid
JOIN pg_namespace n ON n.oid = t.typnamespace
WHERE n.nspname = $1
GROUP BY t.typname
ORDER BY t.typname";

const TABLES_SQL: &str = "
SELECT c.relname::text,
       obj_description(c.oid, 'pg_class')
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1
  AND c.relkind IN ('r', 'p')
  AND NOT c.relispartition
  AND c.relname <> $2
ORDER BY c.relname";

const COLUMNS_SQL: &str = "
SELECT c.relname::text,
       a.attname::text,
       a.attnum::int4,
       format_type(a.atttypid, a.atttypmod),
       NOT a.attnotnull,
       pg_get_expr(d.adbin, d.adrelid),
       col_description(c.oid, a.attnum)
FROM pg_attribute a
JOIN pg_class c ON c.oid = a.attrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE n.nspname = $1
  AND c.relkind IN ('r', 'p')
  AND NOT c.relispartition
  AND c.relname <> $2
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY c.relname, a.attnum";

const CONSTRAINTS_SQL: &str = "
SELECT c.relname::text,
       con.conname::text,
       con.contype::text,
       ARRAY(
           SELECT a.attname::text
           FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
           JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
           ORDER BY k.ord
       ),
       pg_get_constraintdef(con.oid),
       ft.relname::text,
       ARRAY(
           SELECT a.attname::text
           FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
           JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
           ORDER BY k.ord
       ),
       con.confupdtype::text,
       con.confdeltype::text,
       con.condeferrable,
       con.condeferred
FROM pg_constraint con
JOIN pg_class c ON c.oid = con.conrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_class ft ON ft.oid = con.confrelid
WHERE n.nspname = $1
  AND con.contype IN ('p', 'u', 'c', 'f')
  AND con.conparentid = 0
  AND c.relname <> $2
ORDER BY c.relname, con.conname";

const INDEXES_SQL: &str = "
SELECT t.relname::text,
       i.relname::text,
       am.amname::text,
       x.indisunique,
       pg_get_indexdef(x.indexrelid),
       pg_get_expr(x.indpred, x.indrelid)
FROM pg_index x
JOIN pg_class i ON i.oid = x.indexrelid
JOIN pg_class t ON t.oid = x.indrelid
JOIN pg_am am ON am.oid = i.relam
JOIN pg_namespace n ON n.oid = t.relnamespace
WHERE n.nspname = $1
  AND t.relkind IN ('r', 'p')
  AND t.relname <> $2
  AND NOT EXISTS (
      SELECT 1 FROM pg_constraint con
      WHERE con.conindid = x.indexrelid AND con.contype IN ('p', 'u', 'x')
  )
ORDER BY t.relname, i.relname";

const FUNCTIONS_SQL: &str = "
SELECT p.proname::text,
       pg_get_function_arguments(p.oid),
       pg_get_function_result(p.oid),
       l.lanname::text,
       p.prosrc,
       p.provolatile::text,
       p.proparallel::text
FROM pg_proc p
JOIN pg_namespace n ON n.oid = p.pronamespace
JOIN pg_language l ON l.oid = p.prolang
WHERE n.nspname = $1
  AND p.prokind = 'f'
  AND NOT EXISTS (
      SELECT 1 FROM pg_depend d
      WHERE d.classid = 'pg_proc'::regclass AND d.objid = p.oid AND d.deptype = 'e'
  )
ORDER BY p.proname";

const TRIGGERS_SQL: &str = "
SELECT c.relname::text,
       t.tgname::text,
       p.proname::text,
       t.tgtype,
       pg_get_triggerdef(t.oid),
       t.tgoldtable::text,
       t.tgnewtable::text
FROM pg_trigger t
JOIN pg_class c ON c.oid = t.tgrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
JOIN pg_proc p ON p.oid = t.tgfoid
WHERE n.nspname = $1
  AND NOT t.tgisinternal
  AND t.tgparentid = 0
ORDER BY c.relname, t.tgname";

type ColumnTuple = (
    String,
    String,
    i32,
    String,
    bool,
    Option<String>,
    Option<String>,
);

type ConstraintTuple = (
    String,
    String,
    String,
    Vec<String>,
    String,
    Option<String>,
    Vec<String>,
    String,
    String,
    bool,
    bool,
);

type IndexTuple = (String, String, String, bool, String, Option<String>);

type FunctionTuple = (String, String, String, String, String, String, String);

type TriggerTuple = (
    String,
    String,
    String,
    i16,
    String,
    Option<String>,
    Option<String>,
);

/// Reads the live schema of one Postgres schema (namespace).
#[derive(Debug, Clone)]
pub struct PgIntrospector {
    pool: PgPool,
    schema: String,
}

impl PgIntrospector {
    /// Creates an introspector for `schema` (usually `public`).
    #[must_use]
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// Reads the catalog and assembles the live graph.
    ///
    /// # Errors
    ///
    /// Fails on database errors or if the catalog rows do not form a valid
    /// graph.
    pub async fn live_graph(&self) -> Result<SchemaGraph> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.into_graph()?)
    }

    async fn read(&self) -> std::result::Result<CatalogSnapshot, sqlx::Error> {
        let schema = self.schema.as_str();
        let pool = &self.pool;

        let (extensions, enums, tables, columns, constraints, indexes, functions, triggers) =
            tokio::try_join!(
                sqlx::query_as::<_, (String,)>(EXTENSIONS_SQL).fetch_all(pool),
                sqlx::query_as::<_, (String, Vec<String>)>(ENUMS_SQL)
                    .bind(schema)
                    .fetch_all(pool),
                sqlx::query_as::<_, (String, Option<String>)>(TABLES_SQL)
                    .bind(schema)
                    .bind(HISTORY_TABLE)
                    .fetch_all(pool),
                sqlx::query_as::<_, ColumnTuple>(COLUMNS_SQL)
                    .bind(schema)
                    .bind(HISTORY_TABLE)
                    .fetch_all(pool),
                sqlx::query_as::<_, ConstraintTuple>(CONSTRAINTS_SQL)
                    .bind(schema)
                    .bind(HISTORY_TABLE)
                    .fetch_all(pool),
                sqlx::query_as::<_, IndexTuple>(INDEXES_SQL)
                    .bind(schema)
                    .bind(HISTORY_TABLE)
                    .fetch_all(pool),
                sqlx::query_as::<_, FunctionTuple>(FUNCTIONS_SQL)
                    .bind(schema)
                    .fetch_all(pool),
                sqlx::query_as::<_, TriggerTuple>(TRIGGERS_SQL)
                    .bind(schema)
                    .fetch_all(pool),
            )?;

        debug!(
            schema,
            tables = tables.len(),
            columns = columns.len(),
            constraints = constraints.len(),
            indexes = indexes.len(),
            functions = functions.len(),
            triggers = triggers.len(),
            "read catalog"
        );

        Ok(CatalogSnapshot {
            extensions: extensions
                .into_iter()
                .map(|(name,)| ExtensionRow { name })
                .collect(),
            enums: enums
                .into_iter()
                .map(|(name, labels)| EnumRow { name, labels })
                .collect(),
            tables: tables
                .into_iter()
                .map(|(name, comment)| TableRow { name, comment })
                .collect(),
            columns: columns.into_iter().map(column_row).collect(),
            constraints: constraints.into_iter().map(constraint_row).collect(),
            indexes: indexes.into_iter().map(index_row).collect(),
            functions: functions.into_iter().map(function_row).collect(),
            triggers: triggers.into_iter().map(trigger_row).collect(),
        })
    }
}

fn column_row(row: ColumnTuple) -> ColumnRow {
    let (table, name, position, data_type, nullable, default, comment) = row;
    ColumnRow {
        table,
        name,
        position,
        data_type,
        nullable,
        default,
        comment,
    }
}

fn index_row(row: IndexTuple) -> IndexRow {
    let (table, name, method, unique, definition, predicate) = row;
    IndexRow {
        table,
        name,
        method,
        unique,
        definition,
        predicate,
    }
}

fn function_row(row: FunctionTuple) -> FunctionRow {
    let (name, arguments, returns, language, body, volatility, parallel) = row;
    FunctionRow {
        name,
        arguments,
        returns,
        language,
        body,
        volatility,
        parallel,
    }
}

fn trigger_row(row: TriggerTuple) -> TriggerRow {
    let (table, name, function, tgtype, definition, old_table, new_table) = row;
    TriggerRow {
        table,
        name,
        function,
        tgtype,
        definition,
        old_table,
        new_table,
    }
}

fn constraint_row(row: ConstraintTuple) -> ConstraintRow {
    let (
        table,
        name,
        kind,
        columns,
        definition,
        references_table,
        references_columns,
        on_update,
        on_delete,
        deferrable,
        initially_deferred,
    ) = row;
    ConstraintRow {
        table,
        name,
        kind,
        columns,
        definition,
        references_table,
        references_columns,
        on_update,
        on_delete,
        deferrable,
        initially_deferred,
    }
}

impl Introspect for PgIntrospector {
    type Error = MigrateError;

    async fn snapshot(&self) -> Result<CatalogSnapshot> {
        info!(schema = %self.schema, "introspecting database");
        Ok(self.read().await?)
    }
}
