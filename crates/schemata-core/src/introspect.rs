//! Schema introspection.
//!
//! Driver crates implement [`Introspect`] to read raw catalog rows from a
//! live database. The core crate turns those rows into a [`SchemaGraph`]
//! with [`CatalogSnapshot::into_graph`], so assembly stays pure and can be
//! tested without a database.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CompileError, Result};
use crate::graph::SchemaGraph;
use crate::model::{
    Column, Constraint, ConstraintKind, DataType, DefaultValue, EnumType, Extension,
    ForeignKeyAction, ForeignKeyRef, Function, Index, IndexMethod, ParallelSafety, SchemaObject,
    Table, Trigger, TriggerEvent, TriggerScope, TriggerTiming, Volatility,
};
use crate::registry::register;

/// Reads the current schema of a live database.
///
/// Implementations live in driver crates. They only read; nothing is
/// modified.
pub trait Introspect {
    /// Error type for introspection failures.
    type Error: std::error::Error;

    /// Reads every catalog row the compiler needs.
    fn snapshot(&self) -> impl Future<Output = std::result::Result<CatalogSnapshot, Self::Error>> + Send;
}

/// `pg_extension` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRow {
    /// Extension name.
    pub name: String,
}

/// Enum type with its labels in sort order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumRow {
    /// Type name.
    pub name: String,
    /// Labels ordered by `enumsortorder`.
    pub labels: Vec<String>,
}

/// Ordinary table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    /// Table name.
    pub name: String,
    /// `obj_description` of the table.
    pub comment: Option<String>,
}

/// Table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRow {
    /// Owning table.
    pub table: String,
    /// Column name.
    pub name: String,
    /// `attnum`.
    pub position: i32,
    /// `format_type(atttypid, atttypmod)`.
    pub data_type: String,
    /// `NOT attnotnull`.
    pub nullable: bool,
    /// `pg_get_expr(adbin, adrelid)`.
    pub default: Option<String>,
    /// `col_description`.
    pub comment: Option<String>,
}

/// `pg_constraint` row for a primary key, unique, check or foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintRow {
    /// Owning table.
    pub table: String,
    /// Constraint name.
    pub name: String,
    /// `contype`: `p`, `u`, `c` or `f`.
    pub kind: String,
    /// Constrained columns in key order.
    pub columns: Vec<String>,
    /// `pg_get_constraintdef`.
    pub definition: String,
    /// Referenced table (foreign keys).
    pub references_table: Option<String>,
    /// Referenced columns (foreign keys).
    pub references_columns: Vec<String>,
    /// `confupdtype`.
    pub on_update: String,
    /// `confdeltype`.
    pub on_delete: String,
    /// `condeferrable`.
    pub deferrable: bool,
    /// `condeferred`.
    pub initially_deferred: bool,
}

/// Index that does not back a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRow {
    /// Indexed table.
    pub table: String,
    /// Index name.
    pub name: String,
    /// Access method name.
    pub method: String,
    /// `indisunique`.
    pub unique: bool,
    /// `pg_get_indexdef`.
    pub definition: String,
    /// `pg_get_expr(indpred, indrelid)`.
    pub predicate: Option<String>,
}

/// User-defined function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRow {
    /// Function name.
    pub name: String,
    /// `pg_get_function_arguments`.
    pub arguments: String,
    /// `pg_get_function_result`.
    pub returns: String,
    /// Language name.
    pub language: String,
    /// `prosrc`.
    pub body: String,
    /// `provolatile`.
    pub volatility: String,
    /// `proparallel`.
    pub parallel: String,
}

/// User trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRow {
    /// Table the trigger is attached to.
    pub table: String,
    /// Trigger name.
    pub name: String,
    /// Function the trigger executes.
    pub function: String,
    /// `tgtype` bit mask.
    pub tgtype: i16,
    /// `pg_get_triggerdef`.
    pub definition: String,
    /// `tgoldtable`.
    pub old_table: Option<String>,
    /// `tgnewtable`.
    pub new_table: Option<String>,
}

/// Everything read from the catalog in one introspection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Installed extensions.
    pub extensions: Vec<ExtensionRow>,
    /// Enum types.
    pub enums: Vec<EnumRow>,
    /// Tables.
    pub tables: Vec<TableRow>,
    /// Columns of all tables.
    pub columns: Vec<ColumnRow>,
    /// Constraints of all tables.
    pub constraints: Vec<ConstraintRow>,
    /// Indexes of all tables.
    pub indexes: Vec<IndexRow>,
    /// Functions.
    pub functions: Vec<FunctionRow>,
    /// Triggers.
    pub triggers: Vec<TriggerRow>,
}

const TRIGGER_TYPE_ROW: i16 = 1;
const TRIGGER_TYPE_BEFORE: i16 = 1 << 1;
const TRIGGER_TYPE_INSERT: i16 = 1 << 2;
const TRIGGER_TYPE_DELETE: i16 = 1 << 3;
const TRIGGER_TYPE_UPDATE: i16 = 1 << 4;
const TRIGGER_TYPE_TRUNCATE: i16 = 1 << 5;
const TRIGGER_TYPE_INSTEAD: i16 = 1 << 6;

static TRIGGER_WHEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\sWHEN\s+\((.*)\)\s+EXECUTE\s+(?:FUNCTION|PROCEDURE)\s")
        .expect("trigger pattern is valid")
});

static CHECK_DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^CHECK\s*\((.*)\)(?:\s+NOT\s+VALID)?\s*$").expect("check pattern is valid")
});

impl CatalogSnapshot {
    /// Assembles the rows into a registered graph.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Introspection`] if the rows are inconsistent
    /// (a column for an unknown table, an unknown constraint type) or do not
    /// register cleanly.
    pub fn into_graph(self) -> Result<SchemaGraph> {
        let mut tables: BTreeMap<String, Table> = self
            .tables
            .into_iter()
            .map(|row| {
                let mut table = Table::new(&row.name);
                table.comment = row.comment;
                (row.name, table)
            })
            .collect();

        let mut columns = self.columns;
        columns.sort_by(|a, b| (&a.table, a.position).cmp(&(&b.table, b.position)));
        for row in columns {
            let table = table_mut(&mut tables, &row.table, "column", &row.name)?;
            table.columns.push(column(row)?);
        }

        for row in self.constraints {
            let table = table_mut(&mut tables, &row.table, "constraint", &row.name)?;
            table.constraints.push(constraint(row)?);
        }

        for row in self.indexes {
            let table = table_mut(&mut tables, &row.table, "index", &row.name)?;
            table.indexes.push(index(row));
        }

        for row in self.triggers {
            let table = table_mut(&mut tables, &row.table, "trigger", &row.name)?;
            table.triggers.push(trigger(row));
        }

        let mut objects: Vec<SchemaObject> = Vec::new();
        objects.extend(
            self.extensions
                .into_iter()
                .map(|row| Extension::new(row.name).into()),
        );
        objects.extend(
            self.enums
                .into_iter()
                .map(|row| EnumType::new(row.name, row.labels).into()),
        );
        for row in self.functions {
            objects.push(function(row)?.into());
        }
        objects.extend(tables.into_values().map(SchemaObject::Table));

        debug!(objects = objects.len(), "assembled catalog snapshot");
        register(objects).map_err(|err| {
            warn!(error = %err, "live schema does not register");
            CompileError::Introspection(err.to_string())
        })
    }
}

fn table_mut<'a>(
    tables: &'a mut BTreeMap<String, Table>,
    table: &str,
    kind: &str,
    name: &str,
) -> Result<&'a mut Table> {
    tables.get_mut(table).ok_or_else(|| {
        CompileError::Introspection(format!("{kind} '{name}' belongs to unknown table '{table}'"))
    })
}

fn column(row: ColumnRow) -> Result<Column> {
    let data_type = DataType::parse(&row.data_type)
        .map_err(|err| CompileError::Introspection(format!("{}.{}: {err}", row.table, row.name)))?;
    Ok(Column {
        name: row.name,
        data_type,
        nullable: row.nullable,
        default: row.default.map(DefaultValue::Expression),
        comment: row.comment,
    })
}

fn first_char(code: &str) -> char {
    code.chars().next().unwrap_or(' ')
}

fn constraint(row: ConstraintRow) -> Result<Constraint> {
    let kind = match row.kind.as_str() {
        "p" => ConstraintKind::PrimaryKey {
            columns: row.columns,
        },
        "u" => ConstraintKind::Unique {
            columns: row.columns,
        },
        "c" => {
            let expression = CHECK_DEFINITION
                .captures(&row.definition)
                .and_then(|c| c.get(1))
                .map_or_else(|| row.definition.clone(), |m| m.as_str().to_string());
            ConstraintKind::Check { expression }
        }
        "f" => {
            let action = |code: &str| {
                ForeignKeyAction::from_catalog_code(first_char(code)).ok_or_else(|| {
                    CompileError::Introspection(format!(
                        "constraint '{}' has unknown action '{code}'",
                        row.name
                    ))
                })
            };
            let references_table = row.references_table.clone().ok_or_else(|| {
                CompileError::Introspection(format!(
                    "foreign key '{}' has no referenced table",
                    row.name
                ))
            })?;
            ConstraintKind::ForeignKey(ForeignKeyRef {
                columns: row.columns.clone(),
                references_table,
                references_columns: row.references_columns.clone(),
                on_delete: action(&row.on_delete)?,
                on_update: action(&row.on_update)?,
                deferrable: row.deferrable,
                initially_deferred: row.initially_deferred,
            })
        }
        other => {
            return Err(CompileError::Introspection(format!(
                "constraint '{}' has unsupported type '{other}'",
                row.name
            )))
        }
    };
    Ok(Constraint::new(row.name, kind))
}

/// Extracts the key list between the parentheses following `USING method`.
fn index_keys(definition: &str) -> Option<&str> {
    let using = definition.find(" USING ")?;
    let open = using + definition[using..].find('(')?;
    let mut depth = 0usize;
    let mut in_quote: Option<char> = None;
    for (offset, c) in definition[open..].char_indices() {
        match (in_quote, c) {
            (Some(q), c) if c == q => in_quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => in_quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(&definition[open + 1..open + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits an index key list into plain columns, or keeps it as an
/// expression when any key is more than a bare column name.
#[must_use]
pub fn split_index_keys(keys: &str) -> (Vec<String>, Option<String>) {
    static BARE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"^(?:[a-z_][a-z0-9_]*|"(?:[^"]|"")+")$"#).expect("key pattern is valid")
    });

    let parts = split_top_level(keys);
    if !parts.is_empty() && parts.iter().all(|p| BARE.is_match(p)) {
        let columns = parts
            .iter()
            .map(|p| {
                p.strip_prefix('"')
                    .and_then(|p| p.strip_suffix('"'))
                    .map_or_else(|| (*p).to_string(), |inner| inner.replace("\"\"", "\""))
            })
            .collect();
        (columns, None)
    } else {
        (Vec::new(), Some(keys.trim().to_string()))
    }
}

fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut in_quote: Option<char> = None;
    for (i, c) in list.char_indices() {
        match (in_quote, c) {
            (Some(q), c) if c == q => in_quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => in_quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = list[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

fn index(row: IndexRow) -> Index {
    let (columns, expression) = index_keys(&row.definition).map_or_else(
        || (Vec::new(), Some(row.definition.clone())),
        split_index_keys,
    );
    Index {
        name: row.name,
        table: row.table,
        columns,
        expression,
        method: IndexMethod::parse(&row.method),
        unique: row.unique,
        predicate: row.predicate,
    }
}

fn trigger(row: TriggerRow) -> Trigger {
    let tgtype = row.tgtype;
    let timing = if tgtype & TRIGGER_TYPE_INSTEAD != 0 {
        TriggerTiming::InsteadOf
    } else if tgtype & TRIGGER_TYPE_BEFORE != 0 {
        TriggerTiming::Before
    } else {
        TriggerTiming::After
    };
    let events = [
        (TRIGGER_TYPE_INSERT, TriggerEvent::Insert),
        (TRIGGER_TYPE_UPDATE, TriggerEvent::Update),
        (TRIGGER_TYPE_DELETE, TriggerEvent::Delete),
        (TRIGGER_TYPE_TRUNCATE, TriggerEvent::Truncate),
    ]
    .into_iter()
    .filter(|(bit, _)| tgtype & bit != 0)
    .map(|(_, event)| event)
    .collect();
    let scope = if tgtype & TRIGGER_TYPE_ROW != 0 {
        TriggerScope::Row
    } else {
        TriggerScope::Statement
    };
    let when = TRIGGER_WHEN
        .captures(&row.definition)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Trigger {
        name: row.name,
        table: row.table,
        function: row.function,
        timing,
        events,
        scope,
        old_table: row.old_table,
        new_table: row.new_table,
        when,
    }
}

fn function(row: FunctionRow) -> Result<Function> {
    let volatility = Volatility::from_catalog_code(first_char(&row.volatility)).ok_or_else(|| {
        CompileError::Introspection(format!("function '{}' has unknown volatility", row.name))
    })?;
    let parallel = ParallelSafety::from_catalog_code(first_char(&row.parallel)).ok_or_else(|| {
        CompileError::Introspection(format!("function '{}' has unknown parallel mode", row.name))
    })?;
    Ok(Function {
        name: row.name,
        arguments: row.arguments,
        returns: row.returns,
        language: row.language,
        body: row.body,
        volatility,
        parallel,
        depends_on: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectId, ObjectKind};

    fn column_row(table: &str, name: &str, position: i32, data_type: &str) -> ColumnRow {
        ColumnRow {
            table: table.into(),
            name: name.into(),
            position,
            data_type: data_type.into(),
            nullable: true,
            default: None,
            comment: None,
        }
    }

    #[test]
    fn index_key_list_is_extracted() {
        let def = "CREATE INDEX idx ON public.person USING gin (f_unaccent((name)::text) gin_trgm_ops) WHERE (name <> ''::text)";
        assert_eq!(
            index_keys(def),
            Some("f_unaccent((name)::text) gin_trgm_ops")
        );
        assert_eq!(
            split_index_keys("\"ownerId\", name"),
            (vec!["ownerId".to_string(), "name".to_string()], None)
        );
        assert_eq!(
            split_index_keys("name DESC"),
            (Vec::new(), Some("name DESC".to_string()))
        );
    }

    #[test]
    fn trigger_bits_are_decoded() {
        let t = trigger(TriggerRow {
            table: "asset".into(),
            name: "asset_delete_audit".into(),
            function: "asset_delete_audit".into(),
            tgtype: TRIGGER_TYPE_DELETE,
            definition: "CREATE TRIGGER asset_delete_audit AFTER DELETE ON public.asset REFERENCING OLD TABLE AS old FOR EACH STATEMENT WHEN (pg_trigger_depth() = 0) EXECUTE FUNCTION asset_delete_audit()".into(),
            old_table: Some("old".into()),
            new_table: None,
        });
        assert_eq!(t.timing, TriggerTiming::After);
        assert_eq!(t.events, vec![TriggerEvent::Delete]);
        assert_eq!(t.scope, TriggerScope::Statement);
        assert_eq!(t.when.as_deref(), Some("pg_trigger_depth() = 0"));

        let t = trigger(TriggerRow {
            tgtype: TRIGGER_TYPE_ROW | TRIGGER_TYPE_BEFORE | TRIGGER_TYPE_UPDATE | TRIGGER_TYPE_INSERT,
            definition: String::new(),
            ..TriggerRow {
                table: "a".into(),
                name: "t".into(),
                function: "f".into(),
                tgtype: 0,
                definition: String::new(),
                old_table: None,
                new_table: None,
            }
        });
        assert_eq!(t.timing, TriggerTiming::Before);
        assert_eq!(t.events, vec![TriggerEvent::Insert, TriggerEvent::Update]);
        assert_eq!(t.scope, TriggerScope::Row);
        assert!(t.when.is_none());
    }

    #[test]
    fn snapshot_assembles_graph() {
        let snapshot = CatalogSnapshot {
            extensions: vec![ExtensionRow {
                name: "pg_trgm".into(),
            }],
            enums: vec![EnumRow {
                name: "status".into(),
                labels: vec!["ACTIVE".into(), "ARCHIVED".into()],
            }],
            tables: vec![
                TableRow {
                    name: "asset".into(),
                    comment: Some("media".into()),
                },
                TableRow {
                    name: "user".into(),
                    comment: None,
                },
            ],
            columns: vec![
                column_row("asset", "status", 3, "status"),
                column_row("asset", "id", 1, "uuid"),
                column_row("asset", "ownerId", 2, "uuid"),
                column_row("user", "id", 1, "uuid"),
            ],
            constraints: vec![ConstraintRow {
                table: "asset".into(),
                name: "asset_owner_fk".into(),
                kind: "f".into(),
                columns: vec!["ownerId".into()],
                definition: String::new(),
                references_table: Some("user".into()),
                references_columns: vec!["id".into()],
                on_update: "a".into(),
                on_delete: "c".into(),
                deferrable: false,
                initially_deferred: false,
            }],
            ..CatalogSnapshot::default()
        };

        let graph = snapshot.into_graph().unwrap();
        let asset = graph.table("asset").unwrap();
        let names: Vec<&str> = asset.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "ownerId", "status"]);
        assert_eq!(asset.columns[2].data_type, DataType::Enum("status".into()));
        assert_eq!(asset.comment.as_deref(), Some("media"));
        assert!(graph.contains(&ObjectId::scoped(
            ObjectKind::Constraint,
            "asset",
            "asset_owner_fk"
        )));
    }

    #[test]
    fn orphan_rows_are_introspection_errors() {
        let snapshot = CatalogSnapshot {
            columns: vec![column_row("ghost", "id", 1, "uuid")],
            ..CatalogSnapshot::default()
        };
        assert_eq!(snapshot.into_graph().unwrap_err().kind(), "IntrospectionError");
    }

    #[test]
    fn check_definition_is_unwrapped() {
        let c = constraint(ConstraintRow {
            table: "t".into(),
            name: "positive".into(),
            kind: "c".into(),
            columns: vec![],
            definition: "CHECK ((amount > 0))".into(),
            references_table: None,
            references_columns: vec![],
            on_update: " ".into(),
            on_delete: " ".into(),
            deferrable: false,
            initially_deferred: false,
        })
        .unwrap();
        assert_eq!(
            c.kind,
            ConstraintKind::Check {
                expression: "(amount > 0)".into()
            }
        );
    }
}
