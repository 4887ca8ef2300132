//! Canonical forms used for comparison.
//!
//! Two objects are equivalent when their canonical forms are equal. The
//! canonical form is never rendered; emitted DDL always uses the declared
//! text.

use crate::introspect::split_index_keys;
use crate::model::{
    Column, Constraint, ConstraintKind, DataType, DefaultValue, Function, Index, SchemaObject,
    Table, Trigger,
};
use crate::normalize::{normalize_body, normalize_expression};

/// Canonical text of a column default; `None` when there is no default or
/// the default is NULL.
pub(crate) fn default_sql(default: Option<&DefaultValue>) -> Option<String> {
    default
        .map(|d| normalize_expression(&d.to_sql()))
        .filter(|sql| sql != "null")
}

pub(crate) fn column(column: &Column) -> Column {
    Column {
        name: column.name.clone(),
        data_type: column.data_type.clone(),
        nullable: column.nullable,
        default: default_sql(column.default.as_ref()).map(DefaultValue::Expression),
        comment: column.comment.clone(),
    }
}

pub(crate) fn constraint(constraint: &Constraint) -> Constraint {
    let kind = match &constraint.kind {
        ConstraintKind::Check { expression } => ConstraintKind::Check {
            expression: normalize_expression(expression),
        },
        other => other.clone(),
    };
    Constraint::new(constraint.name.clone(), kind)
}

pub(crate) fn table(table: &Table) -> Table {
    Table {
        name: table.name.clone(),
        columns: table.columns.iter().map(column).collect(),
        constraints: table.constraints.iter().map(constraint).collect(),
        indexes: table.indexes.iter().map(index).collect(),
        triggers: table.triggers.iter().map(trigger).collect(),
        comment: table.comment.clone(),
    }
}

pub(crate) fn index(index: &Index) -> Index {
    let (columns, expression) = match &index.expression {
        Some(expression) => split_index_keys(&normalize_expression(expression)),
        None => (index.columns.clone(), None),
    };
    Index {
        name: index.name.clone(),
        table: index.table.clone(),
        columns,
        expression,
        method: index.method.clone(),
        unique: index.unique,
        predicate: index.predicate.as_deref().map(normalize_expression),
    }
}

pub(crate) fn trigger(trigger: &Trigger) -> Trigger {
    let mut events = trigger.events.clone();
    events.sort();
    events.dedup();
    Trigger {
        events,
        when: trigger.when.as_deref().map(normalize_expression),
        ..trigger.clone()
    }
}

/// Canonical return type: parsed as a data type when it is one.
fn return_type(returns: &str) -> String {
    let normalized = normalize_expression(returns);
    DataType::parse(&normalized).map_or(normalized, |ty| ty.to_string())
}

/// Canonical function signature: argument list and return type.
pub(crate) fn signature(function: &Function) -> (String, String) {
    (
        normalize_expression(&function.arguments),
        return_type(&function.returns),
    )
}

pub(crate) fn function(function: &Function) -> Function {
    let (arguments, returns) = signature(function);
    Function {
        name: function.name.clone(),
        arguments,
        returns,
        language: function.language.to_ascii_lowercase(),
        body: normalize_body(&function.body),
        volatility: function.volatility,
        parallel: function.parallel,
        depends_on: Vec::new(),
    }
}

pub(crate) fn object(object: &SchemaObject) -> SchemaObject {
    match object {
        SchemaObject::Table(t) => SchemaObject::Table(table(t)),
        SchemaObject::Index(i) => SchemaObject::Index(index(i)),
        SchemaObject::Trigger(t) => SchemaObject::Trigger(trigger(t)),
        SchemaObject::Function(f) => SchemaObject::Function(function(f)),
        other => other.clone(),
    }
}

/// Returns `true` if both objects have the same canonical form.
pub(crate) fn equivalent(a: &SchemaObject, b: &SchemaObject) -> bool {
    object(a) == object(b)
}

/// Canonical form with every name that a rename could change blanked out.
/// Extensions are never rename candidates.
pub(crate) fn fingerprint(object: &SchemaObject) -> Option<String> {
    let unnamed = match self::object(object) {
        SchemaObject::Extension(_) => return None,
        SchemaObject::Enum(mut e) => {
            e.name.clear();
            SchemaObject::Enum(e)
        }
        SchemaObject::Function(mut f) => {
            f.name.clear();
            SchemaObject::Function(f)
        }
        SchemaObject::Table(mut t) => {
            t.name.clear();
            for c in &mut t.constraints {
                c.name.clear();
            }
            SchemaObject::Table(t)
        }
        SchemaObject::Constraint(mut c) => {
            c.constraint.name.clear();
            SchemaObject::Constraint(c)
        }
        SchemaObject::Index(mut i) => {
            i.name.clear();
            SchemaObject::Index(i)
        }
        SchemaObject::Trigger(mut t) => {
            t.name.clear();
            SchemaObject::Trigger(t)
        }
    };
    Some(format!("{unnamed:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{text, FunctionBuilder, IndexBuilder, IndexMethod, TableBuilder};

    #[test]
    fn defaults_compare_after_normalization() {
        assert_eq!(
            default_sql(Some(&DefaultValue::String("ACTIVE".into()))),
            default_sql(Some(&DefaultValue::Expression("'ACTIVE'::status".into())))
        );
        assert_eq!(default_sql(Some(&DefaultValue::Null)), None);
        assert_eq!(
            default_sql(Some(&DefaultValue::Boolean(true))),
            default_sql(Some(&DefaultValue::Expression("true".into())))
        );
    }

    #[test]
    fn expression_index_with_bare_columns_equals_column_index() {
        let declared = IndexBuilder::new("idx").columns(["name"]).build("person");
        let live = IndexBuilder::new("idx").expression("\"name\"").build("person");
        assert_eq!(index(&declared), index(&live));

        let trgm = IndexBuilder::new("idx")
            .expression("f_unaccent(name) gin_trgm_ops")
            .using(IndexMethod::Gin)
            .build("person");
        let live_trgm = IndexBuilder::new("idx")
            .expression("public.f_unaccent((name)::text) gin_trgm_ops")
            .using(IndexMethod::Gin)
            .build("person");
        assert_eq!(index(&trgm), index(&live_trgm));
    }

    #[test]
    fn function_signature_ignores_type_spelling() {
        let a = FunctionBuilder::new("f").arguments("TEXT").returns("varchar").build();
        let b = FunctionBuilder::new("f")
            .arguments("text")
            .returns("character varying")
            .build();
        assert_eq!(signature(&a), signature(&b));
    }

    #[test]
    fn fingerprints_ignore_names() {
        let a = TableBuilder::new("albums").column(text("name")).build();
        let b = TableBuilder::new("album").column(text("name")).build();
        assert_eq!(fingerprint(&a.into()), fingerprint(&b.into()));
        assert!(fingerprint(&crate::model::Extension::new("x").into()).is_none());
    }
}
