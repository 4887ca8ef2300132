//! SQLite dialect.
//!
//! SQLite has no extensions, enum types, stored functions or comments, and
//! its `ALTER TABLE` only adds, drops and renames columns. Everything else
//! fails with a dialect error instead of producing a script that would
//! silently diverge; enum columns are stored as `TEXT`.

use super::MigrationDialect;
use crate::diff::LabelPosition;
use crate::error::Result;
use crate::model::{
    Constraint, DataType, DefaultValue, EnumType, Extension, Function, IndexMethod, ObjectId,
    ObjectKind, Trigger,
};

/// SQLite dialect for migration SQL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn map_data_type(&self, data_type: &DataType) -> Result<String> {
        let name = match data_type {
            DataType::Boolean | DataType::SmallInt | DataType::Integer | DataType::BigInt => {
                "INTEGER"
            }
            DataType::Real | DataType::DoublePrecision => "REAL",
            DataType::Numeric { .. } => "NUMERIC",
            DataType::Text
            | DataType::Varchar(_)
            | DataType::Char(_)
            | DataType::Uuid
            | DataType::Date
            | DataType::Time
            | DataType::TimeTz
            | DataType::Timestamp
            | DataType::TimestampTz
            | DataType::Interval
            | DataType::Json
            | DataType::Jsonb
            | DataType::Inet
            | DataType::Enum(_) => "TEXT",
            DataType::Bytea => "BLOB",
            DataType::Array(_) => return Err(self.unsupported("array types")),
            DataType::Custom(name) => return Err(self.unsupported(&format!("type {name}"))),
        };
        Ok(name.to_string())
    }

    fn render_default(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            _ => default.to_sql(),
        }
    }

    fn rename(&self, from: &ObjectId, to: &ObjectId) -> Result<String> {
        if from.kind != ObjectKind::Table {
            return Err(self.unsupported(&format!("renaming {from}")));
        }
        Ok(format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(&from.name),
            self.quote_identifier(&to.name)
        ))
    }

    fn add_constraint(&self, _table: &str, constraint: &Constraint) -> Result<String> {
        Err(self.unsupported(&format!(
            "adding {} constraint {} to an existing table",
            constraint.kind.label(),
            constraint.name
        )))
    }

    fn drop_constraint(&self, _table: &str, constraint: &Constraint) -> Result<String> {
        Err(self.unsupported(&format!(
            "dropping {} constraint {}",
            constraint.kind.label(),
            constraint.name
        )))
    }

    fn index_method_sql(&self, method: &IndexMethod) -> Result<String> {
        Err(self.unsupported(&format!("index method {}", method.as_sql())))
    }

    fn create_extension(&self, extension: &Extension) -> Result<String> {
        Err(self.unsupported(&format!("extension {}", extension.name)))
    }

    fn drop_extension(&self, extension: &Extension) -> Result<String> {
        Err(self.unsupported(&format!("extension {}", extension.name)))
    }

    fn create_enum(&self, enum_type: &EnumType) -> Result<String> {
        Err(self.unsupported(&format!("enum type {}", enum_type.name)))
    }

    fn drop_enum(&self, enum_type: &EnumType) -> Result<String> {
        Err(self.unsupported(&format!("enum type {}", enum_type.name)))
    }

    fn add_enum_label(&self, name: &str, _label: &str, _position: &LabelPosition) -> Result<String> {
        Err(self.unsupported(&format!("enum type {name}")))
    }

    fn create_function(&self, function: &Function) -> Result<String> {
        Err(self.unsupported(&format!("function {}", function.name)))
    }

    fn drop_function(&self, function: &Function) -> Result<String> {
        Err(self.unsupported(&format!("function {}", function.name)))
    }

    fn create_trigger(&self, trigger: &Trigger) -> Result<String> {
        Err(self.unsupported(&format!("function trigger {}", trigger.name)))
    }

    fn drop_trigger(&self, trigger: &Trigger) -> Result<String> {
        Ok(format!("DROP TRIGGER {}", self.quote_identifier(&trigger.name)))
    }

    fn alter_column_type(&self, table: &str, column: &str, _to: &DataType) -> Result<String> {
        Err(self.unsupported(&format!("changing the type of {table}.{column}")))
    }

    fn set_nullable(&self, table: &str, column: &str, _nullable: bool) -> Result<String> {
        Err(self.unsupported(&format!("changing nullability of {table}.{column}")))
    }

    fn set_default(
        &self,
        table: &str,
        column: &str,
        _default: Option<&DefaultValue>,
    ) -> Result<String> {
        Err(self.unsupported(&format!("changing the default of {table}.{column}")))
    }

    fn comment_on_table(&self, table: &str, _comment: Option<&str>) -> Result<String> {
        Err(self.unsupported(&format!("comments on table {table}")))
    }

    fn comment_on_column(&self, table: &str, column: &str, _comment: Option<&str>) -> Result<String> {
        Err(self.unsupported(&format!("comments on column {table}.{column}")))
    }
}
