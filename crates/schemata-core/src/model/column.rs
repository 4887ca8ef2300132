//! Column definitions and the fluent column builder.

use serde::{Deserialize, Serialize};

use super::table::{Constraint, ConstraintKind, ForeignKeyRef};
use super::types::DataType;

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action.
    #[default]
    NoAction,
    /// Restrict deletion/update.
    Restrict,
    /// Cascade the operation.
    Cascade,
    /// Set to NULL.
    SetNull,
    /// Set to default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of the action.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Decodes the single-character action code stored in `pg_constraint`.
    #[must_use]
    pub const fn from_catalog_code(code: char) -> Option<Self> {
        match code {
            'a' => Some(Self::NoAction),
            'r' => Some(Self::Restrict),
            'c' => Some(Self::Cascade),
            'n' => Some(Self::SetNull),
            'd' => Some(Self::SetDefault),
            _ => None,
        }
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Boolean(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// Raw SQL expression (e.g., `now()`). May call registered functions.
    Expression(String),
}

impl DefaultValue {
    /// Returns the SQL representation of the default value.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Boolean(b) => {
                if *b {
                    String::from("TRUE")
                } else {
                    String::from("FALSE")
                }
            }
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Expression(expr) => expr.clone(),
        }
    }

    /// Returns the expression text a function call could appear in.
    #[must_use]
    pub fn expression(&self) -> Option<&str> {
        match self {
            Self::Expression(expr) => Some(expr),
            _ => None,
        }
    }
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Data type.
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Whether the column is nullable.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Column comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

const fn default_nullable() -> bool {
    true
}

impl Column {
    /// Creates a nullable column without default.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            comment: None,
        }
    }
}

/// Fluent column builder.
///
/// Column-level shortcuts (`primary_key`, `unique`, `references`, `check`)
/// are lifted into table constraints when the column is added to a
/// [`TableBuilder`](super::table::TableBuilder).
#[derive(Debug, Clone)]
pub struct ColumnBuilder {
    column: Column,
    primary_key: bool,
    unique: bool,
    references: Option<ForeignKeyRef>,
    check: Option<String>,
}

impl ColumnBuilder {
    /// Creates a new column builder with name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            column: Column::new(name, data_type),
            primary_key: false,
            unique: false,
            references: None,
            check: None,
        }
    }

    /// Marks the column as NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.column.nullable = false;
        self
    }

    /// Marks the column as nullable (default).
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.column.nullable = true;
        self
    }

    /// Marks the column as PRIMARY KEY.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.column.nullable = false; // Primary keys are implicitly NOT NULL
        self
    }

    /// Marks the column as UNIQUE.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets a boolean default value.
    #[must_use]
    pub fn default_bool(mut self, value: bool) -> Self {
        self.column.default = Some(DefaultValue::Boolean(value));
        self
    }

    /// Sets an integer default value.
    #[must_use]
    pub fn default_int(mut self, value: i64) -> Self {
        self.column.default = Some(DefaultValue::Integer(value));
        self
    }

    /// Sets a string default value.
    #[must_use]
    pub fn default_str(mut self, value: impl Into<String>) -> Self {
        self.column.default = Some(DefaultValue::String(value.into()));
        self
    }

    /// Sets a raw SQL expression as default (e.g., `now()`).
    #[must_use]
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.column.default = Some(DefaultValue::Expression(expr.into()));
        self
    }

    /// Sets the column comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.column.comment = Some(comment.into());
        self
    }

    /// Adds a foreign key to `table(column)`.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKeyRef::new(
            vec![self.column.name.clone()],
            table,
            vec![column.into()],
        ));
        self
    }

    /// Adds a foreign key with ON DELETE and ON UPDATE actions.
    #[must_use]
    pub fn references_full(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        on_delete: ForeignKeyAction,
        on_update: ForeignKeyAction,
    ) -> Self {
        let mut fk = ForeignKeyRef::new(vec![self.column.name.clone()], table, vec![column.into()]);
        fk.on_delete = on_delete;
        fk.on_update = on_update;
        self.references = Some(fk);
        self
    }

    /// Adds a CHECK constraint.
    #[must_use]
    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.check = Some(expr.into());
        self
    }

    /// Splits the builder into the column and the constraints it implies.
    /// Implied constraints are unnamed; the registry generates their names.
    #[must_use]
    pub fn into_parts(self) -> (Column, Vec<Constraint>) {
        let name = self.column.name.clone();
        let mut constraints = Vec::new();
        if self.primary_key {
            constraints.push(Constraint::unnamed(ConstraintKind::PrimaryKey {
                columns: vec![name.clone()],
            }));
        }
        if self.unique {
            constraints.push(Constraint::unnamed(ConstraintKind::Unique {
                columns: vec![name],
            }));
        }
        if let Some(expression) = self.check {
            constraints.push(Constraint::unnamed(ConstraintKind::Check { expression }));
        }
        if let Some(fk) = self.references {
            constraints.push(Constraint::unnamed(ConstraintKind::ForeignKey(fk)));
        }
        (self.column, constraints)
    }

    /// Builds the bare column, discarding column-level constraints.
    #[must_use]
    pub fn build(self) -> Column {
        self.column
    }
}

// =============================================================================
// Shorthand Functions for Common Types
// =============================================================================

/// Creates a UUID column builder.
#[must_use]
pub fn uuid(name: impl Into<String>) -> ColumnBuilder {
    ColumnBuilder::new(name, DataType::Uuid)
}

/// Creates an INTEGER column builder.
#[must_use]
pub fn integer(name: impl Into<String>) -> ColumnBuilder {
    ColumnBuilder::new(name, DataType::Integer)
}

/// Creates a BIGINT column builder.
#[must_use]
pub fn bigint(name: impl Into<String>) -> ColumnBuilder {
    ColumnBuilder::new(name, DataType::BigInt)
}

/// Creates a TEXT column builder.
#[must_use]
pub fn text(name: impl Into<String>) -> ColumnBuilder {
    ColumnBuilder::new(name, DataType::Text)
}

/// Creates a VARCHAR column builder.
#[must_use]
pub fn varchar(name: impl Into<String>, len: u32) -> ColumnBuilder {
    ColumnBuilder::new(name, DataType::Varchar(Some(len)))
}

/// Creates a BOOLEAN column builder.
#[must_use]
pub fn boolean(name: impl Into<String>) -> ColumnBuilder {
    ColumnBuilder::new(name, DataType::Boolean)
}

/// Creates a TIMESTAMP WITH TIME ZONE column builder.
#[must_use]
pub fn timestamptz(name: impl Into<String>) -> ColumnBuilder {
    ColumnBuilder::new(name, DataType::TimestampTz)
}

/// Creates a JSONB column builder.
#[must_use]
pub fn jsonb(name: impl Into<String>) -> ColumnBuilder {
    ColumnBuilder::new(name, DataType::Jsonb)
}

/// Creates a column builder typed by a user-defined enum.
#[must_use]
pub fn enumeration(name: impl Into<String>, enum_name: impl Into<String>) -> ColumnBuilder {
    ColumnBuilder::new(name, DataType::Enum(enum_name.into()))
}
