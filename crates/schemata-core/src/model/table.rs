//! Tables, constraints and indexes.

use serde::{Deserialize, Serialize};

use super::column::{Column, ColumnBuilder, ForeignKeyAction};
use super::routine::{Trigger, TriggerBuilder};

/// Target of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referencing columns on the owning table.
    pub columns: Vec<String>,
    /// The referenced table name.
    pub references_table: String,
    /// The referenced columns.
    pub references_columns: Vec<String>,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
    /// `DEFERRABLE`.
    #[serde(default)]
    pub deferrable: bool,
    /// `INITIALLY DEFERRED`.
    #[serde(default)]
    pub initially_deferred: bool,
}

impl ForeignKeyRef {
    /// Creates a foreign key with `NO ACTION` semantics.
    #[must_use]
    pub fn new(
        columns: Vec<String>,
        references_table: impl Into<String>,
        references_columns: Vec<String>,
    ) -> Self {
        Self {
            columns,
            references_table: references_table.into(),
            references_columns,
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
            deferrable: false,
            initially_deferred: false,
        }
    }
}

/// What a table constraint enforces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintKind {
    /// `PRIMARY KEY (columns)`
    PrimaryKey {
        /// Key columns.
        columns: Vec<String>,
    },
    /// `UNIQUE (columns)`
    Unique {
        /// Unique columns.
        columns: Vec<String>,
    },
    /// `CHECK (expression)`
    Check {
        /// Boolean SQL expression.
        expression: String,
    },
    /// `FOREIGN KEY (...) REFERENCES ...`
    ForeignKey(ForeignKeyRef),
}

impl ConstraintKind {
    /// Short label used in logs and operation summaries.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::PrimaryKey { .. } => "primary key",
            Self::Unique { .. } => "unique",
            Self::Check { .. } => "check",
            Self::ForeignKey(_) => "foreign key",
        }
    }

    /// Columns of the owning table the constraint covers.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        match self {
            Self::PrimaryKey { columns } | Self::Unique { columns } => columns,
            Self::ForeignKey(fk) => &fk.columns,
            Self::Check { .. } => &[],
        }
    }
}

/// A named table constraint.
///
/// An empty name means "unnamed"; the registry replaces it with a
/// deterministic generated name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    /// Constraint name.
    #[serde(default)]
    pub name: String,
    /// Constraint definition.
    #[serde(flatten)]
    pub kind: ConstraintKind,
}

impl Constraint {
    /// Creates a named constraint.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ConstraintKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Creates a constraint whose name is generated at registration.
    #[must_use]
    pub const fn unnamed(kind: ConstraintKind) -> Self {
        Self {
            name: String::new(),
            kind,
        }
    }

    /// Returns the foreign key definition, if this is one.
    #[must_use]
    pub const fn foreign_key(&self) -> Option<&ForeignKeyRef> {
        match &self.kind {
            ConstraintKind::ForeignKey(fk) => Some(fk),
            _ => None,
        }
    }
}

/// A foreign key constraint as a standalone graph node.
///
/// Foreign keys are created after every table exists, which is what lets
/// two tables reference each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableConstraint {
    /// Owning table.
    pub table: String,
    /// The constraint.
    pub constraint: Constraint,
}

/// Index access method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMethod {
    /// B-tree (default).
    #[default]
    Btree,
    /// Hash index.
    Hash,
    /// `GiST`.
    Gist,
    /// GIN.
    Gin,
    /// BRIN.
    Brin,
    /// SP-GiST.
    Spgist,
    /// Access method provided by an extension (e.g. `vectors`).
    Custom(String),
}

impl IndexMethod {
    /// Parses the access method name reported by `pg_am`.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "btree" => Self::Btree,
            "hash" => Self::Hash,
            "gist" => Self::Gist,
            "gin" => Self::Gin,
            "brin" => Self::Brin,
            "spgist" => Self::Spgist,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Returns the method keyword.
    #[must_use]
    pub fn as_sql(&self) -> &str {
        match self {
            Self::Btree => "btree",
            Self::Hash => "hash",
            Self::Gist => "gist",
            Self::Gin => "gin",
            Self::Brin => "brin",
            Self::Spgist => "spgist",
            Self::Custom(name) => name,
        }
    }

    /// Methods other than btree and hash usually rely on extension operator
    /// classes.
    #[must_use]
    pub const fn is_builtin_ordered(&self) -> bool {
        matches!(self, Self::Btree | Self::Hash)
    }
}

/// An index on a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Index name. Empty means generated at registration.
    #[serde(default)]
    pub name: String,
    /// Indexed table.
    #[serde(default)]
    pub table: String,
    /// Indexed columns. Ignored when `expression` is set.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Indexed expression list, e.g. `lower(name)` or `f_unaccent(name) gin_trgm_ops`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Access method.
    #[serde(default)]
    pub method: IndexMethod,
    /// `UNIQUE` index.
    #[serde(default)]
    pub unique: bool,
    /// Partial index predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

/// Fluent index builder.
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    index: Index,
}

impl IndexBuilder {
    /// Creates a builder for an index with an explicit name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            index: Index {
                name: name.into(),
                ..Index::default()
            },
        }
    }

    /// Creates a builder for an index whose name is generated.
    #[must_use]
    pub fn unnamed() -> Self {
        Self::default()
    }

    /// Sets the indexed columns.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Indexes an expression instead of plain columns.
    #[must_use]
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.index.expression = Some(expression.into());
        self
    }

    /// Sets the access method.
    #[must_use]
    pub fn using(mut self, method: IndexMethod) -> Self {
        self.index.method = method;
        self
    }

    /// Makes the index unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.index.unique = true;
        self
    }

    /// Restricts the index to rows matching `predicate`.
    #[must_use]
    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.index.predicate = Some(predicate.into());
        self
    }

    /// Builds the index for `table`.
    #[must_use]
    pub fn build(mut self, table: &str) -> Index {
        self.index.table = table.to_string();
        self.index
    }
}

/// A table definition.
///
/// In a registered graph the table node only keeps its columns and inline
/// constraints (primary key, unique, check); foreign keys, indexes and
/// triggers become nodes of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Ordered columns.
    pub columns: Vec<Column>,
    /// Constraints.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Indexes.
    #[serde(default)]
    pub indexes: Vec<Index>,
    /// Triggers.
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    /// Table comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
            triggers: Vec::new(),
            comment: None,
        }
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the primary key constraint, if declared.
    #[must_use]
    pub fn primary_key(&self) -> Option<&Constraint> {
        self.constraints
            .iter()
            .find(|c| matches!(c.kind, ConstraintKind::PrimaryKey { .. }))
    }
}

/// Fluent table builder.
///
/// # Example
///
/// ```rust
/// use schemata_core::model::{TableBuilder, uuid, text, timestamptz};
///
/// let table = TableBuilder::new("asset")
///     .column(uuid("id").primary_key().default_expr("uuid_generate_v4()"))
///     .column(text("original_path").not_null())
///     .column(timestamptz("created_at").not_null().default_expr("now()"))
///     .comment("Uploaded media")
///     .build();
///
/// assert_eq!(table.columns.len(), 3);
/// assert_eq!(table.constraints.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct TableBuilder {
    table: Table,
}

impl TableBuilder {
    /// Creates a builder for table `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: Table::new(name),
        }
    }

    /// Adds a column together with the constraints it implies.
    #[must_use]
    pub fn column(mut self, column: ColumnBuilder) -> Self {
        let (column, constraints) = column.into_parts();
        self.table.columns.push(column);
        self.table.constraints.extend(constraints);
        self
    }

    /// Adds a table-level constraint.
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.table.constraints.push(constraint);
        self
    }

    /// Adds a composite primary key constraint.
    #[must_use]
    pub fn primary_key<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraint(Constraint::unnamed(ConstraintKind::PrimaryKey {
            columns: columns.into_iter().map(Into::into).collect(),
        }))
    }

    /// Adds a composite unique constraint.
    #[must_use]
    pub fn unique<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraint(Constraint::unnamed(ConstraintKind::Unique {
            columns: columns.into_iter().map(Into::into).collect(),
        }))
    }

    /// Adds a named check constraint.
    #[must_use]
    pub fn check(self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.constraint(Constraint::new(
            name,
            ConstraintKind::Check {
                expression: expression.into(),
            },
        ))
    }

    /// Adds a foreign key constraint.
    #[must_use]
    pub fn foreign_key(self, fk: ForeignKeyRef) -> Self {
        self.constraint(Constraint::unnamed(ConstraintKind::ForeignKey(fk)))
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: IndexBuilder) -> Self {
        let index = index.build(&self.table.name);
        self.table.indexes.push(index);
        self
    }

    /// Adds a trigger.
    #[must_use]
    pub fn trigger(mut self, trigger: TriggerBuilder) -> Self {
        let trigger = trigger.build(&self.table.name);
        self.table.triggers.push(trigger);
        self
    }

    /// Sets the table comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.table.comment = Some(comment.into());
        self
    }

    /// Builds the table.
    #[must_use]
    pub fn build(self) -> Table {
        self.table
    }
}
