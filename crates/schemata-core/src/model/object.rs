//! Object identity and the heterogeneous schema object.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::routine::{Function, Trigger};
use super::table::{Index, Table, TableConstraint};

/// Kind of a schema object.
///
/// The declaration order is the rank used to break ties when ordering
/// independent objects: extensions first, triggers last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Extension.
    Extension,
    /// Enum type.
    Enum,
    /// Function.
    Function,
    /// Table.
    Table,
    /// Foreign key constraint.
    Constraint,
    /// Index.
    Index,
    /// Trigger.
    Trigger,
}

impl ObjectKind {
    /// Lower-case name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extension => "extension",
            Self::Enum => "enum",
            Self::Function => "function",
            Self::Table => "table",
            Self::Constraint => "constraint",
            Self::Index => "index",
            Self::Trigger => "trigger",
        }
    }

    /// Parses a kind name as accepted on the command line.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "extension" => Some(Self::Extension),
            "enum" | "type" => Some(Self::Enum),
            "function" => Some(Self::Function),
            "table" => Some(Self::Table),
            "constraint" => Some(Self::Constraint),
            "index" => Some(Self::Index),
            "trigger" => Some(Self::Trigger),
            _ => None,
        }
    }

    /// Whether objects of this kind are named relative to a table.
    #[must_use]
    pub const fn is_table_scoped(self) -> bool {
        matches!(self, Self::Constraint | Self::Trigger)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identity of a schema object: its kind and qualified name.
///
/// Constraints and triggers are qualified as `table.name`. Ordering is by
/// kind rank first, then by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Object kind.
    pub kind: ObjectKind,
    /// Qualified name.
    pub name: String,
}

impl ObjectId {
    /// Creates an identifier.
    #[must_use]
    pub fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Identifier of a table-scoped object.
    #[must_use]
    pub fn scoped(kind: ObjectKind, table: &str, name: &str) -> Self {
        Self::new(kind, format!("{table}.{name}"))
    }

    /// Shorthand for a table identifier.
    #[must_use]
    pub fn table(name: impl Into<String>) -> Self {
        Self::new(ObjectKind::Table, name)
    }

    /// Splits a table-scoped name into `(table, name)`.
    #[must_use]
    pub fn table_scope(&self) -> Option<(&str, &str)> {
        if self.kind.is_table_scoped() {
            self.name.split_once('.')
        } else {
            None
        }
    }

    /// The unqualified object name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.table_scope().map_or(self.name.as_str(), |(_, name)| name)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// A database extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extension {
    /// Extension name.
    pub name: String,
}

impl Extension {
    /// Creates an extension.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A user-defined enum type with ordered labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumType {
    /// Type name.
    pub name: String,
    /// Ordered labels.
    pub labels: Vec<String>,
}

impl EnumType {
    /// Creates an enum type.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }
}

/// Any object the compiler orders, diffs and renders.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaObject {
    /// Extension.
    Extension(Extension),
    /// Enum type.
    Enum(EnumType),
    /// Function.
    Function(Function),
    /// Table with its columns and inline constraints.
    Table(Table),
    /// Foreign key constraint.
    Constraint(TableConstraint),
    /// Index.
    Index(Index),
    /// Trigger.
    Trigger(Trigger),
}

impl SchemaObject {
    /// Kind of the object.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::Extension(_) => ObjectKind::Extension,
            Self::Enum(_) => ObjectKind::Enum,
            Self::Function(_) => ObjectKind::Function,
            Self::Table(_) => ObjectKind::Table,
            Self::Constraint(_) => ObjectKind::Constraint,
            Self::Index(_) => ObjectKind::Index,
            Self::Trigger(_) => ObjectKind::Trigger,
        }
    }

    /// Unique identity of the object.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Extension(e) => ObjectId::new(ObjectKind::Extension, &e.name),
            Self::Enum(e) => ObjectId::new(ObjectKind::Enum, &e.name),
            Self::Function(f) => ObjectId::new(ObjectKind::Function, &f.name),
            Self::Table(t) => ObjectId::table(&t.name),
            Self::Constraint(c) => {
                ObjectId::scoped(ObjectKind::Constraint, &c.table, &c.constraint.name)
            }
            Self::Index(i) => ObjectId::new(ObjectKind::Index, &i.name),
            Self::Trigger(t) => ObjectId::scoped(ObjectKind::Trigger, &t.table, &t.name),
        }
    }

    /// The table a table-bound object belongs to.
    #[must_use]
    pub fn owning_table(&self) -> Option<&str> {
        match self {
            Self::Constraint(c) => Some(&c.table),
            Self::Index(i) => Some(&i.table),
            Self::Trigger(t) => Some(&t.table),
            _ => None,
        }
    }
}

impl From<Extension> for SchemaObject {
    fn from(value: Extension) -> Self {
        Self::Extension(value)
    }
}

impl From<EnumType> for SchemaObject {
    fn from(value: EnumType) -> Self {
        Self::Enum(value)
    }
}

impl From<Function> for SchemaObject {
    fn from(value: Function) -> Self {
        Self::Function(value)
    }
}

impl From<Table> for SchemaObject {
    fn from(value: Table) -> Self {
        Self::Table(value)
    }
}

impl From<TableConstraint> for SchemaObject {
    fn from(value: TableConstraint) -> Self {
        Self::Constraint(value)
    }
}

impl From<Index> for SchemaObject {
    fn from(value: Index) -> Self {
        Self::Index(value)
    }
}

impl From<Trigger> for SchemaObject {
    fn from(value: Trigger) -> Self {
        Self::Trigger(value)
    }
}
