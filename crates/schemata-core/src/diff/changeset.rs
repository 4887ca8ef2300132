//! Operations produced by the differ.

use std::fmt;

use crate::model::{
    Column, Constraint, DataType, DefaultValue, Function, ObjectId, ObjectKind, SchemaObject,
};

/// Where a new enum label goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelPosition {
    /// `BEFORE 'label'`
    Before(String),
    /// `AFTER 'label'`
    After(String),
    /// Appended at the end.
    End,
}

/// One structural change inside an [`Operation::Alter`].
///
/// Every change renders as exactly one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterChange {
    /// Add a column.
    AddColumn(Column),
    /// Drop a column. Carries the dropped definition.
    DropColumn(Column),
    /// Rename a column.
    RenameColumn {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Change a column type.
    AlterColumnType {
        /// Column name.
        column: String,
        /// Live type.
        from: DataType,
        /// Declared type.
        to: DataType,
    },
    /// Set or drop NOT NULL.
    SetNullable {
        /// Column name.
        column: String,
        /// Whether the column accepts NULL afterwards.
        nullable: bool,
    },
    /// Set or drop a column default.
    SetDefault {
        /// Column name.
        column: String,
        /// New default; `None` drops it.
        default: Option<DefaultValue>,
    },
    /// Set or clear a column comment.
    SetColumnComment {
        /// Column name.
        column: String,
        /// New comment; `None` clears it.
        comment: Option<String>,
    },
    /// Add a constraint (including foreign keys).
    AddConstraint(Constraint),
    /// Drop a constraint (including foreign keys).
    DropConstraint(Constraint),
    /// Set or clear the table comment.
    SetComment(Option<String>),
    /// Add an enum label.
    AddEnumLabel {
        /// New label.
        label: String,
        /// Where it goes.
        position: LabelPosition,
    },
    /// Replace a function body in place (same signature).
    ReplaceFunction(Function),
}

impl AlterChange {
    /// Returns `true` if the change can lose data or break existing
    /// references by name.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        match self {
            Self::DropColumn(_) | Self::RenameColumn { .. } => true,
            Self::AlterColumnType { from, to, .. } => !from.converts_losslessly_to(to),
            _ => false,
        }
    }
}

impl fmt::Display for AlterChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddColumn(c) => write!(f, "add column {}", c.name),
            Self::DropColumn(c) => write!(f, "drop column {}", c.name),
            Self::RenameColumn { from, to } => write!(f, "rename column {from} to {to}"),
            Self::AlterColumnType { column, from, to } => {
                write!(f, "alter column {column} type {from} -> {to}")
            }
            Self::SetNullable { column, nullable } => {
                if *nullable {
                    write!(f, "drop not null on {column}")
                } else {
                    write!(f, "set not null on {column}")
                }
            }
            Self::SetDefault { column, default } => match default {
                Some(d) => write!(f, "set default {} on {column}", d.to_sql()),
                None => write!(f, "drop default on {column}"),
            },
            Self::SetColumnComment { column, .. } => write!(f, "comment on column {column}"),
            Self::AddConstraint(c) => write!(f, "add {} constraint {}", c.kind.label(), c.name),
            Self::DropConstraint(c) => {
                write!(f, "drop {} constraint {}", c.kind.label(), c.name)
            }
            Self::SetComment(_) => f.write_str("comment on table"),
            Self::AddEnumLabel { label, .. } => write!(f, "add value {label}"),
            Self::ReplaceFunction(_) => f.write_str("replace body"),
        }
    }
}

/// A single migration step.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create an object.
    Create(SchemaObject),
    /// Drop an object. Carries the live definition.
    Drop(SchemaObject),
    /// Change an existing object in place.
    Alter {
        /// The altered object.
        target: ObjectId,
        /// Structural changes, applied in order.
        changes: Vec<AlterChange>,
    },
    /// Rename an object.
    Rename {
        /// Current identity.
        from: ObjectId,
        /// New identity.
        to: ObjectId,
    },
}

impl Operation {
    /// Returns `true` for drops, renames and alterations that drop or
    /// rename columns or narrow their type.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        match self {
            Self::Drop(_) | Self::Rename { .. } => true,
            Self::Alter { changes, .. } => changes.iter().any(AlterChange::is_destructive),
            Self::Create(_) => false,
        }
    }

    /// The object the operation applies to.
    #[must_use]
    pub fn target(&self) -> ObjectId {
        match self {
            Self::Create(o) | Self::Drop(o) => o.id(),
            Self::Alter { target, .. } => target.clone(),
            Self::Rename { from, .. } => from.clone(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create(o) => write!(f, "Create {}", o.id()),
            Self::Drop(o) => write!(f, "Drop {}", o.id()),
            Self::Alter { target, changes } => {
                write!(f, "Alter {target}: ")?;
                for (i, change) in changes.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{change}")?;
                }
                Ok(())
            }
            Self::Rename { from, to } => write!(f, "Rename {from} to {}", to.name),
        }
    }
}

/// A dropped and a created object that look like the same object under a
/// new name. Surfaced for review, never applied automatically.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameCandidate {
    /// Kind of object (tables for column candidates).
    pub kind: ObjectKind,
    /// Table holding the columns, for column candidates.
    pub table: Option<String>,
    /// Name that disappears.
    pub from: String,
    /// Name that appears.
    pub to: String,
    /// Name similarity in `[0.0, 1.0]`.
    pub similarity: f64,
}

impl fmt::Display for RenameCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(
                f,
                "column {table}.{} -> {} (similarity {:.2})",
                self.from, self.to, self.similarity
            ),
            None => write!(
                f,
                "{} {} -> {} (similarity {:.2})",
                self.kind, self.from, self.to, self.similarity
            ),
        }
    }
}

/// Ordered operations that move a live schema to the declared one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Operations in a dependency-safe order.
    pub operations: Vec<Operation>,
    /// Possible renames detected but not applied.
    pub rename_candidates: Vec<RenameCandidate>,
}

impl ChangeSet {
    /// Returns `true` if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Iterates over the operations.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    /// Operations that can lose data.
    #[must_use]
    pub fn destructive_operations(&self) -> Vec<&Operation> {
        self.operations.iter().filter(|op| op.is_destructive()).collect()
    }

    /// Returns `true` if any operation can lose data.
    #[must_use]
    pub fn has_destructive(&self) -> bool {
        self.operations.iter().any(Operation::is_destructive)
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConstraintKind, Extension, ForeignKeyRef, Table};

    #[test]
    fn summaries_read_naturally() {
        let op = Operation::Alter {
            target: ObjectId::table("album"),
            changes: vec![AlterChange::AddConstraint(Constraint::new(
                "album_owner_fk",
                ConstraintKind::ForeignKey(ForeignKeyRef::new(
                    vec!["ownerId".into()],
                    "user",
                    vec!["id".into()],
                )),
            ))],
        };
        assert_eq!(
            op.to_string(),
            "Alter table album: add foreign key constraint album_owner_fk"
        );
        assert_eq!(
            Operation::Create(Extension::new("pg_trgm").into()).to_string(),
            "Create extension pg_trgm"
        );
        assert_eq!(
            Operation::Rename {
                from: ObjectId::table("albums"),
                to: ObjectId::table("album"),
            }
            .to_string(),
            "Rename table albums to album"
        );
    }

    #[test]
    fn destructive_operations_are_flagged() {
        assert!(Operation::Drop(Table::new("legacy").into()).is_destructive());
        assert!(!Operation::Create(Table::new("legacy").into()).is_destructive());
        let narrowing = Operation::Alter {
            target: ObjectId::table("t"),
            changes: vec![AlterChange::AlterColumnType {
                column: "n".into(),
                from: DataType::BigInt,
                to: DataType::Integer,
            }],
        };
        assert!(narrowing.is_destructive());
        let widening = Operation::Alter {
            target: ObjectId::table("t"),
            changes: vec![AlterChange::AlterColumnType {
                column: "n".into(),
                from: DataType::Integer,
                to: DataType::BigInt,
            }],
        };
        assert!(!widening.is_destructive());
        assert!(Operation::Rename {
            from: ObjectId::new(ObjectKind::Enum, "a"),
            to: ObjectId::new(ObjectKind::Enum, "b"),
        }
        .is_destructive());
    }
}
