//! Applies a change set to a graph without touching a database.

use tracing::trace;

use super::changeset::{AlterChange, ChangeSet, LabelPosition, Operation};
use super::rename::{rename_column, rename_object};
use crate::error::{CompileError, Result};
use crate::graph::SchemaGraph;
use crate::model::{ConstraintKind, ObjectId, ObjectKind, SchemaObject, Table, TableConstraint};
use crate::registry::register;

impl ChangeSet {
    /// Returns the graph that results from running every operation against
    /// `graph`, in order.
    ///
    /// Diffing the declared graph against the result yields an empty change
    /// set, which makes this the offline check for a generated migration.
    ///
    /// # Errors
    ///
    /// Fails like [`register`] would on the resulting objects, or with
    /// [`CompileError::UnknownReference`] / [`CompileError::DuplicateName`]
    /// if an operation does not fit `graph`.
    pub fn apply_to(&self, graph: &SchemaGraph) -> Result<SchemaGraph> {
        let mut objects = graph.clone().into_objects();
        for op in &self.operations {
            trace!(%op, "simulating operation");
            apply(&mut objects, op)?;
        }
        register(objects)
    }
}

fn position_of(objects: &[SchemaObject], id: &ObjectId) -> Option<usize> {
    objects.iter().position(|o| o.id() == *id)
}

fn column_index(table: &Table, name: &str) -> Option<usize> {
    table.columns.iter().position(|c| c.name == name)
}

fn apply(objects: &mut Vec<SchemaObject>, op: &Operation) -> Result<()> {
    match op {
        Operation::Create(object) => {
            let id = object.id();
            if position_of(objects, &id).is_some() {
                return Err(CompileError::duplicate(id.kind.as_str(), id.name));
            }
            objects.push(object.clone());
        }
        Operation::Drop(object) => {
            let id = object.id();
            let Some(pos) = position_of(objects, &id) else {
                return Err(CompileError::unknown("drop", id.kind.as_str(), id.name));
            };
            objects.remove(pos);
        }
        Operation::Rename { from, to } => rename_object(objects, from, to)?,
        Operation::Alter { target, changes } => {
            for change in changes {
                alter(objects, target, change)?;
            }
        }
    }
    Ok(())
}

fn alter(objects: &mut Vec<SchemaObject>, target: &ObjectId, change: &AlterChange) -> Result<()> {
    let missing = || CompileError::unknown("alter", target.kind.as_str(), target.name.clone());

    // Foreign keys live in nodes of their own.
    match change {
        AlterChange::AddConstraint(c) if matches!(c.kind, ConstraintKind::ForeignKey(_)) => {
            objects.push(SchemaObject::Constraint(TableConstraint {
                table: target.name.clone(),
                constraint: c.clone(),
            }));
            return Ok(());
        }
        AlterChange::DropConstraint(c) if matches!(c.kind, ConstraintKind::ForeignKey(_)) => {
            let id = ObjectId::scoped(ObjectKind::Constraint, &target.name, &c.name);
            let pos = position_of(objects, &id).ok_or_else(missing)?;
            objects.remove(pos);
            return Ok(());
        }
        AlterChange::RenameColumn { from, to } => {
            return rename_column(objects, &target.name, from, to);
        }
        _ => {}
    }

    let pos = position_of(objects, target).ok_or_else(missing)?;
    match (&mut objects[pos], change) {
        (SchemaObject::Enum(e), AlterChange::AddEnumLabel { label, position }) => {
            let index = match position {
                LabelPosition::Before(other) => e.labels.iter().position(|l| l == other),
                LabelPosition::After(other) => {
                    e.labels.iter().position(|l| l == other).map(|i| i + 1)
                }
                LabelPosition::End => Some(e.labels.len()),
            };
            let index = index.ok_or_else(missing)?;
            e.labels.insert(index, label.clone());
        }
        (SchemaObject::Function(f), AlterChange::ReplaceFunction(new)) => *f = new.clone(),
        (SchemaObject::Table(t), change) => {
            match change {
                AlterChange::AddColumn(c) => t.columns.push(c.clone()),
                AlterChange::DropColumn(c) => {
                    let i = column_index(t, &c.name).ok_or_else(missing)?;
                    t.columns.remove(i);
                }
                AlterChange::AlterColumnType { column: name, to, .. } => {
                    let i = column_index(t, name).ok_or_else(missing)?;
                    t.columns[i].data_type = to.clone();
                }
                AlterChange::SetNullable { column: name, nullable } => {
                    let i = column_index(t, name).ok_or_else(missing)?;
                    t.columns[i].nullable = *nullable;
                }
                AlterChange::SetDefault { column: name, default } => {
                    let i = column_index(t, name).ok_or_else(missing)?;
                    t.columns[i].default.clone_from(default);
                }
                AlterChange::SetColumnComment { column: name, comment } => {
                    let i = column_index(t, name).ok_or_else(missing)?;
                    t.columns[i].comment.clone_from(comment);
                }
                AlterChange::AddConstraint(c) => t.constraints.push(c.clone()),
                AlterChange::DropConstraint(c) => t.constraints.retain(|k| k.name != c.name),
                AlterChange::SetComment(comment) => t.comment.clone_from(comment),
                _ => return Err(missing()),
            }
        }
        _ => return Err(missing()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::model::{
        bigint, integer, text, uuid, EnumType, Extension, FunctionBuilder, IndexBuilder,
        TableBuilder,
    };

    #[test]
    fn applying_the_diff_reaches_the_declared_graph() {
        let live = register([
            EnumType::new("status", ["active"]).into(),
            TableBuilder::new("person")
                .column(uuid("id").primary_key())
                .column(integer("age"))
                .column(text("legacy"))
                .build()
                .into(),
            TableBuilder::new("old").column(uuid("id")).build().into(),
        ])
        .unwrap();
        let declared = register([
            Extension::new("pg_trgm").into(),
            EnumType::new("status", ["active", "deleted"]).into(),
            FunctionBuilder::new("touch").returns("trigger").build().into(),
            TableBuilder::new("person")
                .column(uuid("id").primary_key())
                .column(bigint("age").not_null())
                .column(text("name").references("other", "name"))
                .index(IndexBuilder::unnamed().columns(["name"]))
                .comment("People")
                .build()
                .into(),
            TableBuilder::new("other")
                .column(text("name").unique())
                .build()
                .into(),
        ])
        .unwrap();

        let changes = diff(&declared, &live).unwrap();
        let applied = changes.apply_to(&live).unwrap();
        assert_eq!(applied, declared);
        assert!(diff(&declared, &applied).unwrap().is_empty());
    }

    #[test]
    fn dropping_a_missing_object_fails() {
        let changes = ChangeSet {
            operations: vec![Operation::Drop(Extension::new("x").into())],
            rename_candidates: Vec::new(),
        };
        let err = changes.apply_to(&SchemaGraph::new()).unwrap_err();
        assert_eq!(err.kind(), "UnknownReferenceError");
    }
}
