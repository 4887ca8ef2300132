//! Structural diff between a declared and a live schema.
//!
//! The differ walks the union of both graphs and decides, per object,
//! whether it is created, dropped, altered in place or recreated. Every
//! resulting operation becomes a node of an operation graph whose edges
//! encode what each statement needs to exist (or to be gone) first; the
//! graph is then sorted with the same deterministic topological sort used
//! for plain creation order. Removals are preferred before additions and,
//! within each phase, objects keep their dependency order.

mod apply;
mod canonical;
mod changeset;
mod rename;
mod table;

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

pub use changeset::{AlterChange, ChangeSet, LabelPosition, Operation, RenameCandidate};
pub use rename::{ColumnRenameHint, ParseHintError, RenameHint};

use crate::error::{CompileError, Result};
use crate::graph::SchemaGraph;
use crate::model::{EnumType, ObjectId, ObjectKind, SchemaObject, TableConstraint};
use crate::resolver::{order_ids, toposort, Direction};

/// Knobs for [`diff_with`].
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Confirmed object renames, applied before diffing.
    pub renames: Vec<RenameHint>,
    /// Confirmed column renames, applied after object renames.
    pub column_renames: Vec<ColumnRenameHint>,
    /// Emit type changes that may lose data instead of failing.
    pub allow_lossy_type_changes: bool,
    /// Extensions that are never created or dropped.
    pub ignored_extensions: BTreeSet<String>,
    /// Minimum name similarity for a column rename candidate.
    pub column_rename_threshold: f64,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            renames: Vec::new(),
            column_renames: Vec::new(),
            allow_lossy_type_changes: false,
            ignored_extensions: BTreeSet::from(["plpgsql".to_string()]),
            column_rename_threshold: 0.4,
        }
    }
}

impl DiffOptions {
    /// Adds a confirmed object rename.
    #[must_use]
    pub fn rename(mut self, hint: RenameHint) -> Self {
        self.renames.push(hint);
        self
    }

    /// Adds a confirmed column rename.
    #[must_use]
    pub fn rename_column(mut self, hint: ColumnRenameHint) -> Self {
        self.column_renames.push(hint);
        self
    }

    /// Allows type changes that may lose data.
    #[must_use]
    pub const fn allow_lossy_type_changes(mut self, allow: bool) -> Self {
        self.allow_lossy_type_changes = allow;
        self
    }

    /// Never creates or drops extension `name`.
    #[must_use]
    pub fn ignore_extension(mut self, name: impl Into<String>) -> Self {
        self.ignored_extensions.insert(name.into());
        self
    }
}

/// Computes the operations that move `live` to `declared` with default
/// options.
///
/// # Errors
///
/// See [`diff_with`].
pub fn diff(declared: &SchemaGraph, live: &SchemaGraph) -> Result<ChangeSet> {
    diff_with(declared, live, &DiffOptions::default())
}

/// Computes the smallest ordered set of operations that moves `live` to
/// `declared`.
///
/// Applying the result and introspecting again yields an empty change set.
/// Objects whose canonical forms are equal produce no operation.
///
/// # Errors
///
/// - [`CompileError::UnsupportedChange`] for changes without a safe
///   translation: removed or reordered enum labels, lossy type changes
///   (unless allowed) and recreations that would take a table with them.
/// - [`CompileError::UnknownReference`] or [`CompileError::DuplicateName`]
///   for rename hints that do not match both schemas.
/// - [`CompileError::CyclicDependency`] if either graph, or the operations
///   between them, cannot be ordered.
pub fn diff_with(
    declared: &SchemaGraph,
    live: &SchemaGraph,
    options: &DiffOptions,
) -> Result<ChangeSet> {
    let declared = without_ignored(declared, options);
    let live = without_ignored(live, options);
    let (live, renames) = rename::apply_hints(&live, &declared, options)?;

    let mut planner = Planner::new(&declared, &live, options)?;
    planner.classify()?;
    planner.propagate()?;
    planner.plan(renames)?;
    let changes = planner.finish()?;

    info!(
        operations = changes.len(),
        destructive = changes.destructive_operations().len(),
        rename_candidates = changes.rename_candidates.len(),
        "computed schema diff"
    );
    Ok(changes)
}

fn without_ignored(graph: &SchemaGraph, options: &DiffOptions) -> SchemaGraph {
    let mut graph = graph.clone();
    graph.retain(|object| match object {
        SchemaObject::Extension(e) => !options.ignored_extensions.contains(&e.name),
        _ => true,
    });
    graph
}

/// How one object present on both sides changes.
enum Change {
    /// Drop the live object and create the declared one.
    Recreate,
    /// Alter in place. Either list may be empty.
    Alter {
        removals: Vec<AlterChange>,
        additions: Vec<AlterChange>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Remove,
    Add,
}

/// Sort key of a planned operation: phase, dependency position of its
/// subject, then insertion sequence.
type Key = (u8, usize, usize);

struct Step {
    op: Operation,
    subject: ObjectId,
    role: Role,
}

struct Planner<'a> {
    declared: &'a SchemaGraph,
    live: &'a SchemaGraph,
    options: &'a DiffOptions,
    creation: BTreeMap<ObjectId, usize>,
    deletion: BTreeMap<ObjectId, usize>,
    changes: BTreeMap<ObjectId, Change>,
    keys_dropped: BTreeSet<String>,
    candidates: Vec<RenameCandidate>,
    steps: Vec<(Key, Step)>,
}

impl<'a> Planner<'a> {
    fn new(
        declared: &'a SchemaGraph,
        live: &'a SchemaGraph,
        options: &'a DiffOptions,
    ) -> Result<Self> {
        let positions = |ids: Vec<ObjectId>| -> BTreeMap<ObjectId, usize> {
            ids.into_iter().enumerate().map(|(i, id)| (id, i)).collect()
        };
        Ok(Self {
            declared,
            live,
            options,
            creation: positions(order_ids(declared, Direction::Creation)?),
            deletion: positions(order_ids(live, Direction::Deletion)?),
            changes: BTreeMap::new(),
            keys_dropped: BTreeSet::new(),
            candidates: Vec::new(),
            steps: Vec::new(),
        })
    }

    /// Decides how every object present on both sides changes.
    fn classify(&mut self) -> Result<()> {
        let (declared, live) = (self.declared, self.live);
        for (id, node) in declared.nodes() {
            let Some(existing) = live.get(id) else {
                continue;
            };
            let change = match (&node.object, existing) {
                (SchemaObject::Extension(_), _) => None,
                (SchemaObject::Enum(declared), SchemaObject::Enum(live)) => {
                    diff_enum(id, declared, live)?
                }
                (SchemaObject::Function(declared), SchemaObject::Function(live)) => {
                    if canonical::signature(declared) != canonical::signature(live) {
                        Some(Change::Recreate)
                    } else if canonical::equivalent(&node.object, existing) {
                        None
                    } else {
                        Some(Change::Alter {
                            removals: Vec::new(),
                            additions: vec![AlterChange::ReplaceFunction(declared.clone())],
                        })
                    }
                }
                (SchemaObject::Table(declared), SchemaObject::Table(live)) => {
                    let diff = table::diff_table(declared, live, self.options)?;
                    if diff.dropped_keys {
                        self.keys_dropped.insert(declared.name.clone());
                    }
                    self.candidates.extend(diff.rename_candidates);
                    if diff.removals.is_empty() && diff.additions.is_empty() {
                        None
                    } else {
                        Some(Change::Alter {
                            removals: diff.removals,
                            additions: diff.additions,
                        })
                    }
                }
                (declared, live) => {
                    if canonical::equivalent(declared, live) {
                        None
                    } else {
                        Some(Change::Recreate)
                    }
                }
            };
            if let Some(change) = change {
                self.changes.insert(id.clone(), change);
            }
        }
        Ok(())
    }

    /// Recreates whatever a recreated object or a dropped key takes with it.
    fn propagate(&mut self) -> Result<()> {
        let live = self.live;
        let mut pending: Vec<ObjectId> = self
            .changes
            .iter()
            .filter(|(_, change)| matches!(change, Change::Recreate))
            .map(|(id, _)| id.clone())
            .collect();

        for table in std::mem::take(&mut self.keys_dropped) {
            let cause = ObjectId::table(&table);
            for object in live.objects() {
                let references = match object {
                    SchemaObject::Constraint(c) => c
                        .constraint
                        .foreign_key()
                        .is_some_and(|fk| fk.references_table == table),
                    _ => false,
                };
                if references && self.mark_recreated(&object.id(), &cause)? {
                    pending.push(object.id());
                }
            }
        }

        while let Some(id) = pending.pop() {
            for dependent in live.dependents(&id) {
                if self.mark_recreated(dependent, &id)? {
                    pending.push(dependent.clone());
                }
            }
        }
        Ok(())
    }

    /// Marks a still-declared `id` for recreation because `cause` is
    /// recreated. Returns `true` if it was newly marked.
    fn mark_recreated(&mut self, id: &ObjectId, cause: &ObjectId) -> Result<bool> {
        if !self.declared.contains(id) || matches!(self.changes.get(id), Some(Change::Recreate)) {
            return Ok(false);
        }
        if id.kind == ObjectKind::Table {
            return Err(CompileError::unsupported(
                id.to_string(),
                format!("depends on {cause}, which must be recreated"),
            ));
        }
        debug!(object = %id, %cause, "recreating dependent");
        self.changes.insert(id.clone(), Change::Recreate);
        Ok(true)
    }

    /// Turns every decision into planned operations.
    fn plan(&mut self, renames: Vec<Operation>) -> Result<()> {
        for op in renames {
            let subject = op.target();
            self.push(0, 0, Step { op, subject, role: Role::Remove });
        }

        let (live, declared) = (self.live, self.declared);
        let live_only: Vec<&SchemaObject> = live
            .objects()
            .filter(|o| !declared.contains(&o.id()))
            .collect();
        let declared_only: Vec<&SchemaObject> = declared
            .objects()
            .filter(|o| !live.contains(&o.id()))
            .collect();
        self.candidates
            .extend(rename::object_candidates(&live_only, &declared_only));

        for object in live_only {
            self.remove(object);
        }
        for object in declared_only {
            self.add(object);
        }

        let changes = std::mem::take(&mut self.changes);
        for (id, change) in changes {
            match change {
                Change::Recreate => {
                    if let (Some(old), Some(new)) = (live.get(&id), declared.get(&id)) {
                        self.remove(old);
                        self.add(new);
                    }
                }
                Change::Alter {
                    removals,
                    additions,
                } => {
                    if !removals.is_empty() {
                        let position = self.deletion.get(&id).copied().unwrap_or_default();
                        self.push(1, position, Step {
                            op: Operation::Alter { target: id.clone(), changes: removals },
                            subject: id.clone(),
                            role: Role::Remove,
                        });
                    }
                    if !additions.is_empty() {
                        let position = self.creation.get(&id).copied().unwrap_or_default();
                        self.push(2, position, Step {
                            op: Operation::Alter { target: id.clone(), changes: additions },
                            subject: id,
                            role: Role::Add,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, phase: u8, position: usize, step: Step) {
        let key = (phase, position, self.steps.len());
        debug!(op = %step.op, ?key, "planned operation");
        self.steps.push((key, step));
    }

    fn remove(&mut self, object: &SchemaObject) {
        let subject = object.id();
        let position = self.deletion.get(&subject).copied().unwrap_or_default();
        let op = match object {
            SchemaObject::Constraint(TableConstraint { table, constraint }) => Operation::Alter {
                target: ObjectId::table(table),
                changes: vec![AlterChange::DropConstraint(constraint.clone())],
            },
            other => Operation::Drop(other.clone()),
        };
        self.push(1, position, Step { op, subject, role: Role::Remove });
    }

    fn add(&mut self, object: &SchemaObject) {
        let subject = object.id();
        let position = self.creation.get(&subject).copied().unwrap_or_default();
        let op = match object {
            SchemaObject::Constraint(TableConstraint { table, constraint }) => Operation::Alter {
                target: ObjectId::table(table),
                changes: vec![AlterChange::AddConstraint(constraint.clone())],
            },
            other => Operation::Create(other.clone()),
        };
        self.push(2, position, Step { op, subject, role: Role::Add });
    }

    /// Orders the planned operations.
    fn finish(self) -> Result<ChangeSet> {
        let mut removes: BTreeMap<&ObjectId, Key> = BTreeMap::new();
        let mut adds: BTreeMap<&ObjectId, Key> = BTreeMap::new();
        for (key, step) in &self.steps {
            if key.0 == 0 {
                continue;
            }
            match step.role {
                Role::Remove => removes.insert(&step.subject, *key),
                Role::Add => adds.insert(&step.subject, *key),
            };
        }

        let empty = BTreeSet::new();
        let mut prerequisites: BTreeMap<Key, BTreeSet<Key>> =
            self.steps.iter().map(|(key, _)| (*key, BTreeSet::new())).collect();

        for (key, step) in &self.steps {
            if key.0 == 0 {
                continue;
            }
            let subject = &step.subject;
            let declared_deps = self.declared.depends_on(subject).unwrap_or(&empty);
            let live_deps = self.live.depends_on(subject).unwrap_or(&empty);

            match step.role {
                Role::Add => {
                    let before = prerequisites.entry(*key).or_default();
                    before.extend(declared_deps.iter().filter_map(|dep| adds.get(dep)));
                    before.extend(removes.get(subject));

                    // An altered table that stops using an object dropped
                    // entirely must change before that object goes away.
                    if subject.kind == ObjectKind::Table {
                        for released in live_deps.difference(declared_deps) {
                            if self.declared.contains(released) {
                                continue;
                            }
                            if let Some(remove) = removes.get(released) {
                                prerequisites.entry(*remove).or_default().insert(*key);
                            }
                        }
                    }
                }
                Role::Remove => {
                    for dep in live_deps {
                        if let Some(remove) = removes.get(dep) {
                            prerequisites.entry(*remove).or_default().insert(*key);
                        }
                    }
                }
            }
        }

        let order = toposort(&prerequisites).map_err(|cycle| CompileError::CyclicDependency {
            cycle: cycle
                .iter()
                .map(|key| self.steps[key.2].1.op.to_string())
                .collect(),
        })?;

        let mut steps: Vec<Option<Step>> = self.steps.into_iter().map(|(_, s)| Some(s)).collect();
        let operations = order
            .iter()
            .filter_map(|key| steps[key.2].take())
            .map(|step| step.op)
            .collect();

        Ok(ChangeSet {
            operations,
            rename_candidates: self.candidates,
        })
    }
}

/// New labels may only be inserted; the live labels must keep their order.
fn diff_enum(id: &ObjectId, declared: &EnumType, live: &EnumType) -> Result<Option<Change>> {
    let mut existing = live.labels.iter().peekable();
    for label in &declared.labels {
        if existing.peek() == Some(&label) {
            existing.next();
        }
    }
    if existing.peek().is_some() {
        return Err(CompileError::unsupported(
            id.to_string(),
            "enum labels can only be added, not removed or reordered",
        ));
    }

    let mut additions = Vec::new();
    for (i, label) in declared.labels.iter().enumerate() {
        if live.labels.contains(label) {
            continue;
        }
        let position = if i > 0 {
            LabelPosition::After(declared.labels[i - 1].clone())
        } else if let Some(first) = live.labels.first() {
            LabelPosition::Before(first.clone())
        } else {
            LabelPosition::End
        };
        additions.push(AlterChange::AddEnumLabel {
            label: label.clone(),
            position,
        });
    }

    Ok((!additions.is_empty()).then_some(Change::Alter {
        removals: Vec::new(),
        additions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        text, uuid, EnumType, Extension, ForeignKeyRef, FunctionBuilder, IndexBuilder,
        TableBuilder, TriggerBuilder, TriggerEvent,
    };
    use crate::registry::register;

    fn summary(changes: &ChangeSet) -> Vec<String> {
        changes.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn identical_graphs_produce_nothing() {
        let graph = register([
            Extension::new("pg_trgm").into(),
            TableBuilder::new("person")
                .column(uuid("id").primary_key())
                .column(text("name"))
                .index(IndexBuilder::unnamed().columns(["name"]))
                .build()
                .into(),
        ])
        .unwrap();
        assert!(diff(&graph, &graph).unwrap().is_empty());
    }

    #[test]
    fn plpgsql_is_ignored() {
        let declared = SchemaGraph::new();
        let live = register([Extension::new("plpgsql").into()]).unwrap();
        assert!(diff(&declared, &live).unwrap().is_empty());
    }

    #[test]
    fn enum_labels_are_inserted_in_place() {
        let live = register([EnumType::new("status", ["active", "deleted"]).into()]).unwrap();
        let declared = register([EnumType::new(
            "status",
            ["new", "active", "archived", "deleted"],
        )
        .into()])
        .unwrap();
        let changes = diff(&declared, &live).unwrap();
        let Operation::Alter { changes: alters, .. } = &changes.operations[0] else {
            panic!("expected alter");
        };
        assert_eq!(
            alters,
            &[
                AlterChange::AddEnumLabel {
                    label: "new".into(),
                    position: LabelPosition::Before("active".into()),
                },
                AlterChange::AddEnumLabel {
                    label: "archived".into(),
                    position: LabelPosition::After("active".into()),
                },
            ]
        );
    }

    #[test]
    fn removing_an_enum_label_is_unsupported() {
        let live = register([EnumType::new("status", ["a", "b"]).into()]).unwrap();
        let declared = register([EnumType::new("status", ["b", "a"]).into()]).unwrap();
        let err = diff(&declared, &live).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedChangeError");
    }

    #[test]
    fn function_signature_change_recreates_trigger() {
        let table = |function: &str| {
            TableBuilder::new("asset")
                .column(uuid("id"))
                .trigger(TriggerBuilder::new("asset_audit", function).on(TriggerEvent::Delete))
                .build()
        };
        let live = register([
            FunctionBuilder::new("audit").returns("trigger").build().into(),
            table("audit").into(),
        ])
        .unwrap();
        let declared = register([
            FunctionBuilder::new("audit")
                .arguments("reason text")
                .returns("trigger")
                .build()
                .into(),
            table("audit").into(),
        ])
        .unwrap();

        let changes = diff(&declared, &live).unwrap();
        assert_eq!(
            summary(&changes),
            [
                "Drop trigger asset.asset_audit",
                "Drop function audit",
                "Create function audit",
                "Create trigger asset.asset_audit",
            ]
        );
    }

    #[test]
    fn body_change_replaces_in_place() {
        let live = register([FunctionBuilder::new("f").body("SELECT 1").build().into()]).unwrap();
        let declared =
            register([FunctionBuilder::new("f").body("SELECT 2").build().into()]).unwrap();
        let changes = diff(&declared, &live).unwrap();
        assert_eq!(summary(&changes), ["Alter function f: replace body"]);
    }

    #[test]
    fn dropped_key_recreates_referencing_foreign_keys() {
        let users = |key: &[&str]| {
            TableBuilder::new("users")
                .column(uuid("id"))
                .column(text("email"))
                .primary_key(key.iter().copied())
                .build()
        };
        let album = TableBuilder::new("album")
            .column(uuid("ownerId"))
            .constraint(crate::model::Constraint::new(
                "album_owner_fk",
                crate::model::ConstraintKind::ForeignKey(ForeignKeyRef::new(
                    vec!["ownerId".into()],
                    "users",
                    vec!["id".into()],
                )),
            ))
            .build();
        let live = register([users(&["id"]).into(), album.clone().into()]).unwrap();
        let declared = register([users(&["id", "email"]).into(), album.into()]).unwrap();

        let ops = summary(&diff(&declared, &live).unwrap());
        let position = |prefix: &str| {
            ops.iter()
                .position(|op| op.starts_with(prefix))
                .unwrap_or_else(|| panic!("missing {prefix} in {ops:?}"))
        };
        let drop_fk = position("Alter table album: drop foreign key");
        let drop_pk = position("Alter table users: drop primary key");
        let add_pk = position("Alter table users: add primary key");
        let add_fk = position("Alter table album: add foreign key");
        assert!(drop_fk < drop_pk && drop_pk < add_pk && add_pk < add_fk, "{ops:?}");
    }

    #[test]
    fn recreating_a_function_used_by_a_table_is_unsupported() {
        let table = TableBuilder::new("t")
            .column(text("id").default_expr("make_id()"))
            .build();
        let live = register([
            FunctionBuilder::new("make_id").returns("text").build().into(),
            table.clone().into(),
        ])
        .unwrap();
        let declared = register([
            FunctionBuilder::new("make_id").returns("uuid").build().into(),
            table.into(),
        ])
        .unwrap();
        let err = diff(&declared, &live).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedChangeError");
    }
}
