//! Rename detection and confirmed renames.
//!
//! Detection is conservative: an object is only reported as a possible
//! rename of another when their canonical forms match exactly except for
//! names. Columns, which rarely differ by more than name and type, are
//! paired by name similarity among same-typed dropped and added columns.
//! Nothing detected here is applied; a rename only happens when the caller
//! confirms it with a [`RenameHint`] or [`ColumnRenameHint`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::canonical::fingerprint;
use super::changeset::{AlterChange, Operation, RenameCandidate};
use super::DiffOptions;
use crate::error::{CompileError, Result};
use crate::graph::SchemaGraph;
use crate::model::{Column, ConstraintKind, DataType, ObjectId, ObjectKind, SchemaObject};
use crate::naming::{constraint_name, index_name};
use crate::registry::register;

/// A confirmed object rename.
///
/// Constraint and trigger names are qualified by their table
/// (`asset.asset_audit`); the table cannot change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameHint {
    /// Kind of the renamed object.
    pub kind: ObjectKind,
    /// Live name.
    pub from: String,
    /// Declared name.
    pub to: String,
}

impl RenameHint {
    /// Creates a hint.
    #[must_use]
    pub fn new(kind: ObjectKind, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind,
            from: from.into(),
            to: to.into(),
        }
    }

    fn from_id(&self) -> ObjectId {
        ObjectId::new(self.kind, &self.from)
    }

    fn to_id(&self) -> ObjectId {
        ObjectId::new(self.kind, &self.to)
    }
}

/// Error returned when a rename hint cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid rename '{0}': expected kind:old=new")]
pub struct ParseHintError(pub String);

impl FromStr for RenameHint {
    type Err = ParseHintError;

    /// Parses `kind:old=new`, e.g. `table:albums=album`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let err = || ParseHintError(s.to_string());
        let (kind, names) = s.split_once(':').ok_or_else(err)?;
        let kind = ObjectKind::parse(kind).ok_or_else(err)?;
        let (from, to) = names.split_once('=').ok_or_else(err)?;
        if from.is_empty() || to.is_empty() {
            return Err(err());
        }
        Ok(Self::new(kind, from, to))
    }
}

impl fmt::Display for RenameHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}={}", self.kind, self.from, self.to)
    }
}

/// A confirmed column rename. `table` is the declared table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRenameHint {
    /// Table holding the column.
    pub table: String,
    /// Live column name.
    pub from: String,
    /// Declared column name.
    pub to: String,
}

impl FromStr for ColumnRenameHint {
    type Err = ParseHintError;

    /// Parses `table.old=new`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let err = || ParseHintError(s.to_string());
        let (qualified, to) = s.split_once('=').ok_or_else(err)?;
        let (table, from) = qualified.split_once('.').ok_or_else(err)?;
        if table.is_empty() || from.is_empty() || to.is_empty() {
            return Err(err());
        }
        Ok(Self {
            table: table.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

// ================================================================
// Similarity
// ================================================================

/// Computes the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let m = a.len();
    let n = b.len();
    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];
    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

/// Returns a normalized similarity score in `[0.0, 1.0]`.
/// 1.0 means identical, 0.0 means completely different.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

// ================================================================
// Detection
// ================================================================

/// Pairs dropped and created objects with identical fingerprints.
pub(crate) fn object_candidates(
    dropped: &[&SchemaObject],
    created: &[&SchemaObject],
) -> Vec<RenameCandidate> {
    let created: Vec<(ObjectId, Option<String>)> =
        created.iter().map(|o| (o.id(), fingerprint(o))).collect();
    let mut taken = BTreeSet::new();
    let mut candidates = Vec::new();

    for old in dropped {
        let Some(print) = fingerprint(old) else {
            continue;
        };
        let old_id = old.id();
        let found = created.iter().find(|(id, other)| {
            id.kind == old_id.kind && !taken.contains(id) && other.as_ref() == Some(&print)
        });
        if let Some((new_id, _)) = found {
            taken.insert(new_id.clone());
            candidates.push(RenameCandidate {
                kind: old_id.kind,
                table: None,
                from: old_id.name.clone(),
                to: new_id.name.clone(),
                similarity: similarity(old_id.local_name(), new_id.local_name()),
            });
        }
    }
    candidates
}

/// Pairs dropped and added columns of the same type whose names are at
/// least `threshold` similar, best pairs first.
pub(crate) fn column_candidates(
    table: &str,
    dropped: &[&Column],
    added: &[&Column],
    threshold: f64,
) -> Vec<RenameCandidate> {
    let mut pairs: Vec<(f64, &Column, &Column)> = Vec::new();
    for old in dropped {
        for new in added {
            if old.data_type != new.data_type {
                continue;
            }
            let score = similarity(&old.name, &new.name);
            if score >= threshold {
                pairs.push((score, old, new));
            }
        }
    }
    pairs.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| a.1.name.cmp(&b.1.name))
            .then_with(|| a.2.name.cmp(&b.2.name))
    });

    let mut used_old = BTreeSet::new();
    let mut used_new = BTreeSet::new();
    let mut candidates = Vec::new();
    for (score, old, new) in pairs {
        if used_old.contains(&old.name) || used_new.contains(&new.name) {
            continue;
        }
        used_old.insert(&old.name);
        used_new.insert(&new.name);
        candidates.push(RenameCandidate {
            kind: ObjectKind::Table,
            table: Some(table.to_string()),
            from: old.name.clone(),
            to: new.name.clone(),
            similarity: score,
        });
    }
    candidates
}

// ================================================================
// Applying renames
// ================================================================

fn rename_enum_type(ty: &mut DataType, old: &str, new: &str) {
    match ty {
        DataType::Enum(name) if name == old => *name = new.to_string(),
        DataType::Array(inner) => rename_enum_type(inner, old, new),
        _ => {}
    }
}

/// Renames `from` to `to` in a flat object list, updating every reference.
pub(crate) fn rename_object(
    objects: &mut [SchemaObject],
    from: &ObjectId,
    to: &ObjectId,
) -> Result<()> {
    if !objects.iter().any(|o| holds(o, from)) {
        return Err(CompileError::unknown(
            format!("rename to {to}"),
            from.kind.as_str(),
            from.name.clone(),
        ));
    }
    if objects.iter().any(|o| holds(o, to)) {
        return Err(CompileError::duplicate(to.kind.as_str(), to.name.clone()));
    }

    let (old, new) = match (from.table_scope(), to.table_scope()) {
        (Some((old_table, old)), Some((new_table, new))) => {
            if old_table != new_table {
                return Err(CompileError::unsupported(
                    from.to_string(),
                    "cannot move to another table",
                ));
            }
            (old, new)
        }
        (None, None) => (from.name.as_str(), to.name.as_str()),
        _ => {
            return Err(CompileError::unsupported(
                from.to_string(),
                "malformed qualified name",
            ))
        }
    };

    let scope = from.table_scope().map(|(table, _)| table);
    for object in objects.iter_mut() {
        let is_target = object.id() == *from;
        match (from.kind, object) {
            (ObjectKind::Extension, _) => {
                return Err(CompileError::unsupported(
                    from.to_string(),
                    "extensions cannot be renamed",
                ));
            }
            (ObjectKind::Table, SchemaObject::Table(t)) if is_target => t.name = new.to_string(),
            (ObjectKind::Table, SchemaObject::Constraint(c)) => {
                if c.table == old {
                    c.table = new.to_string();
                }
                if let ConstraintKind::ForeignKey(fk) = &mut c.constraint.kind {
                    if fk.references_table == old {
                        fk.references_table = new.to_string();
                    }
                }
            }
            (ObjectKind::Table, SchemaObject::Index(i)) if i.table == old => {
                i.table = new.to_string();
            }
            (ObjectKind::Table, SchemaObject::Trigger(t)) if t.table == old => {
                t.table = new.to_string();
            }
            (ObjectKind::Enum, SchemaObject::Enum(e)) if is_target => e.name = new.to_string(),
            (ObjectKind::Enum, SchemaObject::Table(t)) => {
                for column in &mut t.columns {
                    rename_enum_type(&mut column.data_type, old, new);
                }
            }
            (ObjectKind::Function, SchemaObject::Function(f)) => {
                if is_target {
                    f.name = new.to_string();
                }
                for dep in &mut f.depends_on {
                    if dep == from {
                        *dep = to.clone();
                    }
                }
            }
            (ObjectKind::Function, SchemaObject::Trigger(t)) if t.function == old => {
                t.function = new.to_string();
            }
            (ObjectKind::Index, SchemaObject::Index(i)) if is_target => i.name = new.to_string(),
            (ObjectKind::Constraint, SchemaObject::Constraint(c)) if is_target => {
                c.constraint.name = new.to_string();
            }
            (ObjectKind::Constraint, SchemaObject::Table(t))
                if scope == Some(t.name.as_str()) =>
            {
                for constraint in t.constraints.iter_mut().filter(|c| c.name == old) {
                    constraint.name = new.to_string();
                }
            }
            (ObjectKind::Trigger, SchemaObject::Trigger(t)) if is_target => {
                t.name = new.to_string();
            }
            _ => {}
        }
    }
    Ok(())
}

/// Whether `object` is `id` or, for a table, holds the constraint `id`.
fn holds(object: &SchemaObject, id: &ObjectId) -> bool {
    if object.id() == *id {
        return true;
    }
    match (object, id.kind, id.table_scope()) {
        (SchemaObject::Table(t), ObjectKind::Constraint, Some((table, name))) => {
            t.name == table && t.constraints.iter().any(|c| c.name == name)
        }
        _ => false,
    }
}

/// Current identity and generated identity of a constraint or index.
///
/// `slot` picks a constraint inside a table.
fn generated_identity(
    object: &SchemaObject,
    slot: Option<usize>,
) -> Option<(ObjectId, ObjectId)> {
    match (object, slot) {
        (SchemaObject::Table(t), Some(slot)) => {
            let c = t.constraints.get(slot)?;
            Some((
                ObjectId::scoped(ObjectKind::Constraint, &t.name, &c.name),
                ObjectId::scoped(
                    ObjectKind::Constraint,
                    &t.name,
                    &constraint_name(&t.name, &c.kind),
                ),
            ))
        }
        (SchemaObject::Constraint(c), None) => Some((
            object.id(),
            ObjectId::scoped(
                ObjectKind::Constraint,
                &c.table,
                &constraint_name(&c.table, &c.constraint.kind),
            ),
        )),
        (SchemaObject::Index(i), None) => {
            Some((object.id(), ObjectId::new(ObjectKind::Index, index_name(i))))
        }
        _ => None,
    }
}

/// Positions of the constraints and indexes that carry generated names.
fn generated_slots(objects: &[SchemaObject]) -> Vec<(usize, Option<usize>)> {
    let mut slots = Vec::new();
    for (position, object) in objects.iter().enumerate() {
        let candidates: Vec<Option<usize>> = match object {
            SchemaObject::Table(t) => (0..t.constraints.len()).map(Some).collect(),
            SchemaObject::Constraint(_) | SchemaObject::Index(_) => vec![None],
            _ => Vec::new(),
        };
        for slot in candidates {
            let identity = generated_identity(object, slot);
            if identity.is_some_and(|(current, generated)| current == generated) {
                slots.push((position, slot));
            }
        }
    }
    slots
}

/// Whether the declared graph has a constraint or index named `id`.
fn declares(declared: &SchemaGraph, id: &ObjectId) -> bool {
    if declared.contains(id) {
        return true;
    }
    if id.kind != ObjectKind::Constraint {
        return false;
    }
    id.table_scope().is_some_and(|(table, name)| {
        declared
            .table(table)
            .is_some_and(|t| t.constraints.iter().any(|c| c.name == name))
    })
}

/// Renames generated constraint and index names that went stale because
/// the table or columns they were derived from were renamed.
fn refresh_generated_names(
    objects: &mut [SchemaObject],
    slots: Vec<(usize, Option<usize>)>,
    declared: &SchemaGraph,
    operations: &mut Vec<Operation>,
) -> Result<()> {
    for (position, slot) in slots {
        let Some((from, to)) = generated_identity(&objects[position], slot) else {
            continue;
        };
        if from == to || !declares(declared, &to) {
            continue;
        }
        rename_object(objects, &from, &to)?;
        debug!(%from, to = %to.name, "renamed generated name");
        operations.push(Operation::Rename { from, to });
    }
    Ok(())
}

/// Renames a column of `table`, updating constraints and indexes that list
/// it. Index expressions are left as written.
pub(crate) fn rename_column(
    objects: &mut [SchemaObject],
    table: &str,
    from: &str,
    to: &str,
) -> Result<()> {
    let owner = objects.iter_mut().find_map(|o| match o {
        SchemaObject::Table(t) if t.name == table => Some(t),
        _ => None,
    });
    let Some(owner) = owner else {
        return Err(CompileError::unknown(
            format!("rename of column {from}"),
            "table",
            table,
        ));
    };
    if owner.column(to).is_some() {
        return Err(CompileError::duplicate("column", format!("{table}.{to}")));
    }
    let Some(column) = owner.columns.iter_mut().find(|c| c.name == from) else {
        return Err(CompileError::unknown(
            format!("rename to {table}.{to}"),
            "column",
            format!("{table}.{from}"),
        ));
    };
    column.name = to.to_string();

    let rename = |columns: &mut Vec<String>| {
        for c in columns.iter_mut().filter(|c| c.as_str() == from) {
            *c = to.to_string();
        }
    };

    for object in objects.iter_mut() {
        match object {
            SchemaObject::Table(t) if t.name == table => {
                for constraint in &mut t.constraints {
                    match &mut constraint.kind {
                        ConstraintKind::PrimaryKey { columns } | ConstraintKind::Unique { columns } => {
                            rename(columns);
                        }
                        ConstraintKind::ForeignKey(fk) => rename(&mut fk.columns),
                        ConstraintKind::Check { .. } => {}
                    }
                }
            }
            SchemaObject::Constraint(c) => {
                if let ConstraintKind::ForeignKey(fk) = &mut c.constraint.kind {
                    if c.table == table {
                        rename(&mut fk.columns);
                    }
                    if fk.references_table == table {
                        rename(&mut fk.references_columns);
                    }
                }
            }
            SchemaObject::Index(i) if i.table == table => rename(&mut i.columns),
            _ => {}
        }
    }
    Ok(())
}

/// Applies confirmed renames to a copy of the live graph.
///
/// Returns the renamed live graph and the rename operations, in hint
/// order: object renames first, then column renames. Generated constraint
/// and index names derived from a renamed table or column are renamed last,
/// so keys are kept rather than rebuilt.
pub(crate) fn apply_hints(
    live: &SchemaGraph,
    declared: &SchemaGraph,
    options: &DiffOptions,
) -> Result<(SchemaGraph, Vec<Operation>)> {
    if options.renames.is_empty() && options.column_renames.is_empty() {
        return Ok((live.clone(), Vec::new()));
    }

    let mut objects = live.clone().into_objects();
    let generated = generated_slots(&objects);
    let mut operations = Vec::new();

    for hint in &options.renames {
        let (from, to) = (hint.from_id(), hint.to_id());
        if !declares(declared, &to) {
            return Err(CompileError::unknown(
                format!("rename hint {hint}"),
                to.kind.as_str(),
                to.name,
            ));
        }
        rename_object(&mut objects, &from, &to)?;
        debug!(%from, to = %to.name, "applied rename hint");
        operations.push(Operation::Rename { from, to });
    }

    for hint in &options.column_renames {
        let declared_column = declared
            .table(&hint.table)
            .and_then(|t| t.column(&hint.to));
        if declared_column.is_none() {
            return Err(CompileError::unknown(
                format!("rename hint {}.{}={}", hint.table, hint.from, hint.to),
                "column",
                format!("{}.{}", hint.table, hint.to),
            ));
        }
        rename_column(&mut objects, &hint.table, &hint.from, &hint.to)?;
        operations.push(Operation::Alter {
            target: ObjectId::table(&hint.table),
            changes: vec![AlterChange::RenameColumn {
                from: hint.from.clone(),
                to: hint.to.clone(),
            }],
        });
    }

    refresh_generated_names(&mut objects, generated, declared, &mut operations)?;
    Ok((register(objects)?, operations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{text, uuid, TableBuilder};

    #[test]
    fn levenshtein_basic() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn similarity_basic() {
        assert!((similarity("abc", "abc") - 1.0).abs() < f64::EPSILON);
        assert!((similarity("", "") - 1.0).abs() < f64::EPSILON);
        // "name" vs "full_name": dist 5, max 9, sim ~0.44
        let s = similarity("name", "full_name");
        assert!(s > 0.4 && s < 0.5, "sim={s}");
    }

    #[test]
    fn hints_parse() {
        assert_eq!(
            "table:albums=album".parse::<RenameHint>().unwrap(),
            RenameHint::new(ObjectKind::Table, "albums", "album")
        );
        assert_eq!(
            "trigger:asset.a=asset.b".parse::<RenameHint>().unwrap().to,
            "asset.b"
        );
        assert!("albums=album".parse::<RenameHint>().is_err());
        assert!("view:a=b".parse::<RenameHint>().is_err());

        let column: ColumnRenameHint = "asset.originalName=name".parse().unwrap();
        assert_eq!(column.table, "asset");
        assert_eq!(column.from, "originalName");
        assert!("asset=name".parse::<ColumnRenameHint>().is_err());
    }

    #[test]
    fn column_candidates_prefer_best_match() {
        let name = Column::new("name", DataType::Text);
        let nickname = Column::new("nick", DataType::Text);
        let full_name = Column::new("full_name", DataType::Text);
        let nick_name = Column::new("nick_name", DataType::Text);
        let count = Column::new("count", DataType::Integer);

        let candidates = column_candidates(
            "person",
            &[&name, &nickname, &count],
            &[&full_name, &nick_name],
            0.4,
        );
        let pairs: Vec<(&str, &str)> = candidates
            .iter()
            .map(|c| (c.from.as_str(), c.to.as_str()))
            .collect();
        assert_eq!(pairs, [("name", "full_name"), ("nick", "nick_name")]);
    }

    #[test]
    fn renaming_a_table_moves_its_bound_objects() {
        let mut objects = vec![
            SchemaObject::from(TableBuilder::new("users").column(uuid("id")).build()),
            SchemaObject::from(crate::model::TableConstraint {
                table: "albums".into(),
                constraint: crate::model::Constraint::new(
                    "fk",
                    ConstraintKind::ForeignKey(crate::model::ForeignKeyRef::new(
                        vec!["ownerId".into()],
                        "users",
                        vec!["id".into()],
                    )),
                ),
            }),
        ];
        rename_object(
            &mut objects,
            &ObjectId::table("users"),
            &ObjectId::table("user"),
        )
        .unwrap();
        assert_eq!(objects[0].id(), ObjectId::table("user"));
        let SchemaObject::Constraint(c) = &objects[1] else {
            panic!("expected constraint");
        };
        assert_eq!(c.constraint.foreign_key().unwrap().references_table, "user");
    }

    #[test]
    fn column_rename_updates_constraints() {
        let mut objects = vec![SchemaObject::from(
            TableBuilder::new("person")
                .column(text("fullName"))
                .unique(["fullName"])
                .build(),
        )];
        rename_column(&mut objects, "person", "fullName", "name").unwrap();
        let SchemaObject::Table(t) = &objects[0] else {
            panic!("expected table");
        };
        assert_eq!(t.columns[0].name, "name");
        assert_eq!(t.constraints[0].kind.columns(), ["name"]);

        let err = rename_column(&mut objects, "person", "missing", "x").unwrap_err();
        assert_eq!(err.kind(), "UnknownReferenceError");
    }

    #[test]
    fn table_rename_refreshes_generated_key_name() {
        let graph = |name: &str| {
            register([SchemaObject::from(
                TableBuilder::new(name).column(uuid("id").primary_key()).build(),
            )])
            .unwrap()
        };
        let (live, declared) = (graph("albums"), graph("album"));
        let key = ConstraintKind::PrimaryKey {
            columns: vec!["id".into()],
        };
        let (old, new) = (constraint_name("albums", &key), constraint_name("album", &key));

        let options =
            DiffOptions::default().rename(RenameHint::new(ObjectKind::Table, "albums", "album"));
        let (renamed, operations) = apply_hints(&live, &declared, &options).unwrap();
        let summaries: Vec<String> = operations.iter().map(ToString::to_string).collect();
        assert_eq!(
            summaries,
            [
                "Rename table albums to album".to_string(),
                format!("Rename constraint album.{old} to album.{new}"),
            ]
        );
        assert_eq!(renamed.table("album").unwrap().constraints[0].name, new);
    }

    #[test]
    fn column_rename_refreshes_generated_unique_name() {
        let graph = |column: &str| {
            register([SchemaObject::from(
                TableBuilder::new("person")
                    .column(text(column))
                    .unique([column])
                    .build(),
            )])
            .unwrap()
        };
        let (live, declared) = (graph("fullName"), graph("name"));
        let options = DiffOptions::default().rename_column(ColumnRenameHint {
            table: "person".into(),
            from: "fullName".into(),
            to: "name".into(),
        });

        let (renamed, operations) = apply_hints(&live, &declared, &options).unwrap();
        assert_eq!(operations.len(), 2);
        assert!(matches!(
            &operations[1],
            Operation::Rename { to, .. } if to.kind == ObjectKind::Constraint
        ));
        assert_eq!(
            renamed.table("person").unwrap().constraints,
            declared.table("person").unwrap().constraints
        );
    }

    #[test]
    fn explicit_names_survive_table_rename() {
        let graph = |name: &str| {
            register([SchemaObject::from(
                TableBuilder::new(name)
                    .column(uuid("id"))
                    .constraint(crate::model::Constraint::new(
                        "album_pkey",
                        ConstraintKind::PrimaryKey {
                            columns: vec!["id".into()],
                        },
                    ))
                    .build(),
            )])
            .unwrap()
        };
        let options =
            DiffOptions::default().rename(RenameHint::new(ObjectKind::Table, "albums", "album"));
        let (_, operations) = apply_hints(&graph("albums"), &graph("album"), &options).unwrap();
        assert_eq!(operations.len(), 1);
    }
}
