//! Column and inline constraint differences between two versions of a table.

use std::collections::BTreeSet;

use super::canonical::{self, default_sql};
use super::changeset::{AlterChange, RenameCandidate};
use super::rename::column_candidates;
use super::DiffOptions;
use crate::error::{CompileError, Result};
use crate::model::{Column, ConstraintKind, DefaultValue, ObjectId, Table};

/// In-place changes to one table.
#[derive(Debug, Default)]
pub(crate) struct TableDiff {
    /// Changes that remove structure: dropped constraints, then columns.
    pub removals: Vec<AlterChange>,
    /// Changes that add or modify structure, in declared column order.
    pub additions: Vec<AlterChange>,
    /// A primary key or unique constraint goes away, even temporarily.
    pub dropped_keys: bool,
    /// Dropped and added columns that may be renames.
    pub rename_candidates: Vec<RenameCandidate>,
}

pub(crate) fn diff_table(declared: &Table, live: &Table, options: &DiffOptions) -> Result<TableDiff> {
    let mut diff = TableDiff::default();

    let declared_keys = constraint_keys(declared);
    let live_keys = constraint_keys(live);
    let declared_set: BTreeSet<&(String, String)> = declared_keys.iter().collect();
    let live_set: BTreeSet<&(String, String)> = live_keys.iter().collect();

    for (constraint, key) in live.constraints.iter().zip(&live_keys) {
        if !declared_set.contains(key) {
            if matches!(
                constraint.kind,
                ConstraintKind::PrimaryKey { .. } | ConstraintKind::Unique { .. }
            ) {
                diff.dropped_keys = true;
            }
            diff.removals.push(AlterChange::DropConstraint(constraint.clone()));
        }
    }

    let dropped: Vec<&Column> = live
        .columns
        .iter()
        .filter(|c| declared.column(&c.name).is_none())
        .collect();
    diff.removals
        .extend(dropped.iter().map(|c| AlterChange::DropColumn((*c).clone())));

    let mut added = Vec::new();
    for column in &declared.columns {
        match live.column(&column.name) {
            None => {
                added.push(column);
                diff.additions.push(AlterChange::AddColumn(column.clone()));
            }
            Some(existing) => {
                diff_column(&declared.name, column, existing, options, &mut diff.additions)?;
            }
        }
    }

    for (constraint, key) in declared.constraints.iter().zip(&declared_keys) {
        if !live_set.contains(key) {
            diff.additions.push(AlterChange::AddConstraint(constraint.clone()));
        }
    }

    if declared.comment != live.comment {
        diff.additions.push(AlterChange::SetComment(declared.comment.clone()));
    }

    diff.rename_candidates = column_candidates(
        &declared.name,
        &dropped,
        &added,
        options.column_rename_threshold,
    );
    Ok(diff)
}

/// Name and canonical definition of each inline constraint, in order.
fn constraint_keys(table: &Table) -> Vec<(String, String)> {
    table
        .constraints
        .iter()
        .map(canonical::constraint)
        .map(|c| (c.name, format!("{:?}", c.kind)))
        .collect()
}

fn diff_column(
    table: &str,
    declared: &Column,
    live: &Column,
    options: &DiffOptions,
    changes: &mut Vec<AlterChange>,
) -> Result<()> {
    let name = &declared.name;

    if declared.data_type != live.data_type {
        if !live.data_type.converts_losslessly_to(&declared.data_type)
            && !options.allow_lossy_type_changes
        {
            return Err(CompileError::unsupported(
                ObjectId::table(table).to_string(),
                format!(
                    "column {name} changes type from {} to {}, which may lose data",
                    live.data_type, declared.data_type
                ),
            ));
        }
        changes.push(AlterChange::AlterColumnType {
            column: name.clone(),
            from: live.data_type.clone(),
            to: declared.data_type.clone(),
        });
    }

    if declared.nullable != live.nullable {
        changes.push(AlterChange::SetNullable {
            column: name.clone(),
            nullable: declared.nullable,
        });
    }

    if default_sql(declared.default.as_ref()) != default_sql(live.default.as_ref()) {
        changes.push(AlterChange::SetDefault {
            column: name.clone(),
            default: declared
                .default
                .clone()
                .filter(|d| !matches!(d, DefaultValue::Null)),
        });
    }

    if declared.comment != live.comment {
        changes.push(AlterChange::SetColumnComment {
            column: name.clone(),
            comment: declared.comment.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{bigint, integer, text, uuid, DataType, TableBuilder};

    fn options() -> DiffOptions {
        DiffOptions::default()
    }

    #[test]
    fn identical_tables_have_no_changes() {
        let table = TableBuilder::new("person")
            .column(uuid("id").primary_key())
            .column(text("name").not_null().default_str(""))
            .build();
        let diff = diff_table(&table, &table.clone(), &options()).unwrap();
        assert!(diff.removals.is_empty());
        assert!(diff.additions.is_empty());
        assert!(!diff.dropped_keys);
    }

    #[test]
    fn column_changes_follow_declared_order() {
        let live = TableBuilder::new("person")
            .column(uuid("id"))
            .column(integer("age"))
            .column(text("legacy"))
            .build();
        let declared = TableBuilder::new("person")
            .column(uuid("id"))
            .column(bigint("age").not_null())
            .column(text("nickname"))
            .comment("People")
            .build();

        let diff = diff_table(&declared, &live, &options()).unwrap();
        let removals: Vec<String> = diff.removals.iter().map(ToString::to_string).collect();
        let additions: Vec<String> = diff.additions.iter().map(ToString::to_string).collect();
        assert_eq!(removals, ["drop column legacy"]);
        assert_eq!(
            additions,
            [
                "alter column age type integer -> bigint",
                "set not null on age",
                "add column nickname",
                "comment on table",
            ]
        );
    }

    #[test]
    fn narrowing_needs_permission() {
        let live = TableBuilder::new("t").column(bigint("n")).build();
        let declared = TableBuilder::new("t").column(integer("n")).build();
        let err = diff_table(&declared, &live, &options()).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedChangeError");

        let lossy = DiffOptions {
            allow_lossy_type_changes: true,
            ..DiffOptions::default()
        };
        let diff = diff_table(&declared, &live, &lossy).unwrap();
        assert_eq!(
            diff.additions,
            [AlterChange::AlterColumnType {
                column: "n".into(),
                from: DataType::BigInt,
                to: DataType::Integer,
            }]
        );
    }

    #[test]
    fn changed_key_is_dropped_then_added() {
        let live = TableBuilder::new("t")
            .column(uuid("id"))
            .column(uuid("other"))
            .primary_key(["id"])
            .build();
        let declared = TableBuilder::new("t")
            .column(uuid("id"))
            .column(uuid("other"))
            .primary_key(["id", "other"])
            .build();
        let diff = diff_table(&declared, &live, &options()).unwrap();
        assert!(diff.dropped_keys);
        assert!(matches!(diff.removals[0], AlterChange::DropConstraint(_)));
        assert!(matches!(diff.additions[0], AlterChange::AddConstraint(_)));
    }

    #[test]
    fn equivalent_defaults_are_not_changes() {
        let live = TableBuilder::new("t")
            .column(text("status").default_expr("'active'::text"))
            .build();
        let declared = TableBuilder::new("t")
            .column(text("status").default_str("active"))
            .build();
        let diff = diff_table(&declared, &live, &options()).unwrap();
        assert!(diff.additions.is_empty());
    }

    #[test]
    fn similar_columns_are_rename_candidates() {
        let live = TableBuilder::new("t").column(text("fullname")).build();
        let declared = TableBuilder::new("t").column(text("full_name")).build();
        let diff = diff_table(&declared, &live, &options()).unwrap();
        assert_eq!(diff.rename_candidates.len(), 1);
        assert_eq!(diff.rename_candidates[0].from, "fullname");
        assert_eq!(diff.rename_candidates[0].to, "full_name");
    }
}
