//! Deterministic names for unnamed constraints and indexes.
//!
//! A generated name is a kind prefix followed by the first 30 hex characters
//! of a SHA-256 digest over the table name and the defining columns or
//! expression. The same definition always yields the same name, so a
//! declaration and the database it was applied to agree on names without
//! either side storing them.

use sha2::{Digest, Sha256};

use crate::model::{ConstraintKind, Index};
use crate::normalize::normalize_expression;

const HASH_LEN: usize = 30;

fn hashed(prefix: &str, table: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(table.as_bytes());
    for part in parts {
        hasher.update([0u8]);
        hasher.update(part.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("{prefix}{}", &digest[..HASH_LEN])
}

/// Generated name for a constraint of `table`.
#[must_use]
pub fn constraint_name(table: &str, kind: &ConstraintKind) -> String {
    match kind {
        ConstraintKind::PrimaryKey { columns } => hashed("PK_", table, &as_strs(columns)),
        ConstraintKind::Unique { columns } => hashed("UQ_", table, &as_strs(columns)),
        ConstraintKind::Check { expression } => {
            hashed("CHK_", table, &[&normalize_expression(expression)])
        }
        ConstraintKind::ForeignKey(fk) => {
            let mut parts = as_strs(&fk.columns);
            parts.push(&fk.references_table);
            parts.extend(fk.references_columns.iter().map(String::as_str));
            hashed("FK_", table, &parts)
        }
    }
}

/// Generated name for an index.
#[must_use]
pub fn index_name(index: &Index) -> String {
    let expression = index.expression.as_deref().map(normalize_expression);
    let predicate = index.predicate.as_deref().map(normalize_expression);

    let mut parts = as_strs(&index.columns);
    if let Some(expression) = &expression {
        parts.push(expression);
    }
    if let Some(predicate) = &predicate {
        parts.push("where");
        parts.push(predicate);
    }
    hashed("IDX_", &index.table, &parts)
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ForeignKeyRef;

    #[test]
    fn names_are_stable_and_prefixed() {
        let pk = ConstraintKind::PrimaryKey {
            columns: vec!["id".into()],
        };
        let a = constraint_name("asset", &pk);
        assert_eq!(a, constraint_name("asset", &pk));
        assert!(a.starts_with("PK_"));
        assert_eq!(a.len(), 3 + HASH_LEN);
        assert_ne!(a, constraint_name("album", &pk));
    }

    #[test]
    fn foreign_key_name_covers_target() {
        let to_user = ConstraintKind::ForeignKey(ForeignKeyRef::new(
            vec!["owner_id".into()],
            "user",
            vec!["id".into()],
        ));
        let to_org = ConstraintKind::ForeignKey(ForeignKeyRef::new(
            vec!["owner_id".into()],
            "org",
            vec!["id".into()],
        ));
        assert!(constraint_name("album", &to_user).starts_with("FK_"));
        assert_ne!(
            constraint_name("album", &to_user),
            constraint_name("album", &to_org)
        );
    }

    #[test]
    fn index_name_ignores_expression_formatting() {
        let a = Index {
            table: "person".into(),
            expression: Some("F_UNACCENT(name)".into()),
            ..Index::default()
        };
        let b = Index {
            expression: Some("public.f_unaccent((name)::text)".into()),
            ..a.clone()
        };
        assert_eq!(index_name(&a), index_name(&b));
        assert!(index_name(&a).starts_with("IDX_"));
    }
}
