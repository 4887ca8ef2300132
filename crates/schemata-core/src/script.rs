//! Rendered migration scripts.

use sha2::{Digest, Sha256};

use crate::diff::ChangeSet;
use crate::dialect::{emit, MigrationDialect};
use crate::error::Result;

/// Statements rendered for one change set, ready to be written to a
/// migration file or executed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationScript {
    /// Statements without trailing semicolons.
    pub statements: Vec<String>,
}

impl MigrationScript {
    /// Wraps already rendered statements.
    #[must_use]
    pub const fn new(statements: Vec<String>) -> Self {
        Self { statements }
    }

    /// Renders `changes` with `dialect`.
    ///
    /// # Errors
    ///
    /// Propagates dialect errors from [`emit`].
    pub fn render<D>(changes: &ChangeSet, dialect: &D) -> Result<Self>
    where
        D: MigrationDialect + ?Sized,
    {
        emit(changes, dialect).map(Self::new)
    }

    /// Returns `true` if there are no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Number of statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// The script text: statements terminated by `;` and separated by a
    /// blank line. Empty for an empty script.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        for (i, statement) in self.statements.iter().enumerate() {
            if i > 0 {
                sql.push_str("\n\n");
            }
            sql.push_str(statement);
            sql.push(';');
        }
        if !sql.is_empty() {
            sql.push('\n');
        }
        sql
    }

    /// Hex SHA-256 of [`Self::to_sql`].
    #[must_use]
    pub fn checksum(&self) -> String {
        checksum(&self.to_sql())
    }
}

/// Hex SHA-256 of a script body.
#[must_use]
pub fn checksum(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_are_terminated_and_separated() {
        let script = MigrationScript::new(vec![
            "CREATE EXTENSION IF NOT EXISTS \"pg_trgm\"".into(),
            "DROP TABLE \"legacy\"".into(),
        ]);
        assert_eq!(
            script.to_sql(),
            "CREATE EXTENSION IF NOT EXISTS \"pg_trgm\";\n\nDROP TABLE \"legacy\";\n"
        );
        assert_eq!(script.len(), 2);
    }

    #[test]
    fn empty_script_renders_nothing() {
        let script = MigrationScript::default();
        assert!(script.is_empty());
        assert_eq!(script.to_sql(), "");
        // SHA-256 of the empty string.
        assert_eq!(
            script.checksum(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn checksum_tracks_the_body() {
        let a = MigrationScript::new(vec!["DROP TABLE \"a\"".into()]);
        let b = MigrationScript::new(vec!["DROP TABLE \"b\"".into()]);
        assert_eq!(a.checksum(), a.clone().checksum());
        assert_ne!(a.checksum(), b.checksum());
        assert_eq!(a.checksum().len(), 64);
        assert_eq!(a.checksum(), checksum(&a.to_sql()));
    }
}
