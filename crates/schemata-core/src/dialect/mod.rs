//! Dialect-specific DDL generation.
//!
//! A dialect turns each [`Operation`] of a change set into SQL statements.
//! Rendering is pure: the order of the change set is trusted and nothing is
//! reordered here. Statements common to most databases are provided as
//! default methods; dialects override what they spell differently and
//! reject what they cannot express with [`CompileError::Dialect`].

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use tracing::debug;

use crate::diff::{AlterChange, ChangeSet, LabelPosition, Operation};
use crate::error::{CompileError, Result};
use crate::model::{
    Column, Constraint, ConstraintKind, DataType, DefaultValue, EnumType, Extension,
    ForeignKeyAction, Function, Index, IndexMethod, ObjectId, ObjectKind, SchemaObject, Table,
    Trigger,
};

/// Renders every operation of `changes`, in order.
///
/// # Errors
///
/// Returns [`CompileError::Dialect`] if the dialect cannot express one of
/// the operations.
pub fn emit<D>(changes: &ChangeSet, dialect: &D) -> Result<Vec<String>>
where
    D: MigrationDialect + ?Sized,
{
    let mut statements = Vec::new();
    for operation in changes {
        statements.extend(dialect.generate_sql(operation)?);
    }
    debug!(
        dialect = dialect.name(),
        operations = changes.len(),
        statements = statements.len(),
        "rendered change set"
    );
    Ok(statements)
}

/// Trait for dialect-specific SQL generation.
pub trait MigrationDialect {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Maps a data type to the dialect spelling.
    ///
    /// # Errors
    ///
    /// Fails if the dialect has no equivalent type.
    fn map_data_type(&self, data_type: &DataType) -> Result<String>;

    /// Error for a feature this dialect cannot express.
    fn unsupported(&self, feature: &str) -> CompileError {
        CompileError::Dialect {
            dialect: self.name(),
            feature: feature.to_string(),
        }
    }

    /// Generates the statements for one operation.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Dialect`] for unsupported features.
    fn generate_sql(&self, operation: &Operation) -> Result<Vec<String>> {
        match operation {
            Operation::Create(object) => self.create(object),
            Operation::Drop(object) => Ok(vec![self.drop(object)?]),
            Operation::Alter { target, changes } => {
                let mut statements = Vec::new();
                for change in changes {
                    statements.extend(self.alter(target, change)?);
                }
                Ok(statements)
            }
            Operation::Rename { from, to } => Ok(vec![self.rename(from, to)?]),
        }
    }

    /// Generates the statements creating `object`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Dialect`] for unsupported features.
    fn create(&self, object: &SchemaObject) -> Result<Vec<String>> {
        match object {
            SchemaObject::Extension(e) => Ok(vec![self.create_extension(e)?]),
            SchemaObject::Enum(e) => Ok(vec![self.create_enum(e)?]),
            SchemaObject::Function(f) => Ok(vec![self.create_function(f)?]),
            SchemaObject::Table(t) => self.create_table(t),
            SchemaObject::Constraint(c) => Ok(vec![self.add_constraint(&c.table, &c.constraint)?]),
            SchemaObject::Index(i) => Ok(vec![self.create_index(i)?]),
            SchemaObject::Trigger(t) => Ok(vec![self.create_trigger(t)?]),
        }
    }

    /// Generates the statement dropping `object`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Dialect`] for unsupported features.
    fn drop(&self, object: &SchemaObject) -> Result<String> {
        match object {
            SchemaObject::Extension(e) => self.drop_extension(e),
            SchemaObject::Enum(e) => self.drop_enum(e),
            SchemaObject::Function(f) => self.drop_function(f),
            SchemaObject::Table(t) => Ok(format!("DROP TABLE {}", self.quote_identifier(&t.name))),
            SchemaObject::Constraint(c) => self.drop_constraint(&c.table, &c.constraint),
            SchemaObject::Index(i) => Ok(format!("DROP INDEX {}", self.quote_identifier(&i.name))),
            SchemaObject::Trigger(t) => self.drop_trigger(t),
        }
    }

    /// Generates the statements for one structural change of `target`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Dialect`] for unsupported features.
    fn alter(&self, target: &ObjectId, change: &AlterChange) -> Result<Vec<String>> {
        let table = &target.name;
        let statement = match change {
            AlterChange::AddColumn(column) => {
                let mut statements = vec![format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    self.quote_identifier(table),
                    self.column_definition(column)?
                )];
                if let Some(comment) = &column.comment {
                    statements.push(self.comment_on_column(table, &column.name, Some(comment))?);
                }
                return Ok(statements);
            }
            AlterChange::DropColumn(column) => format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.quote_identifier(table),
                self.quote_identifier(&column.name)
            ),
            AlterChange::RenameColumn { from, to } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.quote_identifier(table),
                self.quote_identifier(from),
                self.quote_identifier(to)
            ),
            AlterChange::AlterColumnType { column, to, .. } => {
                self.alter_column_type(table, column, to)?
            }
            AlterChange::SetNullable { column, nullable } => {
                self.set_nullable(table, column, *nullable)?
            }
            AlterChange::SetDefault { column, default } => {
                self.set_default(table, column, default.as_ref())?
            }
            AlterChange::SetColumnComment { column, comment } => {
                self.comment_on_column(table, column, comment.as_deref())?
            }
            AlterChange::AddConstraint(constraint) => self.add_constraint(table, constraint)?,
            AlterChange::DropConstraint(constraint) => self.drop_constraint(table, constraint)?,
            AlterChange::SetComment(comment) => self.comment_on_table(table, comment.as_deref())?,
            AlterChange::AddEnumLabel { label, position } => {
                self.add_enum_label(&target.name, label, position)?
            }
            AlterChange::ReplaceFunction(function) => self.create_function(function)?,
        };
        Ok(vec![statement])
    }

    /// Generates the statement renaming `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Dialect`] for unsupported features.
    fn rename(&self, from: &ObjectId, to: &ObjectId) -> Result<String> {
        let new = self.quote_identifier(to.local_name());
        match (from.kind, from.table_scope()) {
            (ObjectKind::Table, _) => Ok(format!(
                "ALTER TABLE {} RENAME TO {new}",
                self.quote_identifier(&from.name)
            )),
            (ObjectKind::Index, _) => Ok(format!(
                "ALTER INDEX {} RENAME TO {new}",
                self.quote_identifier(&from.name)
            )),
            (ObjectKind::Constraint, Some((table, name))) => Ok(format!(
                "ALTER TABLE {} RENAME CONSTRAINT {} TO {new}",
                self.quote_identifier(table),
                self.quote_identifier(name)
            )),
            (ObjectKind::Trigger, Some((table, name))) => Ok(format!(
                "ALTER TRIGGER {} ON {} RENAME TO {new}",
                self.quote_identifier(name),
                self.quote_identifier(table)
            )),
            (ObjectKind::Enum, _) => Ok(format!(
                "ALTER TYPE {} RENAME TO {new}",
                self.quote_identifier(&from.name)
            )),
            (ObjectKind::Function, _) => Ok(format!(
                "ALTER FUNCTION {} RENAME TO {new}",
                self.quote_identifier(&from.name)
            )),
            _ => Err(self.unsupported(&format!("renaming {from}"))),
        }
    }

    /// Generates `CREATE TABLE` followed by comment statements.
    ///
    /// # Errors
    ///
    /// Fails if a column type or comment cannot be rendered.
    fn create_table(&self, table: &Table) -> Result<Vec<String>> {
        let mut sql = String::from("CREATE TABLE ");
        sql.push_str(&self.quote_identifier(&table.name));
        sql.push_str(" (\n");

        let mut definitions = Vec::with_capacity(table.columns.len() + table.constraints.len());
        for column in &table.columns {
            definitions.push(format!("    {}", self.column_definition(column)?));
        }
        for constraint in &table.constraints {
            definitions.push(format!("    {}", self.constraint_definition(constraint)));
        }
        sql.push_str(&definitions.join(",\n"));
        sql.push_str("\n)");

        let mut statements = vec![sql];
        if table.comment.is_some() {
            statements.push(self.comment_on_table(&table.name, table.comment.as_deref())?);
        }
        for column in &table.columns {
            if let Some(comment) = &column.comment {
                statements.push(self.comment_on_column(&table.name, &column.name, Some(comment))?);
            }
        }
        Ok(statements)
    }

    /// Generates a column definition.
    ///
    /// # Errors
    ///
    /// Fails if the column type cannot be rendered.
    fn column_definition(&self, column: &Column) -> Result<String> {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.map_data_type(&column.data_type)?
        );
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.render_default(default));
        }
        Ok(sql)
    }

    /// Generates a named table constraint clause.
    fn constraint_definition(&self, constraint: &Constraint) -> String {
        let mut sql = String::new();
        if !constraint.name.is_empty() {
            sql.push_str(&format!("CONSTRAINT {} ", self.quote_identifier(&constraint.name)));
        }
        match &constraint.kind {
            ConstraintKind::PrimaryKey { columns } => {
                sql.push_str(&format!("PRIMARY KEY ({})", self.column_list(columns)));
            }
            ConstraintKind::Unique { columns } => {
                sql.push_str(&format!("UNIQUE ({})", self.column_list(columns)));
            }
            ConstraintKind::Check { expression } => {
                sql.push_str(&format!("CHECK ({expression})"));
            }
            ConstraintKind::ForeignKey(fk) => {
                sql.push_str(&format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                    self.column_list(&fk.columns),
                    self.quote_identifier(&fk.references_table),
                    self.column_list(&fk.references_columns)
                ));
                if fk.on_update != ForeignKeyAction::NoAction {
                    sql.push_str(" ON UPDATE ");
                    sql.push_str(fk.on_update.as_sql());
                }
                if fk.on_delete != ForeignKeyAction::NoAction {
                    sql.push_str(" ON DELETE ");
                    sql.push_str(fk.on_delete.as_sql());
                }
                if fk.deferrable {
                    sql.push_str(" DEFERRABLE");
                    if fk.initially_deferred {
                        sql.push_str(" INITIALLY DEFERRED");
                    }
                }
            }
        }
        sql
    }

    /// Generates `ALTER TABLE ... ADD CONSTRAINT`.
    ///
    /// # Errors
    ///
    /// Dialects that cannot add constraints to existing tables fail.
    fn add_constraint(&self, table: &str, constraint: &Constraint) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_identifier(table),
            self.constraint_definition(constraint)
        ))
    }

    /// Generates `ALTER TABLE ... DROP CONSTRAINT`.
    ///
    /// # Errors
    ///
    /// Dialects that cannot drop constraints fail.
    fn drop_constraint(&self, table: &str, constraint: &Constraint) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_identifier(table),
            self.quote_identifier(&constraint.name)
        ))
    }

    /// Generates `CREATE INDEX`.
    ///
    /// # Errors
    ///
    /// Fails for access methods the dialect does not have.
    fn create_index(&self, index: &Index) -> Result<String> {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(&index.table));
        if index.method != IndexMethod::Btree {
            sql.push_str(&format!(" USING {}", self.index_method_sql(&index.method)?));
        }
        match &index.expression {
            Some(expression) => sql.push_str(&format!(" ({expression})")),
            None => sql.push_str(&format!(" ({})", self.column_list(&index.columns))),
        }
        if let Some(predicate) = &index.predicate {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
        Ok(sql)
    }

    /// Maps an index method to SQL.
    ///
    /// # Errors
    ///
    /// Fails for methods the dialect does not have.
    fn index_method_sql(&self, method: &IndexMethod) -> Result<String> {
        Ok(method.as_sql().to_string())
    }

    /// Generates `CREATE EXTENSION`.
    ///
    /// # Errors
    ///
    /// Fails if the dialect has no extensions.
    fn create_extension(&self, extension: &Extension) -> Result<String>;

    /// Generates `DROP EXTENSION`.
    ///
    /// # Errors
    ///
    /// Fails if the dialect has no extensions.
    fn drop_extension(&self, extension: &Extension) -> Result<String>;

    /// Generates `CREATE TYPE ... AS ENUM`.
    ///
    /// # Errors
    ///
    /// Fails if the dialect has no enum types.
    fn create_enum(&self, enum_type: &EnumType) -> Result<String>;

    /// Generates `DROP TYPE`.
    ///
    /// # Errors
    ///
    /// Fails if the dialect has no enum types.
    fn drop_enum(&self, enum_type: &EnumType) -> Result<String>;

    /// Generates the statement inserting an enum label.
    ///
    /// # Errors
    ///
    /// Fails if the dialect has no enum types.
    fn add_enum_label(&self, name: &str, label: &str, position: &LabelPosition) -> Result<String>;

    /// Generates `CREATE OR REPLACE FUNCTION`.
    ///
    /// # Errors
    ///
    /// Fails if the dialect has no stored functions.
    fn create_function(&self, function: &Function) -> Result<String>;

    /// Generates `DROP FUNCTION`.
    ///
    /// # Errors
    ///
    /// Fails if the dialect has no stored functions.
    fn drop_function(&self, function: &Function) -> Result<String>;

    /// Generates `CREATE TRIGGER`.
    ///
    /// # Errors
    ///
    /// Fails if the dialect cannot bind triggers to functions.
    fn create_trigger(&self, trigger: &Trigger) -> Result<String>;

    /// Generates `DROP TRIGGER`.
    ///
    /// # Errors
    ///
    /// Fails if the dialect cannot bind triggers to functions.
    fn drop_trigger(&self, trigger: &Trigger) -> Result<String>;

    /// Generates a column type change.
    ///
    /// # Errors
    ///
    /// Fails if the dialect cannot alter columns.
    fn alter_column_type(&self, table: &str, column: &str, to: &DataType) -> Result<String>;

    /// Generates `SET NOT NULL` / `DROP NOT NULL`.
    ///
    /// # Errors
    ///
    /// Fails if the dialect cannot alter columns.
    fn set_nullable(&self, table: &str, column: &str, nullable: bool) -> Result<String>;

    /// Generates `SET DEFAULT` / `DROP DEFAULT`.
    ///
    /// # Errors
    ///
    /// Fails if the dialect cannot alter columns.
    fn set_default(&self, table: &str, column: &str, default: Option<&DefaultValue>)
        -> Result<String>;

    /// Generates `COMMENT ON TABLE`.
    ///
    /// # Errors
    ///
    /// Fails if the dialect has no comments.
    fn comment_on_table(&self, table: &str, comment: Option<&str>) -> Result<String>;

    /// Generates `COMMENT ON COLUMN`.
    ///
    /// # Errors
    ///
    /// Fails if the dialect has no comments.
    fn comment_on_column(&self, table: &str, column: &str, comment: Option<&str>)
        -> Result<String>;

    /// Renders a default value.
    fn render_default(&self, default: &DefaultValue) -> String {
        default.to_sql()
    }

    /// Quotes an identifier, doubling embedded quotes.
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quotes a string literal, doubling embedded quotes.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Comma-separated quoted column names.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
