//! PostgreSQL dialect.

use super::MigrationDialect;
use crate::diff::LabelPosition;
use crate::error::Result;
use crate::model::{
    DataType, DefaultValue, EnumType, Extension, Function, Trigger, TriggerScope,
};

/// PostgreSQL dialect for migration SQL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Picks a dollar-quote tag that does not occur in `body`.
fn dollar_tag(body: &str) -> String {
    let mut tag = String::from("$body$");
    let mut n = 0;
    while body.contains(&tag) {
        n += 1;
        tag = format!("$body{n}$");
    }
    tag
}

impl MigrationDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn map_data_type(&self, data_type: &DataType) -> Result<String> {
        Ok(match data_type {
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::SmallInt => "SMALLINT".to_string(),
            DataType::Integer => "INTEGER".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Real => "REAL".to_string(),
            DataType::DoublePrecision => "DOUBLE PRECISION".to_string(),
            DataType::Numeric { precision, scale } => match (precision, scale) {
                (Some(p), Some(s)) => format!("NUMERIC({p}, {s})"),
                (Some(p), None) => format!("NUMERIC({p})"),
                _ => "NUMERIC".to_string(),
            },
            DataType::Text => "TEXT".to_string(),
            DataType::Varchar(len) => match len {
                Some(n) => format!("VARCHAR({n})"),
                None => "VARCHAR".to_string(),
            },
            DataType::Char(len) => match len {
                Some(n) => format!("CHAR({n})"),
                None => "CHAR".to_string(),
            },
            DataType::Uuid => "UUID".to_string(),
            DataType::Date => "DATE".to_string(),
            DataType::Time => "TIME".to_string(),
            DataType::TimeTz => "TIMETZ".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
            DataType::TimestampTz => "TIMESTAMPTZ".to_string(),
            DataType::Interval => "INTERVAL".to_string(),
            DataType::Bytea => "BYTEA".to_string(),
            DataType::Json => "JSON".to_string(),
            DataType::Jsonb => "JSONB".to_string(),
            DataType::Inet => "INET".to_string(),
            DataType::Enum(name) => self.quote_identifier(name),
            // Extension types keep their modifiers, e.g. vector(512).
            DataType::Custom(name) => name.clone(),
            DataType::Array(inner) => format!("{}[]", self.map_data_type(inner)?),
        })
    }

    fn create_extension(&self, extension: &Extension) -> Result<String> {
        Ok(format!(
            "CREATE EXTENSION IF NOT EXISTS {}",
            self.quote_identifier(&extension.name)
        ))
    }

    fn drop_extension(&self, extension: &Extension) -> Result<String> {
        Ok(format!(
            "DROP EXTENSION {}",
            self.quote_identifier(&extension.name)
        ))
    }

    fn create_enum(&self, enum_type: &EnumType) -> Result<String> {
        let labels: Vec<String> = enum_type
            .labels
            .iter()
            .map(|l| self.quote_literal(l))
            .collect();
        Ok(format!(
            "CREATE TYPE {} AS ENUM ({})",
            self.quote_identifier(&enum_type.name),
            labels.join(", ")
        ))
    }

    fn drop_enum(&self, enum_type: &EnumType) -> Result<String> {
        Ok(format!("DROP TYPE {}", self.quote_identifier(&enum_type.name)))
    }

    fn add_enum_label(&self, name: &str, label: &str, position: &LabelPosition) -> Result<String> {
        let mut sql = format!(
            "ALTER TYPE {} ADD VALUE {}",
            self.quote_identifier(name),
            self.quote_literal(label)
        );
        match position {
            LabelPosition::Before(other) => {
                sql.push_str(" BEFORE ");
                sql.push_str(&self.quote_literal(other));
            }
            LabelPosition::After(other) => {
                sql.push_str(" AFTER ");
                sql.push_str(&self.quote_literal(other));
            }
            LabelPosition::End => {}
        }
        Ok(sql)
    }

    fn create_function(&self, function: &Function) -> Result<String> {
        let tag = dollar_tag(&function.body);
        Ok(format!(
            "CREATE OR REPLACE FUNCTION {}({})\n  RETURNS {}\n  LANGUAGE {}\n  {}\n  PARALLEL {}\nAS {tag}\n{}\n{tag}",
            self.quote_identifier(&function.name),
            function.arguments,
            function.returns,
            function.language,
            function.volatility.as_sql(),
            function.parallel.as_sql(),
            function.body.trim(),
        ))
    }

    fn drop_function(&self, function: &Function) -> Result<String> {
        Ok(format!(
            "DROP FUNCTION {}({})",
            self.quote_identifier(&function.name),
            function.identity_arguments()
        ))
    }

    fn create_trigger(&self, trigger: &Trigger) -> Result<String> {
        let events: Vec<&str> = trigger.events.iter().map(|e| e.as_sql()).collect();
        let mut sql = format!(
            "CREATE TRIGGER {}\n  {} {} ON {}",
            self.quote_identifier(&trigger.name),
            trigger.timing.as_sql(),
            events.join(" OR "),
            self.quote_identifier(&trigger.table)
        );
        if trigger.old_table.is_some() || trigger.new_table.is_some() {
            sql.push_str("\n  REFERENCING");
            if let Some(old) = &trigger.old_table {
                sql.push_str(&format!(" OLD TABLE AS {}", self.quote_identifier(old)));
            }
            if let Some(new) = &trigger.new_table {
                sql.push_str(&format!(" NEW TABLE AS {}", self.quote_identifier(new)));
            }
        }
        sql.push_str(match trigger.scope {
            TriggerScope::Row => "\n  FOR EACH ROW",
            TriggerScope::Statement => "\n  FOR EACH STATEMENT",
        });
        if let Some(condition) = &trigger.when {
            sql.push_str(&format!("\n  WHEN ({condition})"));
        }
        sql.push_str(&format!(
            "\n  EXECUTE FUNCTION {}()",
            self.quote_identifier(&trigger.function)
        ));
        Ok(sql)
    }

    fn drop_trigger(&self, trigger: &Trigger) -> Result<String> {
        Ok(format!(
            "DROP TRIGGER {} ON {}",
            self.quote_identifier(&trigger.name),
            self.quote_identifier(&trigger.table)
        ))
    }

    fn alter_column_type(&self, table: &str, column: &str, to: &DataType) -> Result<String> {
        let ty = self.map_data_type(to)?;
        let column = self.quote_identifier(column);
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {column} TYPE {ty} USING {column}::{ty}",
            self.quote_identifier(table)
        ))
    }

    fn set_nullable(&self, table: &str, column: &str, nullable: bool) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} {}",
            self.quote_identifier(table),
            self.quote_identifier(column),
            if nullable { "DROP NOT NULL" } else { "SET NOT NULL" }
        ))
    }

    fn set_default(
        &self,
        table: &str,
        column: &str,
        default: Option<&DefaultValue>,
    ) -> Result<String> {
        let action = default.map_or_else(
            || "DROP DEFAULT".to_string(),
            |d| format!("SET DEFAULT {}", self.render_default(d)),
        );
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} {action}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        ))
    }

    fn comment_on_table(&self, table: &str, comment: Option<&str>) -> Result<String> {
        Ok(format!(
            "COMMENT ON TABLE {} IS {}",
            self.quote_identifier(table),
            comment.map_or_else(|| "NULL".to_string(), |c| self.quote_literal(c))
        ))
    }

    fn comment_on_column(&self, table: &str, column: &str, comment: Option<&str>) -> Result<String> {
        Ok(format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            self.quote_identifier(table),
            self.quote_identifier(column),
            comment.map_or_else(|| "NULL".to_string(), |c| self.quote_literal(c))
        ))
    }
}
