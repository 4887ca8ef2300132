//! Migration executor.
//!
//! This module applies migration files against a database. Each file runs in
//! its own transaction together with its history record, so a failed
//! statement leaves neither the schema change nor the record behind.
//!
//! Migration bodies use unqualified names. When a target schema is set, the
//! transaction's `search_path` points at it while the body runs.

use std::collections::BTreeMap;

use sqlx::postgres::PgPool;
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::file::MigrationFile;
use crate::history::{AppliedMigration, MigrationHistory};

/// What [`MigrationExecutor::apply`] did with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The body ran and was recorded.
    Applied,
    /// The file was already applied with the same checksum.
    AlreadyApplied,
    /// Dry run: the body was printed, nothing ran.
    DryRun,
}

/// Applied state of one migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migration name.
    pub name: String,
    /// History record, if applied.
    pub applied: Option<AppliedMigration>,
    /// The file no longer matches its header or the recorded checksum.
    pub drifted: bool,
}

impl MigrationStatus {
    /// Whether the migration has been applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.applied.is_some()
    }
}

/// Executes migrations against a database.
#[derive(Debug, Clone)]
pub struct MigrationExecutor {
    pool: PgPool,
    history: MigrationHistory,
    dry_run: bool,
    schema: Option<String>,
}

impl MigrationExecutor {
    /// Creates a new migration executor.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let history = MigrationHistory::new(pool.clone());
        Self {
            pool,
            history,
            dry_run: false,
            schema: None,
        }
    }

    /// Runs migration bodies with `search_path` set to `schema`.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Enables dry-run mode (SQL is printed but not executed).
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Ensures the migrations history table exists.
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn init(&self) -> Result<()> {
        if !self.dry_run {
            self.history.ensure_table().await?;
        }
        Ok(())
    }

    /// Returns the migration history.
    #[must_use]
    pub const fn history(&self) -> &MigrationHistory {
        &self.history
    }

    /// Applies a single migration file.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::ChecksumMismatch`] if the file was edited
    /// since it was generated, or if it was applied earlier with a different
    /// body. Database errors roll the transaction back.
    pub async fn apply(&self, file: &MigrationFile) -> Result<ApplyOutcome> {
        file.verify()?;

        if let Some(applied) = self.recorded(&file.name).await? {
            if applied.checksum != file.checksum {
                return Err(MigrateError::ChecksumMismatch {
                    name: file.name.clone(),
                    expected: applied.checksum,
                    actual: file.checksum.clone(),
                });
            }
            debug!(name = %file.name, "migration already applied, skipping");
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        info!(name = %file.name, "Applying migration");

        if self.dry_run {
            println!("-- {}", file.name);
            print!("{}", file.body);
            return Ok(ApplyOutcome::DryRun);
        }

        let mut tx = self.pool.begin().await?;
        // Recorded first: the history table lives on the default search path.
        MigrationHistory::record_applied(&mut tx, &file.name, &file.checksum).await?;
        if let Some(schema) = &self.schema {
            debug!(schema = %schema, "setting search_path");
            sqlx::query("SELECT set_config('search_path', format('%I', $1::text), true)")
                .bind(schema)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::raw_sql(&file.body).execute(&mut *tx).await?;
        tx.commit().await?;

        info!(name = %file.name, checksum = %file.checksum, "Migration applied successfully");
        Ok(ApplyOutcome::Applied)
    }

    /// Applies files in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first error; files before it stay applied.
    pub async fn apply_all(&self, files: &[MigrationFile]) -> Result<Vec<ApplyOutcome>> {
        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            outcomes.push(self.apply(file).await?);
        }
        Ok(outcomes)
    }

    /// Returns files that have not been applied yet.
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn pending<'a>(&self, files: &'a [MigrationFile]) -> Result<Vec<&'a MigrationFile>> {
        let applied = self.applied_by_name().await?;
        Ok(files
            .iter()
            .filter(|f| !applied.contains_key(&f.name))
            .collect())
    }

    /// Pairs every file with its history record.
    ///
    /// Records without a file on disk are logged and left out.
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn status(&self, files: &[MigrationFile]) -> Result<Vec<MigrationStatus>> {
        let mut applied = self.applied_by_name().await?;
        let statuses = files
            .iter()
            .map(|file| {
                let record = applied.remove(&file.name);
                let drifted = file.verify().is_err()
                    || record.as_ref().is_some_and(|r| r.checksum != file.checksum);
                MigrationStatus {
                    name: file.name.clone(),
                    applied: record,
                    drifted,
                }
            })
            .collect();
        for name in applied.keys() {
            warn!(name = %name, "applied migration has no file");
        }
        Ok(statuses)
    }

    /// A dry run never creates the history table, so it may be missing.
    async fn history_ready(&self) -> Result<bool> {
        if self.dry_run {
            self.history.exists().await
        } else {
            Ok(true)
        }
    }

    async fn recorded(&self, name: &str) -> Result<Option<AppliedMigration>> {
        if self.history_ready().await? {
            self.history.get(name).await
        } else {
            Ok(None)
        }
    }

    async fn applied_by_name(&self) -> Result<BTreeMap<String, AppliedMigration>> {
        if !self.history_ready().await? {
            return Ok(BTreeMap::new());
        }
        Ok(self
            .history
            .get_applied()
            .await?
            .into_iter()
            .map(|m| (m.name.clone(), m))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use schemata_core::MigrationScript;
    use sqlx::postgres::PgPoolOptions;

    /// Connects to `DATABASE_URL` and resets the objects the tests touch.
    async fn create_test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .expect("Failed to connect to Postgres");
        sqlx::raw_sql(
            "DROP TABLE IF EXISTS schemata_migrations;
             DROP TABLE IF EXISTS executor_probe;
             DROP SCHEMA IF EXISTS executor_media CASCADE;",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn migration(name: &str, statements: &[&str]) -> MigrationFile {
        let script = MigrationScript::new(statements.iter().map(ToString::to_string).collect());
        MigrationFile::new(
            name,
            &script,
            Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
        )
    }

    async fn probe_exists(pool: &PgPool) -> bool {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT to_regclass('executor_probe') IS NOT NULL")
                .fetch_one(pool)
                .await
                .unwrap();
        exists
    }

    #[test]
    fn test_status_flags() {
        let status = MigrationStatus {
            name: "20261018120000_initial".into(),
            applied: None,
            drifted: false,
        };
        assert!(!status.is_applied());
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database in DATABASE_URL"]
    async fn test_apply_records_history_once() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool.clone());
        executor.init().await.unwrap();

        let file = migration(
            "create probe",
            &["CREATE TABLE executor_probe (id int4 NOT NULL)"],
        );
        assert_eq!(executor.apply(&file).await.unwrap(), ApplyOutcome::Applied);
        assert!(probe_exists(&pool).await);
        assert_eq!(
            executor.apply(&file).await.unwrap(),
            ApplyOutcome::AlreadyApplied
        );
        assert_eq!(executor.history().count_applied().await.unwrap(), 1);
        assert!(executor
            .pending(std::slice::from_ref(&file))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database in DATABASE_URL"]
    async fn test_failed_statement_rolls_back() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool.clone());
        executor.init().await.unwrap();

        let file = migration(
            "broken",
            &[
                "CREATE TABLE executor_probe (id int4 NOT NULL)",
                "ALTER TABLE executor_probe ADD COLUMN id int4",
            ],
        );
        assert!(matches!(
            executor.apply(&file).await,
            Err(MigrateError::Database(_))
        ));
        assert!(!probe_exists(&pool).await);
        assert_eq!(executor.history().count_applied().await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database in DATABASE_URL"]
    async fn test_recorded_checksum_drift_is_refused() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool.clone());
        executor.init().await.unwrap();

        let file = migration("probe", &["CREATE TABLE executor_probe (id int4)"]);
        executor.apply(&file).await.unwrap();

        // Same name, regenerated with a different body.
        let regenerated = migration("probe", &["CREATE TABLE executor_probe (id int8)"]);
        let err = executor.apply(&regenerated).await.unwrap_err();
        assert_eq!(err.kind(), "ChecksumMismatchError");

        let statuses = executor.status(&[regenerated]).await.unwrap();
        assert!(statuses[0].is_applied());
        assert!(statuses[0].drifted);
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database in DATABASE_URL"]
    async fn test_body_runs_in_target_schema() {
        let pool = create_test_pool().await;
        sqlx::raw_sql("CREATE SCHEMA executor_media")
            .execute(&pool)
            .await
            .unwrap();
        let executor = MigrationExecutor::new(pool.clone()).schema("executor_media");
        executor.init().await.unwrap();

        let file = migration("probe", &["CREATE TABLE executor_probe (id int4)"]);
        assert_eq!(executor.apply(&file).await.unwrap(), ApplyOutcome::Applied);

        let (in_media,): (bool,) =
            sqlx::query_as("SELECT to_regclass('executor_media.executor_probe') IS NOT NULL")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(in_media);
        assert!(!probe_exists(&pool).await);
        assert_eq!(executor.history().count_applied().await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database in DATABASE_URL"]
    async fn test_dry_run_changes_nothing() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool.clone()).dry_run(true);
        executor.init().await.unwrap();

        let file = migration("probe", &["CREATE TABLE executor_probe (id int4)"]);
        assert_eq!(executor.apply(&file).await.unwrap(), ApplyOutcome::DryRun);
        assert!(!probe_exists(&pool).await);
    }
}
