//! schemata CLI
//!
//! Command-line tool that turns a declared schema into migration files and
//! applies them.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use schemata_core::diff::{ColumnRenameHint, RenameHint};
use schemata_core::{
    compile, diff_with, register_declaration, CompileError, DatabaseDeclaration, DiffOptions,
    MigrationScript, PostgresDialect, SchemaGraph,
};
use schemata_migrate::prelude::*;

/// Declarative schema migrations for Postgres.
#[derive(Parser)]
#[command(name = "schemata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff the declared schema against the database and write a migration.
    Generate(GenerateArgs),

    /// Apply pending migration files.
    Apply {
        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Check the declaration and migration files without a database.
    Validate,

    /// Show applied and pending migrations.
    Status,

    /// Print the live schema as a JSON declaration.
    Introspect {
        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Migration name/description.
    name: String,

    /// Write the migration even if it drops or renames objects.
    #[arg(long)]
    allow_destructive: bool,

    /// Confirmed object rename, `kind:old=new` (e.g. `table:photo=asset`).
    #[arg(long = "rename", value_name = "KIND:OLD=NEW")]
    renames: Vec<RenameHint>,

    /// Confirmed column rename, `table.old=new`.
    #[arg(long = "rename-column", value_name = "TABLE.OLD=NEW")]
    column_renames: Vec<ColumnRenameHint>,

    /// Allow column type changes that may lose data.
    #[arg(long)]
    allow_lossy: bool,

    /// Print the migration instead of writing it.
    #[arg(long)]
    dry_run: bool,
}

impl GenerateArgs {
    fn diff_options(&self) -> DiffOptions {
        let mut options = DiffOptions::default().allow_lossy_type_changes(self.allow_lossy);
        for hint in &self.renames {
            options = options.rename(hint.clone());
        }
        for hint in &self.column_renames {
            options = options.rename_column(hint.clone());
        }
        options
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("error[LoggingError]: {err}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error[{}]: {err}", error_kind(&err));
            ExitCode::FAILURE
        }
    }
}

fn error_kind(err: &anyhow::Error) -> &'static str {
    if let Some(err) = err.downcast_ref::<MigrateError>() {
        err.kind()
    } else if let Some(err) = err.downcast_ref::<CompileError>() {
        err.kind()
    } else {
        "Error"
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = &cli.settings;
    match cli.command {
        Commands::Generate(args) => generate(settings, &args).await,
        Commands::Apply { dry_run } => apply(settings, dry_run).await,
        Commands::Validate => validate(settings),
        Commands::Status => status(settings).await,
        Commands::Introspect { output } => introspect(settings, output.as_deref()).await,
    }
}

/// Reads existing migration files; a missing directory means none yet.
fn existing_migrations(dir: &Path) -> Result<Vec<MigrationFile>> {
    match discover(dir) {
        Err(MigrateError::MigrationsDirNotFound(_)) => Ok(Vec::new()),
        other => other,
    }
}

/// Reads the declaration if the schema file exists.
fn declaration_if_present(settings: &Settings) -> Result<Option<DatabaseDeclaration>> {
    if settings.schema_file.exists() {
        load_declaration(&settings.schema_file).map(Some)
    } else {
        Ok(None)
    }
}

async fn generate(settings: &Settings, args: &GenerateArgs) -> anyhow::Result<()> {
    let declaration = load_declaration(&settings.schema_file)?;
    let declared = register_declaration(&declaration)?;
    let schema = settings.target_schema(Some(&declaration.schema));

    let pool = settings.connect().await?;
    let executor = MigrationExecutor::new(pool.clone());
    executor.init().await?;
    let files = existing_migrations(&settings.migrations_dir)?;
    let pending = executor.pending(&files).await?;
    if !pending.is_empty() {
        warn!(
            pending = pending.len(),
            "unapplied migration files exist; the new migration may repeat their changes"
        );
    }

    info!(schema, "introspecting");
    let live = PgIntrospector::new(pool, schema).live_graph().await?;
    let changes = diff_with(&declared, &live, &args.diff_options())?;

    for candidate in &changes.rename_candidates {
        warn!(%candidate, "possible rename; confirm with --rename or --rename-column");
    }
    if changes.is_empty() {
        info!("Schema is up to date, no migration written.");
        return Ok(());
    }
    if changes.has_destructive() && !args.allow_destructive {
        return Err(MigrateError::DestructiveChanges(
            changes
                .destructive_operations()
                .iter()
                .map(ToString::to_string)
                .collect(),
        )
        .into());
    }

    for operation in &changes {
        info!("  {operation}");
    }
    let script = MigrationScript::render(&changes, &PostgresDialect::new())?;
    let file = MigrationFile::new(&args.name, &script, Utc::now());
    if args.dry_run {
        println!("Would create migration: {}", file.file_name());
        println!("\n{}", file.render());
    } else {
        let path = file.write(&settings.migrations_dir)?;
        info!("Created migration: {}", path.display());
    }
    Ok(())
}

async fn apply(settings: &Settings, dry_run: bool) -> anyhow::Result<()> {
    let files = discover(&settings.migrations_dir)?;
    let declaration = declaration_if_present(settings)?;
    let schema = settings.target_schema(declaration.as_ref().map(|d| d.schema.as_str()));
    let pool = settings.connect().await?;
    let executor = MigrationExecutor::new(pool)
        .dry_run(dry_run)
        .schema(schema);
    executor.init().await?;

    if dry_run {
        info!("Dry run mode - SQL will be printed but not executed.");
    }

    let outcomes = executor.apply_all(&files).await?;
    let ran = outcomes
        .iter()
        .filter(|outcome| **outcome != ApplyOutcome::AlreadyApplied)
        .count();
    if ran == 0 {
        info!("No migrations to apply.");
    } else if !dry_run {
        info!(applied = ran, "Migrations applied successfully.");
    }
    Ok(())
}

fn validate(settings: &Settings) -> anyhow::Result<()> {
    let declaration = load_declaration(&settings.schema_file)?;
    let declared = register_declaration(&declaration)?;
    let (changes, _) = compile(
        &declared,
        &SchemaGraph::new(),
        &DiffOptions::default(),
        &PostgresDialect::new(),
    )?;
    info!(
        objects = declared.len(),
        operations = changes.len(),
        "declaration is valid"
    );

    let files = existing_migrations(&settings.migrations_dir)?;
    for file in &files {
        file.verify()?;
    }
    info!(migrations = files.len(), "migration checksums match");
    Ok(())
}

async fn status(settings: &Settings) -> anyhow::Result<()> {
    let files = existing_migrations(&settings.migrations_dir)?;
    let pool = settings.connect().await?;
    let executor = MigrationExecutor::new(pool.clone());
    executor.init().await?;

    let statuses = executor.status(&files).await?;
    if statuses.is_empty() {
        info!("No migration files found.");
    } else {
        println!("\nMigrations:");
        println!("{:-<60}", "");
        for status in &statuses {
            let mark = if status.is_applied() { "X" } else { " " };
            let applied_at = status
                .applied
                .as_ref()
                .map(|m| format!(" ({})", m.applied_at.format("%Y-%m-%d %H:%M:%S")))
                .unwrap_or_default();
            let drift = if status.drifted { " [checksum drift]" } else { "" };
            println!(" [{mark}] {}{applied_at}{drift}", status.name);
        }
        println!();
    }

    if let Some(declaration) = declaration_if_present(settings)? {
        let declared = register_declaration(&declaration)?;
        let schema = settings.target_schema(Some(&declaration.schema));
        let live = PgIntrospector::new(pool, schema).live_graph().await?;
        let changes = diff_with(&declared, &live, &DiffOptions::default())?;
        if changes.is_empty() {
            info!("Database matches {}.", settings.schema_file.display());
        } else {
            warn!(
                operations = changes.len(),
                "database differs from {}; run `schemata generate`",
                settings.schema_file.display()
            );
        }
    }
    Ok(())
}

async fn introspect(settings: &Settings, output: Option<&Path>) -> anyhow::Result<()> {
    let existing = declaration_if_present(settings)?;
    let schema = settings.target_schema(existing.as_ref().map(|d| d.schema.as_str()));
    let pool = settings.connect().await?;
    let live = PgIntrospector::new(pool, schema).live_graph().await?;
    let mut declaration = live.to_declaration(schema);
    declaration.schema = schema.to_string();
    let json = declaration_json(&declaration)?;

    match output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
