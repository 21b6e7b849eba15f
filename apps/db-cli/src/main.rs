use std::process::ExitCode;

use backend::db::{BlockingSessionProvider, Session};
use backend::{AppError, MigrationStateReader};
use clap::{Parser, Subcommand};
use db_infra::{run_migrations, DbConfig, DbKind};
use migration::MigrationCommand;
use tracing::error;

#[derive(Parser)]
#[command(name = "saucebottle-db")]
#[command(about = "Sauce Bottle database utility")]
struct Args {
    /// Connection URL; overrides DATABASE_URL.
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Copy, Debug)]
enum Command {
    /// Verify the database answers and print engine details
    Check,
    /// Print the effective configuration
    Info,
    /// List applied and pending migrations
    Status,
    /// Apply all pending migrations
    Up,
    /// Roll back the most recent migration
    Down,
    /// Drop all tables and re-apply every migration
    Fresh,
    /// Roll back every applied migration
    Reset,
    /// Roll back every migration, then apply them again
    Refresh,
}

impl Command {
    fn migration(self) -> Option<MigrationCommand> {
        match self {
            Command::Up => Some(MigrationCommand::Up),
            Command::Down => Some(MigrationCommand::Down),
            Command::Fresh => Some(MigrationCommand::Fresh),
            Command::Reset => Some(MigrationCommand::Reset),
            Command::Refresh => Some(MigrationCommand::Refresh),
            Command::Check | Command::Info | Command::Status => None,
        }
    }
}

fn load_config(args: &Args) -> Result<DbConfig, String> {
    let lookup_url = args.database_url.clone();
    DbConfig::from_lookup(|name| match name {
        "DATABASE_URL" if lookup_url.is_some() => lookup_url.clone(),
        other => std::env::var(other).ok(),
    })
    .map_err(|e| e.to_string())
}

fn describe(err: &AppError) -> String {
    format!("{} ({})", err.message(), err.kind())
}

fn info(config: &DbConfig) {
    println!("url:              {}", config.sanitized_url());
    println!("engine:           {}", config.kind().engine());
    println!("environment:      {}", config.env);
    println!("pool_size:        {}", config.pool_size);
    println!("acquire_timeout:  {} ms", config.acquire_timeout.as_millis());
    println!("acquire_attempts: {}", config.acquire_attempts);
    println!("retry_interval:   {} ms", config.retry_interval.as_millis());
    println!("echo:             {}", config.echo);
}

fn check(provider: &BlockingSessionProvider) -> Result<(), AppError> {
    let version = provider.with_session(|s| {
        let sql = match s.backend() {
            sea_orm::DatabaseBackend::Sqlite => "SELECT sqlite_version() AS version",
            _ => "SELECT version() AS version",
        };
        let row = s.query_one(s.statement(sql, vec![]))?;
        Ok(match row {
            Some(row) => row.try_get::<String>("", "version")?,
            None => "unknown".to_owned(),
        })
    })?;
    let stats = provider.pool().stats();
    println!("connected:  yes");
    println!("engine:     {}", provider.pool().kind().engine());
    println!("version:    {version}");
    println!("pool:       {}/{} in use", stats.outstanding, stats.size);
    Ok(())
}

fn status(provider: &BlockingSessionProvider) -> Result<(), AppError> {
    let reader = MigrationStateReader::default();
    let known = migration::known_migrations();
    let (applied, summary) = provider.with_session(|s| {
        Ok((
            reader.list_applied_blocking(s)?,
            reader.summary_blocking(s, &known)?,
        ))
    })?;

    if !summary.ledger_present {
        println!("ledger {} not found: database has never been migrated", reader.ledger_table());
    }
    for record in &applied {
        println!(
            "applied  {}  {}  ({})",
            record.identifier,
            record.applied_at,
            record.description
        );
    }
    let applied_ids: Vec<&str> = applied.iter().map(|r| r.identifier.as_str()).collect();
    for id in known.iter().filter(|k| !applied_ids.contains(&k.as_str())) {
        println!("pending  {id}  ({})", migration::describe_migration(id));
    }
    for id in &summary.drift {
        println!("unknown  {id}  (not part of this build)");
    }
    match summary.pending_count {
        Some(n) => println!("{} applied, {n} pending", summary.applied_count),
        None => println!("{} applied, ledger has drifted", summary.applied_count),
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,migration=info,db_infra=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    if let Command::Info = args.command {
        info(&config);
        return ExitCode::SUCCESS;
    }

    if config.kind() == DbKind::SqliteMemory && args.command.migration().is_some() {
        eprintln!("In-memory databases vanish when this command exits; use a file or Postgres URL.");
        return ExitCode::from(2);
    }

    let provider = match BlockingSessionProvider::connect(config) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Could not connect: {}", describe(&e));
            return ExitCode::FAILURE;
        }
    };

    let outcome = match args.command {
        Command::Check => check(&provider),
        Command::Status => status(&provider),
        Command::Info => Ok(()),
        cmd => match cmd.migration() {
            Some(migration_cmd) => provider
                .block_on(run_migrations(provider.pool(), migration_cmd))
                .map_err(AppError::from)
                .and_then(|()| status(&provider)),
            None => Ok(()),
        },
    };

    provider.close();
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:?} failed: {}", args.command, describe(&e));
            ExitCode::FAILURE
        }
    }
}
