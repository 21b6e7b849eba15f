pub use sea_orm_migration::prelude::*;
pub use sea_orm::{ConnectionTrait, DatabaseConnection};

mod m20250801_000001_create_politicians; // keep filename + module name in sync
mod m20250801_000002_create_statements;

/// Name of the ledger table sea-orm writes applied migrations into.
pub const LEDGER_TABLE: &str = "seaql_migrations";

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250801_000001_create_politicians::Migration),
            Box::new(m20250801_000002_create_statements::Migration),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationCommand {
    Up,
    Down,
    Fresh,
    Reset,
    Refresh,
    Status,
}

/// Identifiers of every migration this build knows about, in application order.
pub fn known_migrations() -> Vec<String> {
    Migrator::migrations()
        .iter()
        .map(|m| m.name().to_string())
        .collect()
}

/// Human description derived from a migration identifier.
///
/// `m20250801_000001_create_politicians` becomes `create politicians`.
/// Identifiers that do not follow the `m<date>_<seq>_<words>` shape are
/// returned unchanged.
pub fn describe_migration(identifier: &str) -> String {
    let mut parts = identifier.splitn(3, '_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(date), Some(seq), Some(words))
            if date.starts_with('m')
                && date[1..].chars().all(|c| c.is_ascii_digit())
                && seq.chars().all(|c| c.is_ascii_digit()) =>
        {
            words.replace('_', " ")
        }
        _ => identifier.to_string(),
    }
}

/// Run one migrator command against `db`, logging the ledger before and after.
///
/// Every command except `Status` installs the ledger table if it is missing.
pub async fn migrate(db: &DatabaseConnection, command: MigrationCommand) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let defined = Migrator::migrations().len();
    let applied_before = count_applied_migrations(db).await?;
    tracing::info!(cmd = ?command, ?backend, defined, applied = applied_before, "migrator=start");

    let result = match command {
        MigrationCommand::Up => Migrator::up(db, None).await,
        MigrationCommand::Down => Migrator::down(db, Some(1)).await,
        MigrationCommand::Fresh => Migrator::fresh(db).await,
        MigrationCommand::Reset => Migrator::reset(db).await,
        MigrationCommand::Refresh => Migrator::refresh(db).await,
        MigrationCommand::Status => Migrator::status(db).await,
    };

    if let Err(e) = result {
        tracing::error!(cmd = ?command, ?backend, error = %e, "migrator=failed");
        return Err(e);
    }

    if command != MigrationCommand::Status {
        let applied_after = count_applied_migrations(db).await?;
        tracing::info!(cmd = ?command, defined, applied = applied_after, "migrator=done");
    }
    Ok(())
}

/// Count the number of migrations that have been applied to the database.
/// Returns 0 if the migration table doesn't exist yet.
pub async fn count_applied_migrations(db: &DatabaseConnection) -> Result<usize, DbErr> {
    match Migrator::get_applied_migrations(db).await {
        Ok(migrations) => Ok(migrations.len()),
        Err(DbErr::Exec(_)) | Err(DbErr::Query(_)) => Ok(0),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_migrations_are_ordered_and_unique() {
        let known = known_migrations();
        assert_eq!(
            known,
            vec![
                "m20250801_000001_create_politicians".to_string(),
                "m20250801_000002_create_statements".to_string(),
            ]
        );
        let mut sorted = known.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, known);
    }

    #[test]
    fn describe_strips_version_prefix() {
        assert_eq!(
            describe_migration("m20250801_000002_create_statements"),
            "create statements"
        );
        assert_eq!(describe_migration("hand_rolled"), "hand_rolled");
        assert_eq!(describe_migration("baseline"), "baseline");
    }

    #[tokio::test]
    async fn up_then_reset_on_sqlite_file() -> Result<(), DbErr> {
        let dir = tempfile::tempdir().map_err(|e| DbErr::Custom(e.to_string()))?;
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("mig.db").display());
        let db = sea_orm::Database::connect(&url).await?;

        assert_eq!(count_applied_migrations(&db).await?, 0);

        migrate(&db, MigrationCommand::Up).await?;
        assert_eq!(count_applied_migrations(&db).await?, 2);

        migrate(&db, MigrationCommand::Down).await?;
        assert_eq!(count_applied_migrations(&db).await?, 1);

        migrate(&db, MigrationCommand::Reset).await?;
        assert_eq!(count_applied_migrations(&db).await?, 0);
        Ok(())
    }
}
