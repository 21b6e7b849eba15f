#![allow(dead_code)]

use std::time::Duration;

use backend::db::{AsyncSessionProvider, Session};
use backend::AppError;
use backend_test_support::TempSqlite;
use db_infra::{run_migrations, DbConfig, RuntimeEnv};
use migration::MigrationCommand;

// Logging is auto-installed for every test binary
#[ctor::ctor]
fn init_logging() {
    backend_test_support::logging::init();
}

pub fn file_config(db: &TempSqlite, pool_size: u32) -> DbConfig {
    DbConfig::new(&db.url())
        .expect("valid sqlite url")
        .with_env(RuntimeEnv::Test)
        .with_pool_size(pool_size)
        .with_acquire_timeout(Duration::from_millis(500))
        .with_retry_interval(Duration::from_millis(10))
}

/// A fresh file database with no migrations applied.
pub async fn bare_provider(pool_size: u32) -> (TempSqlite, AsyncSessionProvider) {
    let db = TempSqlite::new().expect("tempdir");
    let provider = AsyncSessionProvider::connect(file_config(&db, pool_size))
        .await
        .expect("connect");
    (db, provider)
}

/// A fresh file database with every migration applied.
pub async fn migrated_provider(pool_size: u32) -> (TempSqlite, AsyncSessionProvider) {
    let (db, provider) = bare_provider(pool_size).await;
    run_migrations(provider.pool(), MigrationCommand::Up)
        .await
        .expect("migrate up");
    (db, provider)
}

pub async fn insert_politician<S: Session + ?Sized>(s: &S, name: &str) -> Result<u64, AppError> {
    s.execute(s.statement(
        "INSERT INTO politicians (name, party) VALUES (?, ?)",
        vec![name.into(), "Independent".into()],
    ))
    .await
}

pub async fn count_politicians(provider: &AsyncSessionProvider) -> i64 {
    provider
        .with_session(|s| {
            Box::pin(async move {
                let row = s
                    .query_one(s.statement("SELECT COUNT(*) AS n FROM politicians", vec![]))
                    .await?
                    .ok_or_else(AppError::internal)?;
                Ok(row.try_get::<i64>("", "n")?)
            })
        })
        .await
        .expect("count politicians")
}
