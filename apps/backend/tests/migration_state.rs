//! Reading the migration ledger.

mod common;

use backend::db::Session;
use backend::{ErrorKind, MigrationStateReader};
use db_infra::run_migrations;
use migration::MigrationCommand;

#[tokio::test]
async fn fresh_database_has_everything_pending() {
    let (_db, provider) = common::bare_provider(1).await;
    let reader = MigrationStateReader::default();
    let known = migration::known_migrations();

    let (exists, applied, pending, exists_after) = provider
        .with_session(move |s| {
            Box::pin(async move {
                let exists = reader.ledger_exists(s).await?;
                let applied = reader.list_applied(s).await?;
                let pending = reader.pending_count(s, &known).await?;
                let exists_after = reader.ledger_exists(s).await?;
                Ok((exists, applied, pending, exists_after))
            })
        })
        .await
        .unwrap();

    assert!(!exists);
    assert!(applied.is_empty());
    assert_eq!(pending, migration::known_migrations().len());
    assert!(!exists_after, "reading must not create the ledger");
}

#[tokio::test]
async fn migrated_database_lists_applied_in_order() {
    let (_db, provider) = common::migrated_provider(1).await;
    let reader = MigrationStateReader::default();
    let known = migration::known_migrations();
    let known_for_check = known.clone();

    let (applied, pending) = provider
        .with_session(move |s| {
            Box::pin(async move {
                Ok((
                    reader.list_applied(s).await?,
                    reader.pending_count(s, &known).await?,
                ))
            })
        })
        .await
        .unwrap();

    assert_eq!(pending, 0);
    let ids: Vec<String> = applied.iter().map(|r| r.identifier.clone()).collect();
    assert_eq!(ids, known_for_check);
    assert!(applied.iter().all(|r| !r.description.is_empty()));
    assert!(applied.windows(2).all(|w| w[0].applied_at <= w[1].applied_at));
}

#[tokio::test]
async fn rolling_back_one_leaves_one_pending() {
    let (_db, provider) = common::migrated_provider(1).await;
    run_migrations(provider.pool(), MigrationCommand::Down)
        .await
        .unwrap();

    let reader = MigrationStateReader::default();
    let known = migration::known_migrations();
    let pending = provider
        .with_session(move |s| Box::pin(async move { reader.pending_count(s, &known).await }))
        .await
        .unwrap();
    assert_eq!(pending, 1);
}

#[tokio::test]
async fn unknown_ledger_entry_is_reported_as_drift() {
    let (_db, provider) = common::migrated_provider(1).await;
    let reader = MigrationStateReader::default();
    let known = migration::known_migrations();

    let (pending, summary) = provider
        .with_session(move |s| {
            Box::pin(async move {
                s.execute(s.statement(
                    "INSERT INTO seaql_migrations (version, applied_at) VALUES (?, ?)",
                    vec!["m29990101_000001_from_elsewhere".into(), 4_102_444_800i64.into()],
                ))
                .await?;
                let pending = reader.pending_count(s, &known).await;
                let summary = reader.summary(s, &known).await?;
                Ok((pending, summary))
            })
        })
        .await
        .unwrap();

    assert_eq!(pending.unwrap_err().kind(), ErrorKind::InvalidInput);
    assert_eq!(summary.drift, vec!["m29990101_000001_from_elsewhere".to_owned()]);
    assert_eq!(summary.pending_count, None);
    assert_eq!(summary.latest.as_deref(), Some("m29990101_000001_from_elsewhere"));
    assert!(!summary.is_current());
}

#[tokio::test]
async fn custom_ledger_table_is_read_independently() {
    let (_db, provider) = common::migrated_provider(1).await;
    let reader = MigrationStateReader::with_ledger_table("other_ledger").unwrap();

    let applied = provider
        .with_session(move |s| Box::pin(async move { reader.list_applied(s).await }))
        .await
        .unwrap();
    assert!(applied.is_empty());
}
