//! Repository behaviour against an in-memory SQLite database.

mod test_utils;

use anyhow::Result;
use pds_sync::connectors::credentials::ConnectionCredentials;
use pds_sync::error::SyncError;
use pds_sync::models::sync_run::SyncStatus;
use pds_sync::repositories::connection::ConnectionChanges;
use pds_sync::repositories::sync_run::RunTotals;
use pds_sync::repositories::table_config::{ColumnDraft, ColumnFlagUpdate, TableConfigChanges};
use pds_sync::repositories::{
    ConnectionRepository, RepositoryError, SyncRunRepository, TableConfigRepository,
};
use serde_json::json;
use test_utils::*;

#[tokio::test]
async fn connection_credentials_round_trip_through_encryption() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let id = create_pds_connection(&db, "https://pds.example.com/").await?;
    let repo = ConnectionRepository::new(db.clone(), crypto_key());

    let model = repo.get(id).await?;
    assert!(!String::from_utf8_lossy(&model.credentials_ciphertext).contains("secret"));

    match repo.credentials(&model)? {
        ConnectionCredentials::Pds(creds) => {
            assert_eq!(creds.base_url(), "https://pds.example.com");
            assert_eq!(creds.password, "secret");
        }
        other => panic!("unexpected credentials {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn connection_update_reparses_credentials_for_its_kind() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let id = create_relational_connection(&db).await?;
    let repo = ConnectionRepository::new(db.clone(), crypto_key());

    let err = repo
        .update(
            id,
            ConnectionChanges {
                credentials: Some(json!({"url": "https://pds", "username": "u", "password": "p"})),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Credentials(_)));

    let updated = repo
        .update(
            id,
            ConnectionChanges {
                name: Some("warehouse-eu".to_string()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.name, "warehouse-eu");
    Ok(())
}

#[tokio::test]
async fn connection_in_use_cannot_be_deleted() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let source = create_pds_connection(&db, "https://pds.example.com").await?;
    let destination = create_relational_connection(&db).await?;
    let table = create_table_config(&db, source, destination, "CUSTOMERS", 100, 10, &[]).await?;
    let repo = ConnectionRepository::new(db.clone(), crypto_key());

    let err = repo.delete(destination).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));

    TableConfigRepository::new(db.clone()).delete(table).await?;
    repo.delete(destination).await?;
    assert!(repo.find(destination).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn table_config_rejects_swapped_connections() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let source = create_pds_connection(&db, "https://pds.example.com").await?;
    let destination = create_relational_connection(&db).await?;

    let err = create_table_config(&db, destination, source, "CUSTOMERS", 100, 10, &[])
        .await
        .unwrap_err();
    let err = err.downcast::<RepositoryError>()?;
    assert!(matches!(err, RepositoryError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn table_config_update_enforces_page_size_bounds() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let source = create_pds_connection(&db, "https://pds.example.com").await?;
    let destination = create_relational_connection(&db).await?;
    let table = create_table_config(&db, source, destination, "CUSTOMERS", 100, 10, &[]).await?;
    let repo = TableConfigRepository::new(db.clone());

    let err = repo
        .update(
            table,
            TableConfigChanges {
                page_size: Some(10_001),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Validation { field: "page_size", .. }));

    let updated = repo
        .update(
            table,
            TableConfigChanges {
                page_size: Some(10_000),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.page_size, 10_000);
    Ok(())
}

#[tokio::test]
async fn copy_duplicates_columns_under_new_name() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let source = create_pds_connection(&db, "https://pds.example.com").await?;
    let destination = create_relational_connection(&db).await?;
    let table = create_table_config(
        &db,
        source,
        destination,
        "CUSTOMERS",
        100,
        10,
        &[("ID", "integer", true), ("NAME", "string", false)],
    )
    .await?;
    let repo = TableConfigRepository::new(db.clone());

    let copy = repo.copy(table, "customers-copy").await?;
    assert_ne!(copy.id, table);
    assert_eq!(copy.table_name, "CUSTOMERS");

    let original: Vec<_> = repo
        .list_columns(table)
        .await?
        .into_iter()
        .map(|c| (c.column_name, c.is_primary_key, c.position))
        .collect();
    let copied: Vec<_> = repo
        .list_columns(copy.id)
        .await?
        .into_iter()
        .map(|c| (c.column_name, c.is_primary_key, c.position))
        .collect();
    assert_eq!(original, copied);

    let err = repo.copy(table, "customers-copy").await.unwrap_err();
    assert!(matches!(err, RepositoryError::Database(_)));
    Ok(())
}

#[tokio::test]
async fn upsert_by_name_updates_in_place_and_appends() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let source = create_pds_connection(&db, "https://pds.example.com").await?;
    let destination = create_relational_connection(&db).await?;
    let table = create_table_config(
        &db,
        source,
        destination,
        "CUSTOMERS",
        100,
        10,
        &[("ID", "string", false)],
    )
    .await?;
    let repo = TableConfigRepository::new(db.clone());

    let summary = repo
        .upsert_columns(
            table,
            vec![
                ColumnDraft {
                    column_name: "ID".to_string(),
                    data_type: Some("Integer".to_string()),
                    active: None,
                    is_primary_key: Some(true),
                },
                ColumnDraft {
                    column_name: "EMAIL".to_string(),
                    data_type: None,
                    active: Some(false),
                    is_primary_key: None,
                },
            ],
        )
        .await?;
    assert_eq!((summary.created, summary.updated), (1, 1));

    let columns = repo.list_columns(table).await?;
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0].column_name, "ID");
    assert_eq!(columns[0].data_type, "integer");
    assert!(columns[0].is_primary_key);
    assert_eq!(columns[1].column_name, "EMAIL");
    assert_eq!(columns[1].data_type, "string");
    assert!(!columns[1].active);

    let active = repo.active_columns(table).await?;
    assert_eq!(active.len(), 1);
    Ok(())
}

#[tokio::test]
async fn upsert_rejects_duplicate_names_without_writing() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let source = create_pds_connection(&db, "https://pds.example.com").await?;
    let destination = create_relational_connection(&db).await?;
    let table = create_table_config(&db, source, destination, "CUSTOMERS", 100, 10, &[]).await?;
    let repo = TableConfigRepository::new(db.clone());

    let draft = |name: &str| ColumnDraft {
        column_name: name.to_string(),
        data_type: None,
        active: None,
        is_primary_key: None,
    };
    let err = repo
        .upsert_columns(table, vec![draft("A"), draft("B"), draft("A")])
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Validation { .. }));
    assert!(repo.list_columns(table).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn bulk_flags_apply_atomically() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let source = create_pds_connection(&db, "https://pds.example.com").await?;
    let destination = create_relational_connection(&db).await?;
    let table = create_table_config(
        &db,
        source,
        destination,
        "CUSTOMERS",
        100,
        10,
        &[("ID", "integer", false), ("NAME", "string", false)],
    )
    .await?;
    let repo = TableConfigRepository::new(db.clone());
    let columns = repo.list_columns(table).await?;

    let updated = repo
        .bulk_update_flags(
            table,
            vec![
                ColumnFlagUpdate {
                    id: columns[0].id,
                    active: None,
                    is_primary_key: Some(true),
                },
                ColumnFlagUpdate {
                    id: columns[1].id,
                    active: Some(false),
                    is_primary_key: None,
                },
            ],
        )
        .await?;
    assert!(updated[0].is_primary_key);
    assert!(!updated[1].active);

    // An unknown id rolls the whole batch back
    let err = repo
        .bulk_update_flags(
            table,
            vec![
                ColumnFlagUpdate {
                    id: columns[1].id,
                    active: Some(true),
                    is_primary_key: None,
                },
                ColumnFlagUpdate {
                    id: uuid::Uuid::new_v4(),
                    active: Some(true),
                    is_primary_key: None,
                },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
    assert!(!repo.list_columns(table).await?[1].active);
    Ok(())
}

#[tokio::test]
async fn ledger_finalizes_exactly_once() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let source = create_pds_connection(&db, "https://pds.example.com").await?;
    let destination = create_relational_connection(&db).await?;
    let table = create_table_config(&db, source, destination, "CUSTOMERS", 100, 10, &[]).await?;
    let runs = SyncRunRepository::new((*db).clone());

    let run = runs.start(table, 4).await?;
    assert_eq!(run.status, SyncStatus::InProgress);
    assert!(run.finished_at.is_none());

    let err = runs.delete(run.id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));

    let totals = RunTotals {
        creates: 5,
        updates: 2,
        skipped: 1,
    };
    let finished = runs
        .finish(run.id, SyncStatus::Completed, totals, None)
        .await?;
    assert_eq!(finished.status, SyncStatus::Completed);
    assert_eq!(
        (finished.total_creates, finished.total_updates, finished.total_skipped),
        (5, 2, 1)
    );

    let second = runs
        .finish(
            run.id,
            SyncStatus::Failed,
            RunTotals::default(),
            Some("late".to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(second, SyncError::Ledger(_)));

    let stored = runs.get(run.id).await?;
    assert_eq!(stored.status, SyncStatus::Completed);
    assert_eq!(stored.total_creates, 5);
    assert!(stored.error_message.is_none());

    runs.delete(run.id).await?;
    assert!(runs.list_for_table(table, 10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn orphaned_runs_are_failed_and_latest_is_reported() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let source = create_pds_connection(&db, "https://pds.example.com").await?;
    let destination = create_relational_connection(&db).await?;
    let first = create_table_config(&db, source, destination, "CUSTOMERS", 100, 10, &[]).await?;
    let second = create_table_config(&db, source, destination, "ORDERS", 100, 10, &[]).await?;
    let runs = SyncRunRepository::new((*db).clone());

    let done = runs.start(first, 1).await?;
    runs.finish(done.id, SyncStatus::Completed, RunTotals::default(), None)
        .await?;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let dangling = runs.start(first, 1).await?;
    let other = runs.start(second, 1).await?;

    assert_eq!(runs.fail_orphaned().await?, 2);
    let dangling = runs.get(dangling.id).await?;
    assert_eq!(dangling.status, SyncStatus::Failed);
    assert!(dangling.error_message.is_some());
    assert_eq!(runs.get(other.id).await?.status, SyncStatus::Failed);
    assert_eq!(runs.get(done.id).await?.status, SyncStatus::Completed);

    let latest = runs.latest_per_table().await?;
    assert_eq!(latest.len(), 2);
    let latest_first = latest.iter().find(|r| r.table_config_id == first).unwrap();
    assert_eq!(latest_first.id, dangling.id);
    Ok(())
}

#[tokio::test]
async fn deleting_a_configuration_keeps_its_run_history() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let source = create_pds_connection(&db, "https://pds.example.com").await?;
    let destination = create_relational_connection(&db).await?;
    let table = create_table_config(
        &db,
        source,
        destination,
        "CUSTOMERS",
        100,
        10,
        &[("ID", "integer", true)],
    )
    .await?;
    let tables = TableConfigRepository::new(db.clone());
    let runs = SyncRunRepository::new((*db).clone());

    let run = runs.start(table, 1).await?;
    runs.finish(
        run.id,
        SyncStatus::Completed,
        RunTotals {
            creates: 3,
            updates: 0,
            skipped: 0,
        },
        None,
    )
    .await?;

    tables.delete(table).await?;
    assert!(tables.find(table).await?.is_none());
    assert!(tables.list_columns(table).await?.is_empty());

    let kept = runs.get(run.id).await?;
    assert_eq!(kept.table_config_id, table);
    assert_eq!(kept.status, SyncStatus::Completed);
    assert_eq!(kept.total_creates, 3);
    assert_eq!(runs.list_for_table(table, 10).await?.len(), 1);
    assert!(runs.latest_per_table().await?.iter().any(|r| r.id == run.id));

    runs.delete(run.id).await?;
    assert!(runs.list_for_table(table, 10).await?.is_empty());
    Ok(())
}
