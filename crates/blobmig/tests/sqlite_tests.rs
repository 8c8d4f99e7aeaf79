//! End-to-end migrations between SQLite databases

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use blobmig::store::{RecordSource, SqliteStore};
use blobmig::{BatchMigrator, MigrationMode, MigrationUnit};
use blobmig_common::{Record, RecordId};
use common::{blob, init_test_tracing, seed, Workspace};
use sqlx::Row;

async fn parsed(store: &SqliteStore, unit: MigrationUnit) -> Vec<(i64, Option<String>)> {
    let sql = format!("SELECT id, parsed_content FROM {} ORDER BY id", unit.table_name());
    sqlx::query(&sql)
        .fetch_all(store.pool())
        .await
        .unwrap()
        .iter()
        .map(|row| (row.get("id"), row.get("parsed_content")))
        .collect()
}

fn drawings(ids: impl IntoIterator<Item = i64>) -> Vec<Record> {
    ids.into_iter()
        .map(|id| Record::new(id, 42, Some(blob(&format!(r#"{{"n": "{{\"id\": {}}}"}}"#, id)))))
        .collect()
}

#[tokio::test]
async fn test_copy_fills_parsed_content() {
    init_test_tracing();
    let ws = Workspace::new();
    let source = ws.sqlite("source.db").await;
    let dest = ws.sqlite("dest.db").await;
    seed(&source, MigrationUnit::Drawings, &drawings(1..=5)).await;

    let progress = ws.progress();
    let report = BatchMigrator::new(&source, &dest, &progress)
        .with_batch_size(2)
        .run(&[MigrationUnit::Drawings])
        .await
        .unwrap();

    assert!(report.all_done());
    assert_eq!(report.units[0].batches, 3);
    assert_eq!(report.units[0].rows, 5);

    let rows = parsed(&dest, MigrationUnit::Drawings).await;
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0], (1, Some(r#"{"n":{"id":1}}"#.to_string())));
    assert_eq!(ws.progress_json()["tv_drawings"], 5);

    // Content is copied byte for byte
    let copied = dest
        .fetch_one(MigrationUnit::Drawings, &RecordId::Int(4))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(copied.content, drawings([4])[0].content);
    assert_eq!(copied.owner_id, 42);
}

#[tokio::test]
async fn test_copy_resumes_from_cursor() {
    init_test_tracing();
    let ws = Workspace::new();
    let source = ws.sqlite("source.db").await;
    let dest = ws.sqlite("dest.db").await;
    seed(&source, MigrationUnit::Drawings, &drawings(1..=6)).await;
    std::fs::write(ws.progress_path(), r#"{"tv_drawings": 4}"#).unwrap();

    let progress = ws.progress();
    let report = BatchMigrator::new(&source, &dest, &progress)
        .run(&[MigrationUnit::Drawings])
        .await
        .unwrap();

    assert_eq!(report.units[0].rows, 2);
    let ids: Vec<i64> = parsed(&dest, MigrationUnit::Drawings)
        .await
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec![5, 6]);
}

#[tokio::test]
async fn test_raw_copy_then_augment() {
    init_test_tracing();
    let ws = Workspace::new();
    let source = ws.sqlite("source.db").await;
    let dest = ws.sqlite("dest.db").await;
    let mut records = drawings(1..=3);
    records.push(Record::new(4, 42, None));
    seed(&source, MigrationUnit::Drawings, &records).await;

    let copy_progress = blobmig::ProgressStore::new(ws.path().join("copy.json"));
    BatchMigrator::new(&source, &dest, &copy_progress)
        .with_mode(MigrationMode::CopyRaw)
        .run(&[MigrationUnit::Drawings])
        .await
        .unwrap();
    assert!(parsed(&dest, MigrationUnit::Drawings)
        .await
        .iter()
        .all(|(_, p)| p.is_none()));

    let augment_progress = ws.progress();
    let report = BatchMigrator::new(&dest, &dest, &augment_progress)
        .with_mode(MigrationMode::Augment)
        .run(&[MigrationUnit::Drawings])
        .await
        .unwrap();

    assert!(report.all_done());
    assert_eq!(report.units[0].skipped, 1);
    let rows = parsed(&dest, MigrationUnit::Drawings).await;
    assert_eq!(rows[2], (3, Some(r#"{"n":{"id":3}}"#.to_string())));
    assert_eq!(rows[3], (4, None));
}

#[tokio::test]
async fn test_replayed_raw_copy_keeps_augmented_rows() {
    init_test_tracing();
    let ws = Workspace::new();
    let source = ws.sqlite("source.db").await;
    let dest = ws.sqlite("dest.db").await;
    seed(&source, MigrationUnit::Drawings, &drawings(1..=3)).await;

    let copy_path = ws.path().join("copy.json");
    let copy_progress = blobmig::ProgressStore::new(copy_path.clone());
    let raw_copy = BatchMigrator::new(&source, &dest, &copy_progress).with_mode(MigrationMode::CopyRaw);
    raw_copy.run(&[MigrationUnit::Drawings]).await.unwrap();

    let augment_progress = ws.progress();
    let augment = BatchMigrator::new(&dest, &dest, &augment_progress).with_mode(MigrationMode::Augment);
    augment.run(&[MigrationUnit::Drawings]).await.unwrap();
    let augmented = parsed(&dest, MigrationUnit::Drawings).await;
    assert!(augmented.iter().all(|(_, p)| p.is_some()));

    // Crash after commit, before the copy cursor was saved: the batch repeats
    std::fs::remove_file(&copy_path).unwrap();
    raw_copy.run(&[MigrationUnit::Drawings]).await.unwrap();
    augment.run(&[MigrationUnit::Drawings]).await.unwrap();

    assert_eq!(parsed(&dest, MigrationUnit::Drawings).await, augmented);
}

#[tokio::test]
async fn test_augment_adds_column_and_reruns_cleanly() {
    init_test_tracing();
    let ws = Workspace::new();
    let db = ws.sqlite("charts.db").await;
    seed(&db, MigrationUnit::ChartLayouts, &drawings(1..=3)).await;

    let progress = ws.progress();
    let migrator = BatchMigrator::new(&db, &db, &progress).with_mode(MigrationMode::Augment);
    migrator.run(&[MigrationUnit::ChartLayouts]).await.unwrap();
    let first = parsed(&db, MigrationUnit::ChartLayouts).await;
    assert!(first.iter().all(|(_, p)| p.is_some()));

    // Start over: the column already exists and the result is unchanged
    std::fs::remove_file(ws.progress_path()).unwrap();
    let report = migrator.run(&[MigrationUnit::ChartLayouts]).await.unwrap();
    assert!(report.all_done());
    assert_eq!(parsed(&db, MigrationUnit::ChartLayouts).await, first);
}

#[tokio::test]
async fn test_text_keys_page_in_order() {
    init_test_tracing();
    let ws = Workspace::new();
    let source = ws.sqlite("source.db").await;
    let dest = ws.sqlite("dest.db").await;
    let templates: Vec<Record> = ["tmpl-c", "tmpl-a", "tmpl-b"]
        .into_iter()
        .map(|id| Record::new(id, 7, Some(blob(r#"{"panes": []}"#))))
        .collect();
    seed(&source, MigrationUnit::StudyTemplates, &templates).await;

    let progress = ws.progress();
    let report = BatchMigrator::new(&source, &dest, &progress)
        .with_batch_size(2)
        .run(&[MigrationUnit::StudyTemplates])
        .await
        .unwrap();

    assert_eq!(report.units[0].cursor, RecordId::from("tmpl-c"));
    assert_eq!(ws.progress_json()["tv_study_templates"], "tmpl-c");
    let page = dest
        .fetch_page(MigrationUnit::StudyTemplates, &RecordId::from(""), 10)
        .await
        .unwrap();
    let ids: Vec<_> = page.into_iter().map(|r| r.id).collect();
    assert_eq!(
        ids,
        vec![
            RecordId::from("tmpl-a"),
            RecordId::from("tmpl-b"),
            RecordId::from("tmpl-c")
        ]
    );
}

#[tokio::test]
async fn test_missing_source_table_halts_unit() {
    init_test_tracing();
    let ws = Workspace::new();
    let source = ws.sqlite("source.db").await;
    let dest = ws.sqlite("dest.db").await;
    seed(&source, MigrationUnit::Drawings, &drawings(1..=2)).await;

    let progress = ws.progress();
    let report = BatchMigrator::new(&source, &dest, &progress)
        .run(&[MigrationUnit::ChartLayouts, MigrationUnit::Drawings])
        .await
        .unwrap();

    assert!(!report.units[0].is_done());
    assert!(report.units[1].is_done());
    assert_eq!(report.units[1].rows, 2);
}
