//! Common test utilities for blobmig integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use blobmig::store::{MemoryStore, SqliteStore};
use blobmig::{MigrationUnit, ProgressStore};
use blobmig_common::codec::Codec;
use blobmig_common::{KeyType, Record, RecordId};
use sqlx::sqlite::SqliteConnectOptions;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Initialize tracing once for tests; honours `RUST_LOG`
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// LZ4-compress a JSON document the way the source stores it
pub fn blob(json: &str) -> Vec<u8> {
    Codec::Lz4Block.compress(json.as_bytes()).unwrap()
}

/// A memory store holding `ids` for `unit`, each with content `{"id": <id>}`
pub fn seeded_memory(unit: MigrationUnit, ids: impl IntoIterator<Item = i64>) -> MemoryStore {
    let store = MemoryStore::new();
    for id in ids {
        store.insert(unit, Record::new(id, 100 + id % 3, Some(blob(&format!(r#"{{"id": {}}}"#, id)))));
    }
    store
}

/// Scratch directory with a progress file path and SQLite database paths
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn progress_path(&self) -> PathBuf {
        self.dir.path().join("progress.json")
    }

    pub fn progress(&self) -> ProgressStore {
        ProgressStore::new(self.progress_path())
    }

    pub fn db_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn db_url(&self, name: &str) -> String {
        format!("sqlite:{}", self.db_path(name).display())
    }

    pub async fn sqlite(&self, name: &str) -> SqliteStore {
        let options = SqliteConnectOptions::new()
            .filename(self.db_path(name))
            .create_if_missing(true);
        SqliteStore::connect_with(options).await.unwrap()
    }

    /// Raw progress file content as JSON
    pub fn progress_json(&self) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(self.progress_path()).unwrap()).unwrap()
    }
}

/// Create a source-shaped table (no `parsed_content`) and fill it
pub async fn seed(store: &SqliteStore, unit: MigrationUnit, records: &[Record]) {
    let id_type = match unit.key_type() {
        KeyType::Integer => "INTEGER",
        KeyType::Text => "TEXT",
    };
    let ddl = format!(
        "CREATE TABLE {} (id {} PRIMARY KEY, user_id INTEGER NOT NULL, content BLOB)",
        unit.table_name(),
        id_type
    );
    sqlx::query(&ddl).execute(store.pool()).await.unwrap();

    let insert = format!(
        "INSERT INTO {} (id, user_id, content) VALUES (?1, ?2, ?3)",
        unit.table_name()
    );
    for record in records {
        let query = sqlx::query(&insert);
        let query = match &record.id {
            RecordId::Int(v) => query.bind(*v),
            RecordId::Text(v) => query.bind(v.clone()),
        };
        query
            .bind(record.owner_id)
            .bind(record.content.clone())
            .execute(store.pool())
            .await
            .unwrap();
    }
}
