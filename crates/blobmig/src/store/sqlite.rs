//! SQLite store
//!
//! Serves as the copy destination, as the target of in-place augmentation
//! (source and sink at once), and as a plain source for export.

use super::{RecordSink, RecordSource, RowWrite};
use crate::error::{MigrateError, Result};
use crate::unit::MigrationUnit;
use async_trait::async_trait;
use blobmig_common::{KeyType, Record, RecordId};
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Record store backed by a SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at a `sqlite:` URL
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(MigrateError::Connection)?
            .create_if_missing(true);
        Self::connect_with(options).await
    }

    /// Open an existing database at a `sqlite:` URL
    pub async fn connect_existing(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(MigrateError::Connection)?
            .create_if_missing(false);
        Self::connect_with(options).await
    }

    pub async fn connect_with(options: SqliteConnectOptions) -> Result<Self> {
        // One writer keeps batch transactions strictly serial
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(MigrateError::Connection)?;
        debug!("Connected to SQLite store");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn has_parsed_column(&self, unit: MigrationUnit) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM pragma_table_info(?1) WHERE name = 'parsed_content'",
        )
        .bind(unit.table_name())
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count > 0)
    }
}

fn bind_id<'q>(query: SqliteQuery<'q>, id: &'q RecordId) -> SqliteQuery<'q> {
    match id {
        RecordId::Int(v) => query.bind(*v),
        RecordId::Text(v) => query.bind(v.as_str()),
    }
}

fn decode_record(unit: MigrationUnit, row: &SqliteRow) -> Result<Record> {
    let id = match unit.key_type() {
        KeyType::Integer => RecordId::Int(row.try_get::<i64, _>("id")?),
        KeyType::Text => RecordId::Text(row.try_get::<String, _>("id")?),
    };
    Ok(Record {
        id,
        owner_id: row.try_get("user_id")?,
        content: row.try_get("content")?,
        parsed_content: None,
    })
}

fn is_duplicate_column(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let message = db.message().to_lowercase();
            message.contains("duplicate column") || message.contains("already exists")
        },
        _ => false,
    }
}

#[async_trait]
impl RecordSource for SqliteStore {
    async fn count(&self, unit: MigrationUnit) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) AS count FROM {}", unit.table_name());
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(row.try_get("count")?)
    }

    async fn fetch_page(
        &self,
        unit: MigrationUnit,
        after: &RecordId,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT id, user_id, content FROM {} WHERE id > ?1 ORDER BY id LIMIT ?2",
            unit.table_name()
        );
        let rows = bind_id(sqlx::query(&sql), after)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|row| decode_record(unit, row)).collect()
    }

    async fn fetch_one(&self, unit: MigrationUnit, id: &RecordId) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT id, user_id, content FROM {} WHERE id = ?1",
            unit.table_name()
        );
        let row = bind_id(sqlx::query(&sql), id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(|row| decode_record(unit, row)).transpose()
    }

    async fn fetch_by_owner(&self, unit: MigrationUnit, owner_id: i64) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT id, user_id, content FROM {} WHERE user_id = ?1 ORDER BY id",
            unit.table_name()
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|row| decode_record(unit, row)).collect()
    }
}

#[async_trait]
impl RecordSink for SqliteStore {
    async fn create_table_if_absent(&self, unit: MigrationUnit) -> Result<()> {
        sqlx::query(unit.create_table_sql())
            .execute(&self.pool)
            .await
            .map_err(|e| match MigrateError::from(e) {
                MigrateError::Database(e) => MigrateError::schema(unit, e),
                other => other,
            })?;
        Ok(())
    }

    async fn ensure_parsed_column(&self, unit: MigrationUnit) -> Result<()> {
        if self.has_parsed_column(unit).await? {
            debug!(unit = %unit, "parsed_content column already present");
            return Ok(());
        }

        let sql = format!("ALTER TABLE {} ADD COLUMN parsed_content TEXT", unit.table_name());
        match sqlx::query(&sql).execute(&self.pool).await {
            Ok(_) => {
                info!(unit = %unit, "Added parsed_content column");
                Ok(())
            },
            // Lost a race with another writer; the column is there either way
            Err(e) if is_duplicate_column(&e) => Ok(()),
            Err(e) => match MigrateError::from(e) {
                MigrateError::Database(e) => Err(MigrateError::schema(unit, e)),
                other => Err(other),
            },
        }
    }

    async fn apply_batch(&self, unit: MigrationUnit, writes: &[RowWrite]) -> Result<()> {
        let upsert = format!(
            r#"
            INSERT INTO {table} (id, user_id, content, parsed_content)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                content = excluded.content,
                parsed_content = CASE
                    WHEN excluded.parsed_content IS NULL AND content IS excluded.content
                        THEN parsed_content
                    ELSE excluded.parsed_content
                END
            "#,
            table = unit.table_name()
        );
        let set_parsed = format!(
            "UPDATE {} SET parsed_content = ?1 WHERE id = ?2",
            unit.table_name()
        );

        let mut tx = self.pool.begin().await?;
        for write in writes {
            match write {
                RowWrite::Upsert(record) => {
                    bind_id(sqlx::query(&upsert), &record.id)
                        .bind(record.owner_id)
                        .bind(record.content.as_deref())
                        .bind(record.parsed_content.as_deref())
                        .execute(&mut *tx)
                        .await?;
                },
                RowWrite::SetParsed { id, parsed } => {
                    let query = sqlx::query(&set_parsed).bind(parsed.as_str());
                    bind_id(query, id).execute(&mut *tx).await?;
                },
            }
        }
        tx.commit().await?;

        debug!(unit = %unit, rows = writes.len(), "Committed batch");
        Ok(())
    }
}
