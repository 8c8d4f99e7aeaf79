//! Postgres source
//!
//! Read-only access to the production tables. Integer keys page on the native
//! column and are read back as `bigint`; text keys page on `id::text` so the
//! cursor comparison and the ordering agree whatever the column type.

use super::RecordSource;
use crate::error::{MigrateError, Result};
use crate::unit::MigrationUnit;
use async_trait::async_trait;
use blobmig_common::{KeyType, Record, RecordId};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::Row;
use std::time::Duration;
use tracing::debug;

/// Default connection pool size; the migrator issues one query at a time
pub const DEFAULT_MAX_CONNECTIONS: u32 = 2;

/// Default time to wait for a connection before failing the run
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Record source backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS))
            .connect(url)
            .await
            .map_err(MigrateError::Connection)?;
        debug!("Connected to Postgres source");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Key expression used for filtering and ordering
fn key_expr(unit: MigrationUnit) -> &'static str {
    match unit.key_type() {
        KeyType::Integer => "id",
        KeyType::Text => "id::text",
    }
}

/// Key expression as selected, matching the decoded Rust type
fn id_column(unit: MigrationUnit) -> &'static str {
    match unit.key_type() {
        KeyType::Integer => "id::bigint",
        KeyType::Text => "id::text",
    }
}

/// `{id}` in `filter` and `tail` is replaced by the unit's key expression
fn select_sql(unit: MigrationUnit, filter: &str, tail: &str) -> String {
    let key = key_expr(unit);
    format!(
        "SELECT {id} AS id, user_id::bigint AS user_id, content FROM {table} WHERE {filter} {tail}",
        id = id_column(unit),
        table = unit.table_name(),
        filter = filter.replace("{id}", key),
        tail = tail.replace("{id}", key),
    )
    .trim_end()
    .to_string()
}

fn bind_id<'q>(query: PgQuery<'q>, id: &'q RecordId) -> PgQuery<'q> {
    match id {
        RecordId::Int(v) => query.bind(*v),
        RecordId::Text(v) => query.bind(v.as_str()),
    }
}

fn decode_record(unit: MigrationUnit, row: &PgRow) -> Result<Record> {
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

#[async_trait]
impl RecordSource for PgSource {
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
        let sql = select_sql(unit, "{id} > $1", "ORDER BY {id} LIMIT $2");
        let rows = bind_id(sqlx::query(&sql), after)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|row| decode_record(unit, row)).collect()
    }

    async fn fetch_one(&self, unit: MigrationUnit, id: &RecordId) -> Result<Option<Record>> {
        let sql = select_sql(unit, "{id} = $1", "");
        let row = bind_id(sqlx::query(&sql), id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(|row| decode_record(unit, row)).transpose()
    }

    async fn fetch_by_owner(&self, unit: MigrationUnit, owner_id: i64) -> Result<Vec<Record>> {
        let sql = select_sql(unit, "user_id = $1", "ORDER BY {id}");
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|row| decode_record(unit, row)).collect()
    }
}
