//! Record stores
//!
//! The migrator only talks to stores through [`RecordSource`] and
//! [`RecordSink`]. Postgres is read-only here; SQLite serves as copy
//! destination and, for in-place augmentation, as both source and sink.

pub mod memory;
pub mod postgres;
pub mod sqlite;

use crate::error::{MigrateError, Result};
use crate::unit::MigrationUnit;
use async_trait::async_trait;
use blobmig_common::{Record, RecordId};

pub use memory::MemoryStore;
pub use postgres::PgSource;
pub use sqlite::SqliteStore;

/// Read side of a migration
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Total rows in the unit's table
    async fn count(&self, unit: MigrationUnit) -> Result<i64>;

    /// Up to `limit` records with id strictly greater than `after`, ascending
    async fn fetch_page(
        &self,
        unit: MigrationUnit,
        after: &RecordId,
        limit: usize,
    ) -> Result<Vec<Record>>;

    async fn fetch_one(&self, unit: MigrationUnit, id: &RecordId) -> Result<Option<Record>>;

    /// Every record owned by `owner_id`, ascending by id
    async fn fetch_by_owner(&self, unit: MigrationUnit, owner_id: i64) -> Result<Vec<Record>>;
}

/// A single destination mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowWrite {
    /// Insert the record, replacing any row with the same id.
    ///
    /// Without `parsed_content`, an existing decoded value is kept as long as
    /// `content` is unchanged.
    Upsert(Record),

    /// Set `parsed_content` on an existing row
    SetParsed { id: RecordId, parsed: String },
}

impl RowWrite {
    pub fn id(&self) -> &RecordId {
        match self {
            RowWrite::Upsert(record) => &record.id,
            RowWrite::SetParsed { id, .. } => id,
        }
    }
}

/// Write side of a migration
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Create the unit's table if it does not exist
    async fn create_table_if_absent(&self, unit: MigrationUnit) -> Result<()>;

    /// Add the `parsed_content` column unless it is already there
    async fn ensure_parsed_column(&self, unit: MigrationUnit) -> Result<()>;

    /// Apply every write in one transaction; on error none of them persist
    async fn apply_batch(&self, unit: MigrationUnit, writes: &[RowWrite]) -> Result<()>;
}

/// Open a read-only source from a `postgres://` or `sqlite:` URL
pub async fn open_source(url: &str) -> Result<Box<dyn RecordSource>> {
    if is_postgres_url(url) {
        Ok(Box::new(PgSource::connect(url).await?))
    } else if is_sqlite_url(url) {
        Ok(Box::new(SqliteStore::connect_existing(url).await?))
    } else {
        Err(MigrateError::config(format!(
            "Unsupported source URL '{}': expected postgres:// or sqlite:",
            redact(url)
        )))
    }
}

/// Open a SQLite destination
pub async fn open_sink(url: &str) -> Result<SqliteStore> {
    if !is_sqlite_url(url) {
        return Err(MigrateError::config(format!(
            "Unsupported destination URL '{}': only sqlite: destinations are supported",
            redact(url)
        )));
    }
    SqliteStore::connect(url).await
}

fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}

fn is_sqlite_url(url: &str) -> bool {
    url.starts_with("sqlite:")
}

/// Hide the password of a connection URL for logs and messages
pub fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((userinfo, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match userinfo.split_once(':') {
        Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
        None => url.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("postgres://app:s3cret@db:5432/charts"),
            "postgres://app:***@db:5432/charts"
        );
        assert_eq!(redact("postgres://db/charts"), "postgres://db/charts");
        assert_eq!(redact("sqlite:out.db"), "sqlite:out.db");
    }

    #[tokio::test]
    async fn test_open_rejects_unknown_scheme() {
        let err = open_source("mysql://root@localhost/db").await.err().unwrap();
        assert!(matches!(err, MigrateError::Config(_)));

        let err = open_sink("postgres://localhost/db").await.err().unwrap();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[tokio::test]
    async fn test_sqlite_source_must_exist() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("typo.db");
        let url = format!("sqlite:{}", path.display());

        let err = open_source(&url).await.err().unwrap();
        assert!(matches!(err, MigrateError::Connection(_)));
        assert!(!path.exists());

        let sink = open_sink(&url).await.unwrap();
        sink.close().await;
        assert!(path.exists());
        assert!(open_source(&url).await.is_ok());
    }

    #[test]
    fn test_row_write_id() {
        let write = RowWrite::SetParsed {
            id: RecordId::from("a"),
            parsed: "{}".into(),
        };
        assert_eq!(write.id(), &RecordId::from("a"));
    }
}
