//! Error types for blobmig
//!
//! Messages are written for the operator running a migration: each one says
//! which unit or record is affected and, where there is one, what to do next.

use crate::unit::MigrationUnit;
use blobmig_common::{BlobmigError, RecordId};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for migration operations
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Comprehensive error type for migration operations
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Source or destination unreachable; retry on the next invocation
    #[error("Connection error: {0}. Check the connection URL and that the database is reachable.")]
    Connection(#[source] sqlx::Error),

    /// Statement failed on a reachable database
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A single record could not be decoded; its batch was not committed
    #[error("Record {id} in {unit} failed: {source}")]
    Record {
        unit: MigrationUnit,
        id: RecordId,
        #[source]
        source: BlobmigError,
    },

    /// Progress file exists but cannot be trusted
    #[error("Progress file '{}' is corrupt: {reason}. Fix or restore it by hand; it is never reset automatically.", path.display())]
    ProgressCorrupt { path: PathBuf, reason: String },

    /// Progress could not be written durably
    #[error("Failed to persist progress file '{}': {source}", path.display())]
    ProgressPersist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Destination schema could not be prepared
    #[error("Schema error on {unit}: {reason}")]
    Schema { unit: MigrationUnit, reason: String },

    #[error("Record {id} not found in {unit}")]
    RecordNotFound { unit: MigrationUnit, id: RecordId },

    #[error("Record {id} in {unit} has no content")]
    MissingContent { unit: MigrationUnit, id: RecordId },

    /// One or more units stopped before reaching the end of their table
    #[error("{} unit(s) halted: {}. Fix the reported records and re-run; completed batches are not repeated.", .0.len(), .0.join(", "))]
    UnitsHalted(Vec<String>),

    #[error("Configuration error: {0}. Check your environment variables, .env file or command-line flags.")]
    Config(String),

    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a schema error
    pub fn schema(unit: MigrationUnit, reason: impl std::fmt::Display) -> Self {
        Self::Schema {
            unit,
            reason: reason.to_string(),
        }
    }

    /// Create a progress corruption error
    pub fn progress_corrupt(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::ProgressCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Tag a decoding failure with the record it came from
    pub fn record(unit: MigrationUnit, id: RecordId, source: BlobmigError) -> Self {
        Self::Record { unit, id, source }
    }

    /// Errors that stop the whole run rather than a single unit
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            MigrateError::Connection(_)
                | MigrateError::ProgressCorrupt { .. }
                | MigrateError::ProgressPersist { .. }
        )
    }
}

impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => MigrateError::Connection(err),
            other => MigrateError::Database(other),
        }
    }
}

impl From<BlobmigError> for MigrateError {
    fn from(err: BlobmigError) -> Self {
        match err {
            BlobmigError::Io(e) => MigrateError::Io(e),
            BlobmigError::Serialization(e) => MigrateError::Json(e),
            BlobmigError::Config(msg) => MigrateError::Config(msg),
            other => MigrateError::Config(other.to_string()),
        }
    }
}
