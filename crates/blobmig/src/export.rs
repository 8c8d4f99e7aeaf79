//! Export of decoded records to JSON files
//!
//! Artifacts land in `{out_dir}/{unit}_decompressed/` as pretty-printed JSON.
//! Each file is written through a temp file and renamed, so a file that exists
//! is always complete.

use crate::error::{MigrateError, Result};
use crate::progress_store::write_atomic;
use crate::store::RecordSource;
use crate::unit::MigrationUnit;
use blobmig_common::transform::Pipeline;
use blobmig_common::RecordId;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Default output directory for exported artifacts
pub const DEFAULT_EXPORT_DIR: &str = "output";

/// How artifact files are named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportNaming {
    /// `{unit}_{id}_parsed.json`, used for per-owner exports
    Prefixed,
    /// `{id}.json`, used for single-record extraction
    IdOnly,
}

impl ExportNaming {
    pub fn file_name(&self, unit: MigrationUnit, id: &RecordId) -> String {
        let id = sanitize(&id.to_string());
        match self {
            ExportNaming::Prefixed => format!("{}_{}_parsed.json", unit.table_name(), id),
            ExportNaming::IdOnly => format!("{}.json", id),
        }
    }
}

/// Keep ids usable as a single path component
fn sanitize(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{}", cleaned),
        _ => cleaned,
    }
}

/// Files written by an export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    /// Records with no content
    pub skipped: Vec<RecordId>,
}

/// Decodes records from a source and writes them as JSON files
pub struct Exporter<'a> {
    source: &'a dyn RecordSource,
    pipeline: Pipeline,
    out_dir: PathBuf,
}

impl<'a> Exporter<'a> {
    pub fn new(source: &'a dyn RecordSource, pipeline: Pipeline, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            pipeline,
            out_dir: out_dir.into(),
        }
    }

    /// Directory receiving a unit's artifacts
    pub fn unit_dir(&self, unit: MigrationUnit) -> PathBuf {
        self.out_dir.join(format!("{}_decompressed", unit.table_name()))
    }

    /// Export every record of `owner_id` in `unit`.
    ///
    /// Stops at the first record that fails to decode; files already written
    /// stay in place and are complete.
    pub async fn export_owner(&self, unit: MigrationUnit, owner_id: i64) -> Result<ExportReport> {
        let records = self.source.fetch_by_owner(unit, owner_id).await?;
        info!(unit = %unit, owner_id, records = records.len(), "Exporting records");

        let dir = self.unit_dir(unit);
        let mut report = ExportReport::default();
        for record in records {
            let Some(blob) = record.content.as_deref() else {
                debug!(unit = %unit, id = %record.id, "No content, skipping");
                report.skipped.push(record.id);
                continue;
            };
            let text = self.decode(unit, &record.id, blob)?;
            let path = dir.join(ExportNaming::Prefixed.file_name(unit, &record.id));
            self.write(&path, &text)?;
            report.written.push(path);
        }

        info!(
            unit = %unit,
            written = report.written.len(),
            skipped = report.skipped.len(),
            "Export complete"
        );
        Ok(report)
    }

    /// Export a single record, failing if it is missing or has no content
    pub async fn export_record(&self, unit: MigrationUnit, id: &RecordId) -> Result<PathBuf> {
        let record = self
            .source
            .fetch_one(unit, id)
            .await?
            .ok_or_else(|| MigrateError::RecordNotFound {
                unit,
                id: id.clone(),
            })?;
        let blob = record.content.as_deref().ok_or_else(|| MigrateError::MissingContent {
            unit,
            id: id.clone(),
        })?;

        let text = self.decode(unit, id, blob)?;
        let path = self.unit_dir(unit).join(ExportNaming::IdOnly.file_name(unit, id));
        self.write(&path, &text)?;
        info!(unit = %unit, id = %id, path = %path.display(), "Record extracted");
        Ok(path)
    }

    fn decode(&self, unit: MigrationUnit, id: &RecordId, blob: &[u8]) -> Result<String> {
        self.pipeline.render_pretty(blob).map_err(|source| {
            error!(unit = %unit, id = %id, kind = source.kind(), error = %source, "Record failed to decode");
            MigrateError::record(unit, id.clone(), source)
        })
    }

    fn write(&self, path: &Path, text: &str) -> Result<()> {
        write_atomic(path, text.as_bytes())?;
        debug!(path = %path.display(), bytes = text.len(), "Wrote artifact");
        Ok(())
    }
}
