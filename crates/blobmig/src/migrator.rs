//! Resumable batched migration
//!
//! A unit is migrated as a loop of batches. Each batch is fetched strictly
//! after the unit's cursor, transformed in full, written to the destination in
//! a single transaction and only then is the cursor advanced and the progress
//! file saved. A crash at any point therefore repeats at most the batch in
//! flight, and destination writes are upserts so a repeat is harmless.
//!
//! A record that fails to decode halts its unit with the cursor left before
//! the failing batch. Other units still run. Losing a connection or the
//! progress file stops the whole run.

use crate::error::{MigrateError, Result};
use crate::progress::create_unit_progress;
use crate::progress_store::{ProgressRecord, ProgressStore};
use crate::store::{RecordSink, RecordSource, RowWrite};
use crate::unit::MigrationUnit;
use blobmig_common::transform::Pipeline;
use blobmig_common::{Record, RecordId};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

/// Default number of records per batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// What a batch writes to the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationMode {
    /// Copy rows and store their normalized JSON in `parsed_content`
    #[default]
    Copy,
    /// Copy rows verbatim
    CopyRaw,
    /// Fill `parsed_content` on rows already in the destination
    Augment,
}

impl MigrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationMode::Copy => "copy",
            MigrationMode::CopyRaw => "copy_raw",
            MigrationMode::Augment => "augment",
        }
    }

    fn transforms(&self) -> bool {
        !matches!(self, MigrationMode::CopyRaw)
    }
}

/// Phases of a unit's batch loop, as reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigratorState {
    Idle,
    FetchingBatch,
    Transforming,
    Committing,
    Done,
    Halted,
}

impl MigratorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigratorState::Idle => "idle",
            MigratorState::FetchingBatch => "fetching_batch",
            MigratorState::Transforming => "transforming",
            MigratorState::Committing => "committing",
            MigratorState::Done => "done",
            MigratorState::Halted => "halted",
        }
    }
}

impl std::fmt::Display for MigratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final state of a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    /// Every record after the starting cursor was committed
    Done,
    /// Stopped on an error; the cursor marks the last committed batch
    Halted { error: String },
}

/// Outcome of migrating one unit in this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub unit: MigrationUnit,
    #[serde(flatten)]
    pub status: UnitStatus,
    /// Batches committed in this run
    pub batches: u64,
    /// Rows committed in this run
    pub rows: u64,
    /// Rows committed without content to transform
    pub skipped: u64,
    /// Cursor after the last committed batch
    pub cursor: RecordId,
}

impl UnitReport {
    fn new(unit: MigrationUnit, cursor: RecordId) -> Self {
        Self {
            unit,
            status: UnitStatus::Done,
            batches: 0,
            rows: 0,
            skipped: 0,
            cursor,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == UnitStatus::Done
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub units: Vec<UnitReport>,
}

impl RunReport {
    pub fn all_done(&self) -> bool {
        self.units.iter().all(UnitReport::is_done)
    }

    pub fn halted(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|r| !r.is_done())
    }

    pub fn total_rows(&self) -> u64 {
        self.units.iter().map(|r| r.rows).sum()
    }
}

/// Result of a single batch step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A batch was committed and the cursor moved to `cursor`
    Committed {
        rows: usize,
        skipped: usize,
        cursor: RecordId,
    },
    /// No records remain after the cursor
    Exhausted,
}

/// Drives units from a source into a sink, one committed batch at a time
pub struct BatchMigrator<'a> {
    source: &'a dyn RecordSource,
    sink: &'a dyn RecordSink,
    store: &'a ProgressStore,
    pipeline: Pipeline,
    mode: MigrationMode,
    batch_size: usize,
    show_progress: bool,
}

impl<'a> BatchMigrator<'a> {
    /// For [`MigrationMode::Augment`], pass the same store as source and sink.
    pub fn new(
        source: &'a dyn RecordSource,
        sink: &'a dyn RecordSink,
        store: &'a ProgressStore,
    ) -> Self {
        Self {
            source,
            sink,
            store,
            pipeline: Pipeline::default(),
            mode: MigrationMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
        }
    }

    pub fn with_mode(mut self, mode: MigrationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Batch size; values below 1 are raised to 1
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Draw a progress bar per unit on stderr
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn mode(&self) -> MigrationMode {
        self.mode
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Load progress and migrate `units` in order.
    ///
    /// Returns `Err` only for run-fatal errors; units halted by a bad record
    /// or a failed commit are reported in the [`RunReport`].
    pub async fn run(&self, units: &[MigrationUnit]) -> Result<RunReport> {
        let mut progress = self.store.load(units)?;
        let mut report = RunReport::default();

        for unit in units {
            let unit_report = self.run_unit(*unit, &mut progress).await?;
            report.units.push(unit_report);
        }

        info!(
            mode = self.mode.as_str(),
            units = report.units.len(),
            rows = report.total_rows(),
            halted = report.halted().count(),
            "Migration run finished"
        );
        Ok(report)
    }

    /// Migrate one unit until its source is exhausted or an error halts it
    #[instrument(skip(self, progress), fields(mode = self.mode.as_str()))]
    pub async fn run_unit(
        &self,
        unit: MigrationUnit,
        progress: &mut ProgressRecord,
    ) -> Result<UnitReport> {
        let mut report = UnitReport::new(unit, progress.cursor(unit));

        match self.drive(unit, progress, &mut report).await {
            Ok(()) => {
                info!(
                    batches = report.batches,
                    rows = report.rows,
                    skipped = report.skipped,
                    cursor = %report.cursor,
                    state = %MigratorState::Done,
                    "Unit complete"
                );
                Ok(report)
            },
            Err(e) if e.is_run_fatal() => {
                error!(cursor = %report.cursor, error = %e, "Run aborted");
                Err(e)
            },
            Err(e) => {
                error!(
                    cursor = %report.cursor,
                    error = %e,
                    state = %MigratorState::Halted,
                    "Unit halted"
                );
                report.status = UnitStatus::Halted {
                    error: e.to_string(),
                };
                Ok(report)
            },
        }
    }

    async fn drive(
        &self,
        unit: MigrationUnit,
        progress: &mut ProgressRecord,
        report: &mut UnitReport,
    ) -> Result<()> {
        self.prepare(unit).await?;

        let total = self.source.count(unit).await?;
        info!(total, cursor = %report.cursor, state = %MigratorState::Idle, "Starting unit");

        let pb = self
            .show_progress
            .then(|| create_unit_progress(total.max(0) as u64, unit.table_name()));

        loop {
            match self.step(unit, progress).await {
                Ok(StepOutcome::Committed {
                    rows,
                    skipped,
                    cursor,
                }) => {
                    report.batches += 1;
                    report.rows += rows as u64;
                    report.skipped += skipped as u64;
                    report.cursor = cursor;
                    if let Some(pb) = &pb {
                        pb.inc(rows as u64);
                    }
                },
                Ok(StepOutcome::Exhausted) => break,
                Err(e) => {
                    if let Some(pb) = &pb {
                        pb.abandon();
                    }
                    return Err(e);
                },
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        Ok(())
    }

    /// Make sure the destination can take this mode's writes
    pub async fn prepare(&self, unit: MigrationUnit) -> Result<()> {
        if self.mode != MigrationMode::Augment {
            self.sink.create_table_if_absent(unit).await?;
        }
        if self.mode.transforms() {
            self.sink.ensure_parsed_column(unit).await?;
        }
        Ok(())
    }

    /// Fetch, transform and commit one batch, then persist the new cursor
    pub async fn step(
        &self,
        unit: MigrationUnit,
        progress: &mut ProgressRecord,
    ) -> Result<StepOutcome> {
        let cursor = progress.cursor(unit);
        debug!(unit = %unit, cursor = %cursor, state = %MigratorState::FetchingBatch, "Fetching batch");

        let rows = self
            .source
            .fetch_page(unit, &cursor, self.batch_size)
            .await?;
        let Some(last) = rows.last() else {
            return Ok(StepOutcome::Exhausted);
        };
        let last_id = last.id.clone();

        debug!(unit = %unit, rows = rows.len(), state = %MigratorState::Transforming, "Transforming batch");
        let (writes, skipped) = self.plan_batch(unit, &rows)?;

        debug!(unit = %unit, writes = writes.len(), state = %MigratorState::Committing, "Committing batch");
        if !writes.is_empty() {
            self.sink.apply_batch(unit, &writes).await?;
        }

        progress.advance(unit, last_id.clone());
        self.store.save(progress)?;

        debug!(unit = %unit, cursor = %last_id, rows = rows.len(), "Batch committed");
        Ok(StepOutcome::Committed {
            rows: rows.len(),
            skipped,
            cursor: last_id,
        })
    }

    /// Build the destination writes for a batch; any record failure fails the batch
    fn plan_batch(&self, unit: MigrationUnit, rows: &[Record]) -> Result<(Vec<RowWrite>, usize)> {
        let mut writes = Vec::with_capacity(rows.len());
        let mut skipped = 0;

        for record in rows {
            let Some(blob) = record.content.as_deref() else {
                debug!(unit = %unit, id = %record.id, "No content");
                skipped += 1;
                if self.mode != MigrationMode::Augment {
                    writes.push(RowWrite::Upsert(record.clone()));
                }
                continue;
            };

            match self.mode {
                MigrationMode::CopyRaw => writes.push(RowWrite::Upsert(record.clone())),
                MigrationMode::Copy => {
                    let mut row = record.clone();
                    row.parsed_content = Some(self.render(unit, &record.id, blob)?);
                    writes.push(RowWrite::Upsert(row));
                },
                MigrationMode::Augment => writes.push(RowWrite::SetParsed {
                    id: record.id.clone(),
                    parsed: self.render(unit, &record.id, blob)?,
                }),
            }
        }

        Ok((writes, skipped))
    }

    fn render(&self, unit: MigrationUnit, id: &RecordId, blob: &[u8]) -> Result<String> {
        self.pipeline.render(blob).map_err(|source| {
            error!(unit = %unit, id = %id, kind = source.kind(), error = %source, "Record failed to decode");
            MigrateError::record(unit, id.clone(), source)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use blobmig_common::codec::Codec;
    use tempfile::TempDir;

    const UNIT: MigrationUnit = MigrationUnit::Drawings;

    fn blob(json: &str) -> Vec<u8> {
        Codec::Lz4Block.compress(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_plan_batch_modes() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("p.json"));
        let mem = MemoryStore::new();
        let rows = vec![
            Record::new(1, 9, Some(blob(r#"{"a":"[1]"}"#))),
            Record::new(2, 9, None),
        ];

        let copy = BatchMigrator::new(&mem, &mem, &store);
        let (writes, skipped) = copy.plan_batch(UNIT, &rows).unwrap();
        assert_eq!(skipped, 1);
        match &writes[0] {
            RowWrite::Upsert(r) => assert_eq!(r.parsed_content.as_deref(), Some(r#"{"a":[1]}"#)),
            other => panic!("unexpected write {:?}", other),
        }
        assert_eq!(writes[1], RowWrite::Upsert(rows[1].clone()));

        let raw = BatchMigrator::new(&mem, &mem, &store).with_mode(MigrationMode::CopyRaw);
        let (writes, _) = raw.plan_batch(UNIT, &rows).unwrap();
        assert_eq!(writes[0], RowWrite::Upsert(rows[0].clone()));

        let augment = BatchMigrator::new(&mem, &mem, &store).with_mode(MigrationMode::Augment);
        let (writes, skipped) = augment.plan_batch(UNIT, &rows).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(
            writes,
            vec![RowWrite::SetParsed {
                id: RecordId::Int(1),
                parsed: r#"{"a":[1]}"#.into()
            }]
        );
    }

    #[test]
    fn test_plan_batch_fails_whole_batch() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("p.json"));
        let mem = MemoryStore::new();
        let rows = vec![
            Record::new(1, 9, Some(blob("{}"))),
            Record::new(2, 9, Some(b"not lz4".to_vec())),
        ];

        let err = BatchMigrator::new(&mem, &mem, &store)
            .plan_batch(UNIT, &rows)
            .unwrap_err();
        match err {
            MigrateError::Record { unit, id, source } => {
                assert_eq!(unit, UNIT);
                assert_eq!(id, RecordId::Int(2));
                assert_eq!(source.kind(), "decompress");
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_batch_size_floor() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("p.json"));
        let mem = MemoryStore::new();
        assert_eq!(
            BatchMigrator::new(&mem, &mem, &store)
                .with_batch_size(0)
                .batch_size(),
            1
        );
    }

    #[test]
    fn test_unit_report_serializes_status() {
        let mut report = UnitReport::new(UNIT, RecordId::Int(3));
        report.status = UnitStatus::Halted {
            error: "bad".into(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "halted");
        assert_eq!(json["error"], "bad");
        assert_eq!(json["unit"], "tv_drawings");
        assert_eq!(json["cursor"], 3);
    }
}
