//! Crash-safe progress persistence
//!
//! The progress file is a flat JSON object mapping unit names to the last
//! record id committed to the destination:
//!
//! ```json
//! {
//!   "tv_drawings": 1200,
//!   "tv_study_templates": "tpl-00481"
//! }
//! ```
//!
//! Writes go to a temporary file in the same directory, are fsynced and then
//! renamed over the old file, so a crash leaves either the old or the new
//! content on disk. A file that exists but cannot be trusted is reported as
//! corrupt and never silently reset.

use crate::error::{MigrateError, Result};
use crate::unit::MigrationUnit;
use blobmig_common::{KeyType, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Last committed id per unit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressRecord {
    cursors: BTreeMap<String, RecordId>,
}

impl ProgressRecord {
    /// A record with every given unit at its key-type origin
    pub fn bootstrap(units: &[MigrationUnit]) -> Self {
        let mut record = Self::default();
        for unit in units {
            record.ensure(*unit);
        }
        record
    }

    /// Insert the origin cursor for a unit that has no entry yet
    pub fn ensure(&mut self, unit: MigrationUnit) {
        self.cursors
            .entry(unit.table_name().to_string())
            .or_insert_with(|| unit.key_type().origin());
    }

    /// Cursor for a unit; the origin if the unit has never committed
    pub fn cursor(&self, unit: MigrationUnit) -> RecordId {
        self.cursors
            .get(unit.table_name())
            .cloned()
            .unwrap_or_else(|| unit.key_type().origin())
    }

    /// Move a unit's cursor to the last id of a committed batch
    pub fn advance(&mut self, unit: MigrationUnit, to: RecordId) {
        debug_assert_eq!(to.key_type(), unit.key_type());
        self.cursors.insert(unit.table_name().to_string(), to);
    }

    /// All entries, including units not configured for the current run
    pub fn entries(&self) -> impl Iterator<Item = (&str, &RecordId)> {
        self.cursors.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

/// File-backed store for a [`ProgressRecord`]
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load progress for the given units.
    ///
    /// A missing file bootstraps every unit at its origin. An empty file is
    /// treated the same way with a warning. Anything else that does not parse
    /// into cursors of the right key type fails with
    /// [`MigrateError::ProgressCorrupt`]. Entries for units outside `units`
    /// are kept so a later save does not drop them.
    pub fn load(&self, units: &[MigrationUnit]) -> Result<ProgressRecord> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No progress file, starting from the beginning");
                return Ok(ProgressRecord::bootstrap(units));
            },
            Err(e) => return Err(MigrateError::progress_corrupt(&self.path, e)),
        };

        if content.trim().is_empty() {
            warn!(path = %self.path.display(), "Progress file is empty, starting from the beginning");
            return Ok(ProgressRecord::bootstrap(units));
        }

        let mut record: ProgressRecord = serde_json::from_str(&content).map_err(|e| {
            MigrateError::progress_corrupt(
                &self.path,
                format!("expected an object of unit cursors: {}", e),
            )
        })?;

        for unit in units {
            if let Some(cursor) = record.cursors.get(unit.table_name()) {
                if cursor.key_type() != unit.key_type() {
                    return Err(MigrateError::progress_corrupt(
                        &self.path,
                        format!(
                            "cursor for {} is {} but the unit is keyed by {}",
                            unit,
                            describe(cursor.key_type()),
                            describe(unit.key_type())
                        ),
                    ));
                }
            }
            record.ensure(*unit);
        }

        debug!(path = %self.path.display(), entries = record.len(), "Loaded progress");
        Ok(record)
    }

    /// Durably replace the progress file with `record`
    pub fn save(&self, record: &ProgressRecord) -> Result<()> {
        self.write_record(record).map_err(|source| MigrateError::ProgressPersist {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "Saved progress");
        Ok(())
    }

    fn write_record(&self, record: &ProgressRecord) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        write_atomic(&self.path, json.as_bytes())
    }
}

/// Write `bytes` to `path` through a same-directory temp file and rename
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn describe(key_type: KeyType) -> &'static str {
    match key_type {
        KeyType::Integer => "an integer",
        KeyType::Text => "a string",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const UNITS: [MigrationUnit; 2] = [MigrationUnit::Drawings, MigrationUnit::StudyTemplates];

    fn store_in(dir: &TempDir) -> ProgressStore {
        ProgressStore::new(dir.path().join("progress.json"))
    }

    #[test]
    fn test_missing_file_bootstraps_origins() {
        let dir = TempDir::new().unwrap();
        let record = store_in(&dir).load(&UNITS).unwrap();

        assert_eq!(record.cursor(MigrationUnit::Drawings), RecordId::Int(0));
        assert_eq!(
            record.cursor(MigrationUnit::StudyTemplates),
            RecordId::Text(String::new())
        );
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut record = store.load(&UNITS).unwrap();
        record.advance(MigrationUnit::Drawings, RecordId::Int(6));
        record.advance(MigrationUnit::StudyTemplates, RecordId::from("tpl-9"));
        store.save(&record).unwrap();

        let reloaded = store.load(&UNITS).unwrap();
        assert_eq!(reloaded, record);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["tv_drawings"], 6);
        assert_eq!(raw["tv_study_templates"], "tpl-9");
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let record = ProgressRecord::bootstrap(&UNITS);

        store.save(&record).unwrap();
        store.save(&record).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("progress.json")]);
    }

    #[test]
    fn test_save_creates_parent_dir() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("state").join("progress.json"));
        store.save(&ProgressRecord::bootstrap(&UNITS)).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_empty_file_bootstraps() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "  \n").unwrap();

        let record = store.load(&UNITS).unwrap();
        assert_eq!(record, ProgressRecord::bootstrap(&UNITS));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{\"tv_drawings\": 12").unwrap();

        let err = store.load(&UNITS).unwrap_err();
        assert!(matches!(err, MigrateError::ProgressCorrupt { .. }));
        assert!(err.is_run_fatal());
        // Left untouched for the operator
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "{\"tv_drawings\": 12"
        );
    }

    #[test]
    fn test_non_object_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "[1, 2]").unwrap();

        assert!(matches!(
            store.load(&UNITS),
            Err(MigrateError::ProgressCorrupt { .. })
        ));
    }

    #[test]
    fn test_wrong_key_type_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), r#"{"tv_drawings": "12"}"#).unwrap();

        let err = store.load(&UNITS).unwrap_err();
        assert!(err.to_string().contains("tv_drawings"));
    }

    #[test]
    fn test_unconfigured_units_are_preserved() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), r#"{"tv_chart_layouts": 40, "tv_drawings": 3}"#).unwrap();

        let mut record = store.load(&[MigrationUnit::Drawings]).unwrap();
        assert_eq!(record.cursor(MigrationUnit::Drawings), RecordId::Int(3));

        record.advance(MigrationUnit::Drawings, RecordId::Int(9));
        store.save(&record).unwrap();

        let all = store.load(&MigrationUnit::ALL).unwrap();
        assert_eq!(all.cursor(MigrationUnit::ChartLayouts), RecordId::Int(40));
        assert_eq!(all.cursor(MigrationUnit::Drawings), RecordId::Int(9));
    }

    #[test]
    fn test_save_into_directory_path_fails() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path());

        let err = store.save(&ProgressRecord::bootstrap(&UNITS)).unwrap_err();
        assert!(matches!(err, MigrateError::ProgressPersist { .. }));
        assert!(err.is_run_fatal());
    }
}
