//! In-memory record store
//!
//! Implements both store traits over ordered maps, with failures that can be
//! injected at fetch or commit time. Backs the migrator and export tests.

use super::{RecordSink, RecordSource, RowWrite};
use crate::error::{MigrateError, Result};
use crate::unit::MigrationUnit;
use async_trait::async_trait;
use blobmig_common::{Record, RecordId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<RecordId, Record>,
    has_parsed_column: bool,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<MigrationUnit, Table>,
    fail_commit_on: BTreeSet<RecordId>,
    fail_fetches_after: Option<usize>,
    fetches: usize,
    fetch_log: Vec<(MigrationUnit, Vec<RecordId>)>,
    commits: usize,
}

/// Ordered in-memory tables keyed by unit
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a source row; creates the table (without `parsed_content`) on first use
    pub fn insert(&self, unit: MigrationUnit, record: Record) {
        self.lock()
            .tables
            .entry(unit)
            .or_default()
            .rows
            .insert(record.id.clone(), record);
    }

    pub fn get(&self, unit: MigrationUnit, id: &RecordId) -> Option<Record> {
        self.lock()
            .tables
            .get(&unit)
            .and_then(|t| t.rows.get(id).cloned())
    }

    /// Every row of a unit, ascending by id
    pub fn rows(&self, unit: MigrationUnit) -> Vec<Record> {
        self.lock()
            .tables
            .get(&unit)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_table(&self, unit: MigrationUnit) -> bool {
        self.lock().tables.contains_key(&unit)
    }

    pub fn has_parsed_column(&self, unit: MigrationUnit) -> bool {
        self.lock()
            .tables
            .get(&unit)
            .is_some_and(|t| t.has_parsed_column)
    }

    /// Reject any batch that writes `id`, as if the commit failed
    pub fn fail_commit_on(&self, id: impl Into<RecordId>) {
        self.lock().fail_commit_on.insert(id.into());
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_commit_on.clear();
        state.fail_fetches_after = None;
    }

    /// Drop the "connection" once `n` page fetches have been served
    pub fn fail_fetches_after(&self, n: usize) {
        let mut state = self.lock();
        state.fail_fetches_after = Some(state.fetches + n);
    }

    /// Ids returned by each `fetch_page` call so far
    pub fn fetch_log(&self) -> Vec<(MigrationUnit, Vec<RecordId>)> {
        self.lock().fetch_log.clone()
    }

    /// Number of successful `apply_batch` calls
    pub fn commits(&self) -> usize {
        self.lock().commits
    }
}

#[async_trait]
impl RecordSource for MemoryStore {
    async fn count(&self, unit: MigrationUnit) -> Result<i64> {
        Ok(self
            .lock()
            .tables
            .get(&unit)
            .map_or(0, |t| t.rows.len() as i64))
    }

    async fn fetch_page(
        &self,
        unit: MigrationUnit,
        after: &RecordId,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let mut state = self.lock();
        if state.fail_fetches_after.is_some_and(|n| state.fetches >= n) {
            return Err(MigrateError::Connection(sqlx::Error::PoolClosed));
        }
        state.fetches += 1;

        let page: Vec<Record> = match state.tables.get(&unit) {
            Some(table) => table
                .rows
                .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                .take(limit)
                .map(|(_, r)| r.clone())
                .collect(),
            None => Vec::new(),
        };
        state
            .fetch_log
            .push((unit, page.iter().map(|r| r.id.clone()).collect()));
        Ok(page)
    }

    async fn fetch_one(&self, unit: MigrationUnit, id: &RecordId) -> Result<Option<Record>> {
        Ok(self.get(unit, id))
    }

    async fn fetch_by_owner(&self, unit: MigrationUnit, owner_id: i64) -> Result<Vec<Record>> {
        Ok(self
            .rows(unit)
            .into_iter()
            .filter(|r| r.owner_id == owner_id)
            .collect())
    }
}

#[async_trait]
impl RecordSink for MemoryStore {
    async fn create_table_if_absent(&self, unit: MigrationUnit) -> Result<()> {
        self.lock().tables.entry(unit).or_insert_with(|| Table {
            rows: BTreeMap::new(),
            has_parsed_column: true,
        });
        Ok(())
    }

    async fn ensure_parsed_column(&self, unit: MigrationUnit) -> Result<()> {
        let mut state = self.lock();
        let table = state
            .tables
            .get_mut(&unit)
            .ok_or_else(|| MigrateError::schema(unit, "no such table"))?;
        table.has_parsed_column = true;
        Ok(())
    }

    async fn apply_batch(&self, unit: MigrationUnit, writes: &[RowWrite]) -> Result<()> {
        let mut state = self.lock();
        if let Some(write) = writes.iter().find(|w| state.fail_commit_on.contains(w.id())) {
            return Err(MigrateError::schema(
                unit,
                format!("injected commit failure on {}", write.id()),
            ));
        }

        let table = state
            .tables
            .get(&unit)
            .ok_or_else(|| MigrateError::schema(unit, "no such table"))?;

        // Stage every write before touching the table
        let mut staged = table.rows.clone();
        for write in writes {
            match write {
                RowWrite::Upsert(record) => {
                    let mut row = record.clone();
                    if let Some(existing) = staged.get(&record.id) {
                        if row.parsed_content.is_none() && existing.content == row.content {
                            row.parsed_content = existing.parsed_content.clone();
                        }
                    }
                    staged.insert(row.id.clone(), row);
                },
                RowWrite::SetParsed { id, parsed } => {
                    if !table.has_parsed_column {
                        return Err(MigrateError::schema(unit, "no such column: parsed_content"));
                    }
                    if let Some(row) = staged.get_mut(id) {
                        row.parsed_content = Some(parsed.clone());
                    }
                },
            }
        }

        if let Some(table) = state.tables.get_mut(&unit) {
            table.rows = staged;
        }
        state.commits += 1;
        Ok(())
    }
}
