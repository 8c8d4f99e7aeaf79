//! `blobmig augment` command implementation
//!
//! Fills `parsed_content` in place in the SQLite destination.

use super::{finish, pipeline};
use crate::config::MigrateConfig;
use crate::error::Result;
use crate::migrator::{BatchMigrator, MigrationMode};
use crate::progress_store::ProgressStore;
use crate::store::{self, redact};
use crate::unit::MigrationUnit;
use tracing::info;

/// Augment `units` of the destination database
pub async fn run(config: &MigrateConfig, units: &[MigrationUnit], show_progress: bool) -> Result<()> {
    let dest_url = config.require_dest()?;
    info!(dest = %redact(dest_url), batch_size = config.batch_size, "Starting augmentation");

    let db = store::open_sink(dest_url).await?;
    let progress = ProgressStore::new(config.progress_file_for(MigrationMode::Augment));

    let migrator = BatchMigrator::new(&db, &db, &progress)
        .with_mode(MigrationMode::Augment)
        .with_pipeline(pipeline(config))
        .with_batch_size(config.batch_size)
        .with_progress(show_progress);

    let report = migrator.run(units).await?;
    db.close().await;

    finish(&report)
}
