//! `blobmig migrate` command implementation
//!
//! Copies units from the source database into the SQLite destination.

use super::{finish, pipeline};
use crate::config::MigrateConfig;
use crate::error::{MigrateError, Result};
use crate::migrator::{BatchMigrator, MigrationMode};
use crate::progress::create_spinner;
use crate::progress_store::ProgressStore;
use crate::store::{self, redact};
use crate::unit::MigrationUnit;
use tracing::info;

/// Copy `units` from source to destination
pub async fn run(
    config: &MigrateConfig,
    units: &[MigrationUnit],
    raw: bool,
    show_progress: bool,
) -> Result<()> {
    let mode = if raw {
        MigrationMode::CopyRaw
    } else {
        MigrationMode::Copy
    };
    let source_url = config.require_source()?;
    let dest_url = config.require_dest()?;

    info!(
        source = %redact(source_url),
        dest = %redact(dest_url),
        mode = mode.as_str(),
        batch_size = config.batch_size,
        "Starting migration"
    );

    let spinner = show_progress.then(|| create_spinner("Connecting to databases..."));
    let opened = async {
        let source = store::open_source(source_url).await?;
        let sink = store::open_sink(dest_url).await?;
        Ok::<_, MigrateError>((source, sink))
    }
    .await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let (source, sink) = opened?;
    let progress = ProgressStore::new(config.progress_file_for(mode));

    let migrator = BatchMigrator::new(&*source, &sink, &progress)
        .with_mode(mode)
        .with_pipeline(pipeline(config))
        .with_batch_size(config.batch_size)
        .with_progress(show_progress);

    let report = migrator.run(units).await?;
    sink.close().await;

    finish(&report)
}
