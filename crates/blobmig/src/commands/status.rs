//! `blobmig status` command implementation
//!
//! Shows progress cursors and, when a database is configured, row counts.

use crate::config::MigrateConfig;
use crate::error::Result;
use crate::migrator::MigrationMode;
use crate::progress::format_count;
use crate::progress_store::ProgressStore;
use crate::store::{self, RecordSource};
use crate::unit::MigrationUnit;
use colored::Colorize;

/// Show progress for the copy (default) or augment run
pub async fn run(config: &MigrateConfig, augment: bool) -> Result<()> {
    let mode = if augment {
        MigrationMode::Augment
    } else {
        MigrationMode::Copy
    };
    let progress_store = ProgressStore::new(config.progress_file_for(mode));
    let progress = progress_store.load(&MigrationUnit::ALL)?;

    // Augment reads the destination; copy reads the source
    let url = if augment {
        config.dest_url.as_deref()
    } else {
        config.source_url.as_deref()
    };
    let counter: Option<Box<dyn RecordSource>> = match url {
        Some(url) => Some(store::open_source(url).await?),
        None => None,
    };

    println!("{} {}", "Progress:".cyan().bold(), progress_store.path().display());
    println!();

    for unit in MigrationUnit::ALL {
        println!("{}", unit.to_string().green());
        println!("  Cursor: {}", progress.cursor(unit));
        if let Some(source) = &counter {
            match source.count(unit).await {
                Ok(total) => println!("  Rows:   {}", format_count(total.max(0) as u64)),
                Err(e) => println!("  Rows:   {}", format!("unavailable ({})", e).yellow()),
            }
        }
        println!();
    }

    for (name, cursor) in progress.entries() {
        if !MigrationUnit::ALL.iter().any(|unit| unit.table_name() == name) {
            println!("{} {} (unknown unit) at {}", "!".yellow(), name, cursor);
        }
    }

    Ok(())
}
