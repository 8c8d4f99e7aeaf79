//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod augment;
pub mod export;
pub mod inspect;
pub mod migrate;
pub mod status;

use crate::config::MigrateConfig;
use crate::error::{MigrateError, Result};
use crate::migrator::{RunReport, UnitStatus};
use crate::progress::format_count;
use crate::store::{self, RecordSource};
use crate::unit::MigrationUnit;
use blobmig_common::normalize::Normalizer;
use blobmig_common::transform::Pipeline;
use colored::Colorize;

/// Decoding pipeline for the configured codec and depth limit
pub fn pipeline(config: &MigrateConfig) -> Pipeline {
    Pipeline::new(config.codec).with_normalizer(Normalizer::with_max_depth(config.max_depth))
}

/// Units named on the command line, else configured units, else `default`
pub fn select_units(
    config: &MigrateConfig,
    requested: &[MigrationUnit],
    default: &[MigrationUnit],
) -> Vec<MigrationUnit> {
    if requested.is_empty() {
        config.units_or(default)
    } else {
        let mut units = Vec::with_capacity(requested.len());
        for unit in requested {
            if !units.contains(unit) {
                units.push(*unit);
            }
        }
        units
    }
}

/// Store to read records from: the source if configured, else the destination
pub async fn open_reader(config: &MigrateConfig) -> Result<Box<dyn RecordSource>> {
    match (&config.source_url, &config.dest_url) {
        (Some(url), _) | (None, Some(url)) => store::open_source(url).await,
        (None, None) => Err(MigrateError::config(
            "No database configured. Set SOURCE_DATABASE_URL or DEST_DATABASE_URL",
        )),
    }
}

/// Print a run report and fail if any unit halted
pub fn finish(report: &RunReport) -> Result<()> {
    println!();
    for unit in &report.units {
        match &unit.status {
            UnitStatus::Done => println!(
                "{} {}: {} rows in {} batches ({} without content), cursor {}",
                "✓".green(),
                unit.unit.to_string().bold(),
                format_count(unit.rows),
                unit.batches,
                format_count(unit.skipped),
                unit.cursor
            ),
            UnitStatus::Halted { error } => {
                println!(
                    "{} {}: halted after {} rows, cursor {}",
                    "✗".red(),
                    unit.unit.to_string().bold(),
                    format_count(unit.rows),
                    unit.cursor
                );
                println!("  {}", error.red());
            },
        }
    }

    let halted: Vec<String> = report.halted().map(|r| r.unit.to_string()).collect();
    if halted.is_empty() {
        Ok(())
    } else {
        Err(MigrateError::UnitsHalted(halted))
    }
}
