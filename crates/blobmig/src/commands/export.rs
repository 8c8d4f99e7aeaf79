//! `blobmig export` and `blobmig extract` command implementations
//!
//! Decode records to pretty-printed JSON files under the export directory.

use super::{open_reader, pipeline};
use crate::config::MigrateConfig;
use crate::error::{MigrateError, Result};
use crate::export::Exporter;
use crate::unit::MigrationUnit;
use colored::Colorize;

/// Export every record of `owner` across `units`.
///
/// A unit that fails is reported and the remaining units still export.
pub async fn run(config: &MigrateConfig, owner: i64, units: &[MigrationUnit]) -> Result<()> {
    let source = open_reader(config).await?;
    let exporter = Exporter::new(&*source, pipeline(config), &config.export_dir);

    let mut halted = Vec::new();
    for unit in units {
        println!("Processing {} for user {}...", unit, owner);
        match exporter.export_owner(*unit, owner).await {
            Ok(report) => {
                println!(
                    "{} {} file(s) in {}",
                    "✓".green(),
                    report.written.len(),
                    exporter.unit_dir(*unit).display()
                );
                if !report.skipped.is_empty() {
                    println!("  {} record(s) without content skipped", report.skipped.len());
                }
            },
            Err(e) if e.is_run_fatal() => return Err(e),
            Err(e) => {
                println!("{} {}: export stopped", "✗".red(), unit.to_string().bold());
                println!("  {}", e.to_string().red());
                halted.push(unit.to_string());
            },
        }
    }

    if halted.is_empty() {
        Ok(())
    } else {
        Err(MigrateError::UnitsHalted(halted))
    }
}

/// Extract a single record as `{id}.json`
pub async fn extract(config: &MigrateConfig, unit: MigrationUnit, id: &str) -> Result<()> {
    let id = unit.key_type().parse_id(id)?;
    let source = open_reader(config).await?;
    let exporter = Exporter::new(&*source, pipeline(config), &config.export_dir);

    let path = exporter.export_record(unit, &id).await?;
    println!("{} Saved {} {} to {}", "✓".green(), unit, id, path.display());

    Ok(())
}
