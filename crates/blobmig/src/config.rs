//! Configuration management
//!
//! Settings come from `.env` (via `dotenvy`), then the process environment,
//! then command-line flags, each layer overriding the one before.

use crate::error::{MigrateError, Result};
use crate::export::DEFAULT_EXPORT_DIR;
use crate::migrator::{MigrationMode, DEFAULT_BATCH_SIZE};
use crate::unit::MigrationUnit;
use blobmig_common::codec::Codec;
use blobmig_common::normalize::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default progress file for `migrate`.
pub const DEFAULT_COPY_PROGRESS_FILE: &str = "batch_progress.json";

/// Default progress file for `augment`; kept apart from the copy cursors.
pub const DEFAULT_AUGMENT_PROGRESS_FILE: &str = "progress.json";

pub const ENV_SOURCE_URL: &str = "SOURCE_DATABASE_URL";
pub const ENV_DEST_URL: &str = "DEST_DATABASE_URL";
pub const ENV_BATCH_SIZE: &str = "BLOBMIG_BATCH_SIZE";
pub const ENV_PROGRESS_FILE: &str = "BLOBMIG_PROGRESS_FILE";
pub const ENV_CODEC: &str = "BLOBMIG_CODEC";
pub const ENV_UNITS: &str = "BLOBMIG_UNITS";
pub const ENV_MAX_DEPTH: &str = "BLOBMIG_MAX_DEPTH";
pub const ENV_EXPORT_DIR: &str = "BLOBMIG_EXPORT_DIR";

/// Migration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateConfig {
    /// Postgres or SQLite URL records are read from
    pub source_url: Option<String>,
    /// SQLite URL records are written to (and augmented in place)
    pub dest_url: Option<String>,
    pub batch_size: usize,
    /// Overrides the per-command default progress file
    pub progress_file: Option<PathBuf>,
    pub codec: Codec,
    /// Overrides the per-command default unit selection
    pub units: Option<Vec<MigrationUnit>>,
    /// Nesting limit for JSON normalization
    pub max_depth: usize,
    pub export_dir: PathBuf,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            dest_url: None,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_file: None,
            codec: Codec::default(),
            units: None,
            max_depth: DEFAULT_MAX_DEPTH,
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
        }
    }
}

impl MigrateConfig {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup (the environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = MigrateConfig {
            source_url: get(ENV_SOURCE_URL),
            dest_url: get(ENV_DEST_URL),
            batch_size: parse_or(ENV_BATCH_SIZE, get(ENV_BATCH_SIZE), defaults.batch_size)?,
            progress_file: get(ENV_PROGRESS_FILE).map(PathBuf::from),
            codec: parse_or(ENV_CODEC, get(ENV_CODEC), defaults.codec)?,
            units: get(ENV_UNITS).map(|raw| parse_units(&raw)).transpose()?,
            max_depth: parse_or(ENV_MAX_DEPTH, get(ENV_MAX_DEPTH), defaults.max_depth)?,
            export_dir: get(ENV_EXPORT_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.export_dir),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }

        if self.max_depth == 0 {
            anyhow::bail!("Normalization max depth must be greater than 0");
        }

        if let Some(units) = &self.units {
            if units.is_empty() {
                anyhow::bail!("Unit selection cannot be empty");
            }
        }

        if self.export_dir.as_os_str().is_empty() {
            anyhow::bail!("Export directory cannot be empty");
        }

        Ok(())
    }

    /// Progress file for a mode, honouring an explicit override
    pub fn progress_file_for(&self, mode: MigrationMode) -> PathBuf {
        if let Some(path) = &self.progress_file {
            return path.clone();
        }
        match mode {
            MigrationMode::Copy | MigrationMode::CopyRaw => PathBuf::from(DEFAULT_COPY_PROGRESS_FILE),
            MigrationMode::Augment => PathBuf::from(DEFAULT_AUGMENT_PROGRESS_FILE),
        }
    }

    /// Selected units, or `default` when none were configured
    pub fn units_or(&self, default: &[MigrationUnit]) -> Vec<MigrationUnit> {
        self.units.clone().unwrap_or_else(|| default.to_vec())
    }

    pub fn require_source(&self) -> Result<&str> {
        self.source_url.as_deref().ok_or_else(|| {
            MigrateError::config(format!(
                "No source database configured. Set {} or pass --source-url",
                ENV_SOURCE_URL
            ))
        })
    }

    pub fn require_dest(&self) -> Result<&str> {
        self.dest_url.as_deref().ok_or_else(|| {
            MigrateError::config(format!(
                "No destination database configured. Set {} or pass --dest-url",
                ENV_DEST_URL
            ))
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}='{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

/// Parse a comma-separated unit list, e.g. `tv_drawings,study_templates`
pub fn parse_units(raw: &str) -> anyhow::Result<Vec<MigrationUnit>> {
    let mut units = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let unit = MigrationUnit::from_str(name)?;
        if !units.contains(&unit) {
            units.push(unit);
        }
    }
    Ok(units)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> anyhow::Result<MigrateConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MigrateConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, MigrateConfig::default());
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.codec, Codec::Lz4Block);
        assert_eq!(
            config.progress_file_for(MigrationMode::Copy),
            PathBuf::from(DEFAULT_COPY_PROGRESS_FILE)
        );
        assert_eq!(
            config.progress_file_for(MigrationMode::Augment),
            PathBuf::from(DEFAULT_AUGMENT_PROGRESS_FILE)
        );
    }

    #[test]
    fn test_env_values() {
        let config = from_pairs(&[
            (ENV_SOURCE_URL, "postgres://localhost/charts"),
            (ENV_DEST_URL, "sqlite:charts.db"),
            (ENV_BATCH_SIZE, "5"),
            (ENV_PROGRESS_FILE, "state/p.json"),
            (ENV_CODEC, "gzip"),
            (ENV_UNITS, "tv_drawings, study_templates,drawings"),
            (ENV_MAX_DEPTH, "32"),
        ])
        .unwrap();

        assert_eq!(config.require_source().unwrap(), "postgres://localhost/charts");
        assert_eq!(config.require_dest().unwrap(), "sqlite:charts.db");
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.codec, Codec::Gzip);
        assert_eq!(
            config.units_or(&MigrationUnit::ALL),
            vec![MigrationUnit::Drawings, MigrationUnit::StudyTemplates]
        );
        assert_eq!(
            config.progress_file_for(MigrationMode::Augment),
            PathBuf::from("state/p.json")
        );
        assert_eq!(config.max_depth, 32);
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(from_pairs(&[(ENV_BATCH_SIZE, "lots")]).is_err());
        assert!(from_pairs(&[(ENV_BATCH_SIZE, "0")]).is_err());
        assert!(from_pairs(&[(ENV_CODEC, "zstd")]).is_err());
        assert!(from_pairs(&[(ENV_UNITS, "tv_users")]).is_err());
        assert!(from_pairs(&[(ENV_UNITS, " , ")]).is_err());
    }

    #[test]
    fn test_missing_urls() {
        let config = from_pairs(&[(ENV_SOURCE_URL, "  ")]).unwrap();
        assert!(config.require_source().is_err());
        assert!(config.require_dest().is_err());
    }

    #[test]
    #[serial]
    fn test_load_reads_process_env() {
        std::env::set_var(ENV_BATCH_SIZE, "7");
        std::env::set_var(ENV_CODEC, "gz");
        let config = MigrateConfig::load();
        std::env::remove_var(ENV_BATCH_SIZE);
        std::env::remove_var(ENV_CODEC);

        let config = config.unwrap();
        assert_eq!(config.batch_size, 7);
        assert_eq!(config.codec, Codec::Gzip);
    }
}
