//! blobmig Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Moves compressed chart records between databases in resumable batches and
//! recovers their JSON.
//!
//! # Overview
//!
//! - **Migration**: copy units from a Postgres or SQLite source into SQLite (`blobmig migrate`)
//! - **Augmentation**: fill `parsed_content` in place (`blobmig augment`)
//! - **Export**: write decoded records as JSON files (`blobmig export`, `blobmig extract`)
//! - **Status**: show progress cursors and row counts (`blobmig status`)
//! - **Inspection**: list the sources of an exported study template (`blobmig inspect`)
//!
//! Every batch is committed to the destination before its cursor is saved,
//! so an interrupted run resumes after the last committed record.

pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod migrator;
pub mod progress;
pub mod progress_store;
pub mod store;
pub mod template;
pub mod unit;

// Re-export commonly used types
pub use config::MigrateConfig;
pub use error::{MigrateError, Result};
pub use migrator::{BatchMigrator, MigrationMode, RunReport, UnitReport, UnitStatus};
pub use progress_store::{ProgressRecord, ProgressStore};
pub use unit::MigrationUnit;

use blobmig_common::codec::Codec;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// blobmig - resumable migration for compressed chart records
#[derive(Parser, Debug)]
#[command(name = "blobmig")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the command-line reference as Markdown and exit
    #[arg(long, hide = true)]
    pub markdown_help: bool,

    /// Source database URL (postgres:// or sqlite:) [env: SOURCE_DATABASE_URL]
    #[arg(long, global = true)]
    pub source_url: Option<String>,

    /// Destination SQLite URL [env: DEST_DATABASE_URL]
    #[arg(long, global = true)]
    pub dest_url: Option<String>,

    /// Records per batch [env: BLOBMIG_BATCH_SIZE]
    #[arg(short, long, global = true)]
    pub batch_size: Option<usize>,

    /// Progress file path [env: BLOBMIG_PROGRESS_FILE]
    #[arg(long, global = true)]
    pub progress_file: Option<PathBuf>,

    /// Content codec: lz4-block or gzip [env: BLOBMIG_CODEC]
    #[arg(long, global = true)]
    pub codec: Option<Codec>,

    /// Maximum JSON nesting depth during normalization [env: BLOBMIG_MAX_DEPTH]
    #[arg(long, global = true)]
    pub max_depth: Option<usize>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded configuration
    pub fn apply(&self, mut config: MigrateConfig) -> anyhow::Result<MigrateConfig> {
        if let Some(url) = &self.source_url {
            config.source_url = Some(url.clone());
        }
        if let Some(url) = &self.dest_url {
            config.dest_url = Some(url.clone());
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(path) = &self.progress_file {
            config.progress_file = Some(path.clone());
        }
        if let Some(codec) = self.codec {
            config.codec = codec;
        }
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(Commands::Export {
            output: Some(dir), ..
        })
        | Some(Commands::Extract {
            output: Some(dir), ..
        }) = &self.command
        {
            config.export_dir = dir.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy units from the source into the destination
    Migrate {
        /// Units to copy (repeatable; defaults to tv_drawings and tv_study_templates)
        #[arg(short, long = "unit", value_enum)]
        units: Vec<MigrationUnit>,

        /// Copy content verbatim without filling parsed_content
        #[arg(long)]
        raw: bool,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Fill parsed_content in place in the destination
    Augment {
        /// Units to augment (repeatable; defaults to all)
        #[arg(short, long = "unit", value_enum)]
        units: Vec<MigrationUnit>,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Write every record of one owner as JSON files
    Export {
        /// Owner (user_id) whose records are exported
        #[arg(long)]
        owner: i64,

        /// Units to export (repeatable; defaults to all)
        #[arg(short, long = "unit", value_enum)]
        units: Vec<MigrationUnit>,

        /// Output directory [env: BLOBMIG_EXPORT_DIR]
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a single record as JSON
    Extract {
        /// Unit the record belongs to
        #[arg(short, long, value_enum)]
        unit: MigrationUnit,

        /// Record id
        #[arg(long)]
        id: String,

        /// Output directory [env: BLOBMIG_EXPORT_DIR]
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show progress cursors and row counts
    Status {
        /// Show the augment progress instead of the copy progress
        #[arg(long)]
        augment: bool,
    },

    /// List the chart sources of an exported study template
    Inspect {
        /// Exported JSON file
        file: PathBuf,
    },
}
