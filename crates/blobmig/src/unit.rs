//! Migration units
//!
//! The set of tables blobmig knows how to move is closed: each unit carries
//! its table name, key type and destination schema statically, so no SQL is
//! ever built from user input.

use blobmig_common::KeyType;
use serde::{Deserialize, Serialize};

/// A table of compressed chart records migrated as one resumable stream
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum MigrationUnit {
    /// Saved chart layouts (integer ids)
    #[serde(rename = "tv_chart_layouts")]
    #[value(name = "tv_chart_layouts", alias = "chart_layouts")]
    ChartLayouts,

    /// User drawings (integer ids)
    #[serde(rename = "tv_drawings")]
    #[value(name = "tv_drawings", alias = "drawings")]
    Drawings,

    /// Study templates (text ids)
    #[serde(rename = "tv_study_templates")]
    #[value(name = "tv_study_templates", alias = "study_templates")]
    StudyTemplates,
}

impl MigrationUnit {
    /// Every known unit, in processing order
    pub const ALL: [MigrationUnit; 3] = [
        MigrationUnit::ChartLayouts,
        MigrationUnit::Drawings,
        MigrationUnit::StudyTemplates,
    ];

    /// Units moved by the bulk copy, matching the tables the source exports
    pub const COPY_DEFAULT: [MigrationUnit; 2] =
        [MigrationUnit::Drawings, MigrationUnit::StudyTemplates];

    /// Table name in both source and destination; also the progress file key
    pub fn table_name(self) -> &'static str {
        match self {
            MigrationUnit::ChartLayouts => "tv_chart_layouts",
            MigrationUnit::Drawings => "tv_drawings",
            MigrationUnit::StudyTemplates => "tv_study_templates",
        }
    }

    pub fn key_type(self) -> KeyType {
        match self {
            MigrationUnit::ChartLayouts | MigrationUnit::Drawings => KeyType::Integer,
            MigrationUnit::StudyTemplates => KeyType::Text,
        }
    }

    /// Destination DDL, safe to run on every start
    pub fn create_table_sql(self) -> &'static str {
        match self {
            MigrationUnit::ChartLayouts => {
                r#"
                CREATE TABLE IF NOT EXISTS tv_chart_layouts (
                    id INTEGER PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    content BLOB,
                    parsed_content TEXT
                )
                "#
            },
            MigrationUnit::Drawings => {
                r#"
                CREATE TABLE IF NOT EXISTS tv_drawings (
                    id INTEGER PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    content BLOB,
                    parsed_content TEXT
                )
                "#
            },
            MigrationUnit::StudyTemplates => {
                r#"
                CREATE TABLE IF NOT EXISTS tv_study_templates (
                    id TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    content BLOB,
                    parsed_content TEXT
                )
                "#
            },
        }
    }
}

impl std::fmt::Display for MigrationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

impl std::str::FromStr for MigrationUnit {
    type Err = crate::error::MigrateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        let name = name.strip_prefix("tv_").unwrap_or(&name);
        match name {
            "chart_layouts" => Ok(MigrationUnit::ChartLayouts),
            "drawings" => Ok(MigrationUnit::Drawings),
            "study_templates" => Ok(MigrationUnit::StudyTemplates),
            _ => Err(crate::error::MigrateError::config(format!(
                "Unknown migration unit '{}'. Expected one of: tv_chart_layouts, tv_drawings, tv_study_templates",
                s
            ))),
        }
    }
}
