//! Build automation tasks for blobmig
//!
//! - `generate-cli-docs`: render the command-line reference to Markdown

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for blobmig", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<blobmig::Cli>();

    let content = format!(
        r#"# blobmig CLI Reference

Generated from the CLI definitions on {}.

## Environment Variables

Every setting can come from the environment or a `.env` file; flags win.

- `SOURCE_DATABASE_URL` - source database (`postgres://...` or `sqlite:...`)
- `DEST_DATABASE_URL` - destination SQLite database
- `BLOBMIG_BATCH_SIZE` - records per batch (default: `100`)
- `BLOBMIG_PROGRESS_FILE` - progress file (default: `batch_progress.json` for `migrate`, `progress.json` for `augment`)
- `BLOBMIG_CODEC` - `lz4-block` (default) or `gzip`
- `BLOBMIG_UNITS` - comma-separated units, e.g. `tv_drawings,tv_study_templates`
- `BLOBMIG_MAX_DEPTH` - JSON normalization depth limit (default: `256`)
- `BLOBMIG_EXPORT_DIR` - export directory (default: `output`)
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR` - logging

## Resuming

`migrate` and `augment` save a cursor per unit after every committed batch.
Re-running the same command continues after the last committed record.
A corrupt progress file stops the run; fix or remove it by hand.

{}
---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("✅ Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
