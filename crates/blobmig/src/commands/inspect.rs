//! `blobmig inspect` command implementation
//!
//! Lists the chart sources of an exported study template.

use crate::error::Result;
use crate::template::summarize;
use colored::Colorize;
use std::path::Path;

const NA: &str = "N/A";

/// Print pane sources of a template JSON file
pub async fn run(file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file).await?;
    let doc: serde_json::Value = serde_json::from_str(&text)?;

    println!("{}", "Sources details:".cyan().bold());
    for pane in summarize(&doc) {
        println!();
        println!("Pane {}:", pane.index);
        for source in pane.sources {
            println!("  Source ID: {}", source.id.as_deref().unwrap_or(NA));
            println!("    Name: {}", source.name.as_deref().unwrap_or(NA));
            println!("    Symbol: {}", source.symbol.as_deref().unwrap_or(NA));
        }
    }

    Ok(())
}
