//! blobmig CLI - Main entry point

use blobmig::commands::{self, select_units};
use blobmig::{Cli, Commands, MigrateConfig, MigrationUnit};
use blobmig_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use clap::Parser;
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Handle markdown help generation
    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(command) = cli.command.as_ref() else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    // Progress bars replace per-batch logs unless verbose
    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        })
        .output(LogOutput::Console)
        .log_file_prefix("blobmig")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    let result = execute_command(&cli, command).await;

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        // Flush file logs before exiting
        drop(guard);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, command: &Commands) -> anyhow::Result<()> {
    let config = cli.apply(MigrateConfig::load()?)?;

    match command {
        Commands::Migrate {
            units,
            raw,
            no_progress,
        } => {
            let units = select_units(&config, units, &MigrationUnit::COPY_DEFAULT);
            commands::migrate::run(&config, &units, *raw, !no_progress).await?
        },

        Commands::Augment { units, no_progress } => {
            let units = select_units(&config, units, &MigrationUnit::ALL);
            commands::augment::run(&config, &units, !no_progress).await?
        },

        Commands::Export { owner, units, .. } => {
            let units = select_units(&config, units, &MigrationUnit::ALL);
            commands::export::run(&config, *owner, &units).await?
        },

        Commands::Extract { unit, id, .. } => commands::export::extract(&config, *unit, id).await?,

        Commands::Status { augment } => commands::status::run(&config, *augment).await?,

        Commands::Inspect { file } => commands::inspect::run(file).await?,
    }

    Ok(())
}
