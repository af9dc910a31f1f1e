use anyhow::{Context, Result};
use clap::{Args, Parser, error::ErrorKind};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use vmove::{MoveConfig, Mover, logging};

#[derive(Parser)]
#[command(name = "vmove")]
#[command(
    about = "Move a directory tree, verifying every file before deleting it",
    long_about = None
)]
struct Cli {
    /// Path to move
    source: PathBuf,

    /// Where the tree ends up; must not exist yet
    destination: PathBuf,

    #[command(flatten)]
    options: MoveArgs,
}

#[derive(Args, Serialize)]
struct MoveArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    workers: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    queue_depth: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    sync_files: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    prune_source_dirs: Option<bool>,

    #[serde(rename = "show_progress", skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    progress: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    json_logs: Option<bool>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            // Usage problems go to stdout with status 1.
            println!("{}", e.render());
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = MoveConfig::new(Some(&cli.options)).context("Invalid configuration")?;
    logging::init(logging::LogConfig::from(&config));

    println!(
        "moving: {} -> {}",
        cli.source.display(),
        cli.destination.display()
    );

    let show_progress = config.show_progress;
    let result = Mover::new(config)
        .run(&cli.source, &cli.destination)
        .await;

    if show_progress {
        // Finish the carriage-return progress line.
        println!();
    }

    let report = result?;
    println!("Moving took {:?}... done!", report.elapsed);

    Ok(())
}
