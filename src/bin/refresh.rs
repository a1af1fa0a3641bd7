//! Rescan the workbook directory once and print what changed.

use anyhow::Result;
use clap::Parser;
use sheetindex::{format, Config, IndexManager};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "refresh")]
#[command(about = "Refresh the spreadsheet index and report added, updated and removed files")]
struct Args {
    /// Print the change set as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info"),
    )
    .init();

    let args = Args::parse();
    let config = Config::load()?;

    let start = Instant::now();
    let manager = IndexManager::open(&config)?;
    let changes = manager.refresh()?;
    let duration = start.elapsed();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
    } else {
        println!("{}", format::format_changes(&changes, manager.file_count()));
        println!("Snapshot: {}", config.snapshot_path().display());
        println!("Elapsed: {:?}", duration);
    }
    Ok(())
}
