//! Print rows of one sheet as a markdown table.

use anyhow::Result;
use clap::Parser;
use sheetindex::{format, Config, IndexManager, ReadOutcome};

#[derive(Parser, Debug)]
#[command(name = "read")]
#[command(about = "Read a sheet from an indexed workbook")]
struct Args {
    /// Workbook filename inside the watched directory
    filename: String,
    /// Sheet name
    sheet: String,
    /// Rows to return (clamped to read.max_rows)
    #[arg(long)]
    max_rows: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = Config::load()?;
    let manager = IndexManager::open(&config)?;

    let requested = args.max_rows.unwrap_or(config.read.default_rows);
    match manager.read_sheet_outcome(&args.filename, &args.sheet, requested) {
        ReadOutcome::Rows(rows) => {
            println!("{}", format::format_sheet_table(&args.filename, &args.sheet, &rows));
        }
        ReadOutcome::FileNotFound => anyhow::bail!("File '{}' not found", args.filename),
        ReadOutcome::SheetNotFound => anyhow::bail!(
            "Sheet '{}' not found in file '{}'",
            args.sheet,
            args.filename
        ),
        ReadOutcome::Failed(reason) => anyhow::bail!(
            "Unable to read sheet '{}' in file '{}': {}",
            args.sheet,
            args.filename,
            reason
        ),
    }
    Ok(())
}
