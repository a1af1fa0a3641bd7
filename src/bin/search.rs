//! Search column names and preview rows of every indexed workbook.

use anyhow::Result;
use clap::Parser;
use sheetindex::{format, Config, IndexManager};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "search")]
#[command(about = "Search the spreadsheet index")]
struct Args {
    /// Case-insensitive search term
    query: String,
    /// Print raw matches as JSON instead of the formatted summary
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    if args.query.trim().is_empty() {
        anyhow::bail!("Query cannot be empty");
    }

    let config = Config::load()?;
    let manager = IndexManager::open(&config)?;

    let start = Instant::now();
    let results = manager.search(&args.query);
    let duration = start.elapsed();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("{}", format::format_search_results(&args.query, &results));
        let total: usize = results.values().map(Vec::len).sum();
        println!("\n{} matches in {} files ({:?})", total, results.len(), duration);
    }
    Ok(())
}
