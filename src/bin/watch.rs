//! Watch the workbook directory and refresh the index whenever a workbook changes.

use anyhow::Result;
use clap::Parser;
use sheetindex::watch::run_watcher;
use sheetindex::{Config, IndexManager, IndexService};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "watch")]
#[command(about = "Watch the workbook directory and keep the index current")]
struct Args {
    /// Debounce delay in milliseconds (defaults to watch.debounce_ms from config)
    #[arg(long)]
    debounce_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info"),
    )
    .init();

    let args = Args::parse();

    log::info!("Starting sheetindex watcher");
    let config = Config::load()?;
    let debounce_ms = args.debounce_ms.unwrap_or(config.watch.debounce_ms);
    log::info!("Directory: {}", config.watch_dir().display());
    log::info!("Debounce: {} ms", debounce_ms);

    let manager = tokio::task::spawn_blocking(move || IndexManager::open(&config)).await??;
    let service = IndexService::new(Arc::new(manager));

    log::info!("Watching for changes (Ctrl+C to stop)");
    tokio::select! {
        res = run_watcher(service.clone(), debounce_ms) => res?,
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted, saving index"),
    }
    service.call(|m| m.shutdown()).await?;
    Ok(())
}
