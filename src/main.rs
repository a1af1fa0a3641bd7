use anyhow::Result;
use sheetindex::http::HttpServer;
use sheetindex::mcp::McpServer;
use sheetindex::{format, Config, IndexManager, IndexService};
use std::sync::Arc;

/// Load config and open the index on the blocking pool.
async fn open_service(config: Config) -> Result<IndexService> {
    let manager = tokio::task::spawn_blocking(move || IndexManager::open(&config)).await??;
    Ok(IndexService::new(Arc::new(manager)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // MCP stdio mode owns stdout; env_logger writes to stderr.
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.index.log_level.as_str()),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("refresh");

    match command {
        "serve" => run_mcp_server(config).await?,
        "serve-http" => {
            let port = match args.get(2) {
                Some(p) => p
                    .parse::<u16>()
                    .map_err(|_| anyhow::anyhow!("Invalid port: {}", p))?,
                None => config.http_server.port,
            };
            run_http_server(config, port).await?
        }
        _ => run_refresh(config).await?,
    }

    Ok(())
}

/// Run MCP server (stdio transport)
async fn run_mcp_server(config: Config) -> Result<()> {
    log::info!("Starting sheetindex MCP server v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Directory: {}", config.watch_dir().display());

    let service = open_service(config).await?;
    let server = McpServer::new(service.clone());
    let served = server.run().await;

    service.call(|m| m.shutdown()).await?;
    served?;
    Ok(())
}

/// Run HTTP server
async fn run_http_server(config: Config, port: u16) -> Result<()> {
    log::info!("Starting sheetindex HTTP server v{}", env!("CARGO_PKG_VERSION"));

    let http_config = config.http_server.clone();
    let service = open_service(config).await?;
    let http_server = HttpServer::new(service.clone(), &http_config)?;

    tokio::select! {
        res = http_server.run(port) => res?,
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted, saving index"),
    }
    service.call(|m| m.shutdown()).await?;
    Ok(())
}

/// Default: refresh once and report
async fn run_refresh(config: Config) -> Result<()> {
    log::info!("Starting sheetindex v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Directory: {}", config.watch_dir().display());
    log::info!("Snapshot: {}", config.snapshot_path().display());

    let service = open_service(config).await?;
    let (changes, total) = service
        .call(|m| {
            let changes = m.refresh()?;
            Ok((changes, m.file_count()))
        })
        .await?;
    println!("{}", format::format_changes(&changes, total));
    Ok(())
}
