//! swcache server entry point.
//!
//! Loads configuration, opens the cache database and boots the MCP server
//! on stdio transport. Logging goes to stderr to avoid interfering with the
//! JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use swcache_client::{FetchClient, FetchConfig};
use swcache_core::{AppConfig, AssetCacheWorker, CacheDb};
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, db = %config.db_path.display(), "Starting swcache server on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let client = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let worker = AssetCacheWorker::from_config(db, client, &config)?;

    let handler = handler::SwcacheServer::new(worker);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
