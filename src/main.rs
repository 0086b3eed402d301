// claude-sessiond: supervises Claude Code sessions bridged to a chat feed.
//
// Configuration comes from the environment (optionally a .env file); the
// management surface is the SessionManager API consumed by an external
// tool layer.

use std::sync::Arc;

use anyhow::Result;

use claude_sessiond::{DaemonConfig, HttpFeed, MemoryStore, SessionManager};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = DaemonConfig::from_env();
    config.validate()?;

    let store = Arc::new(MemoryStore::new());
    let feed = Arc::new(HttpFeed::new(
        config.chat_api_url.clone(),
        config.service_token.clone(),
        config.feed_request_timeout,
    )?);

    let manager = SessionManager::start(store, feed, config).await?;

    log::info!("claude-sessiond {} running", claude_sessiond::VERSION);

    tokio::signal::ctrl_c().await?;
    log::info!("Received shutdown signal");

    manager.shutdown().await;
    log::info!("Daemon shutdown complete");
    Ok(())
}
