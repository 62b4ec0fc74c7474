//! AniList MCP server
//!
//! Entry point: loads `.env` and layered configuration, installs tracing,
//! then serves the MCP HTTP transport until Ctrl-C.

use std::sync::Arc;

use anilist_mcp::config::AppConfig;
use anilist_mcp::{server, telemetry};
use dotenvy::dotenv;
use mimalloc::MiMalloc;
use tracing::info;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let config = match AppConfig::load() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing (M-LOG-STRUCTURED)
    telemetry::init(config.logging.json);

    info!(
        name: "app.starting",
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "Starting AniList MCP server"
    );

    server::start_server(config).await
}
