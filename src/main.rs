//! MCP Server Entry Point
//!
//! Loads configuration, initializes logging, serves the configured transport
//! and closes backend connections on the way out.

use anyhow::Result;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use local_mcp_server::core::{Config, McpServer, TransportService};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration problems are fatal before anything is served
    let config = Config::from_env()?;

    init_logging(&config.logging.level);

    info!("Starting {} v{}", config.server.name, config.server.version);
    info!(backends = ?config.enabled_backends(), "Backends enabled");

    let server = McpServer::new(config.clone())?;
    info!(tools = server.registry().len(), "Server initialized");

    let transport = TransportService::new(config.transport);
    let served = transport.run(server.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "Transport failed");
    }

    info!("Server shutting down");
    let report = server.shutdown().await;
    for (backend, failure) in &report.failures {
        warn!(%backend, %failure, "Backend did not close cleanly");
    }

    served?;
    Ok(())
}

/// Initialize the logging subsystem.
///
/// Logs go to stderr; stdout belongs to the stdio transport.
fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
