//! TCP transport implementation.
//!
//! Raw TCP socket transport with JSON-RPC messages (line-delimited). Every
//! client shares the same server, and so the same backend connections.

use rmcp::ServiceExt;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use super::{TransportError, TransportResult, config::TcpConfig};
use crate::core::McpServer;

/// TCP transport handler.
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    /// Create a new TCP transport with the given config.
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Accept clients until the task is cancelled.
    pub async fn run(self, server: McpServer) -> TransportResult<()> {
        let addr = self.address();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        info!(%addr, "Ready - listening for JSON-RPC over TCP");

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    info!(%peer_addr, "Accepted connection");

                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%peer_addr, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let server = server.clone();
                    tokio::spawn(async move {
                        Self::handle_connection(server, stream, peer_addr).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    // Avoid spinning on persistent errors.
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_connection(server: McpServer, stream: TcpStream, peer_addr: SocketAddr) {
        let service = match server.serve(stream).await {
            Ok(s) => {
                info!(%peer_addr, "Client connected, serving");
                s
            }
            Err(e) => {
                warn!(%peer_addr, error = %e, "Failed to initialize service");
                return;
            }
        };

        match service.waiting().await {
            Ok(_) => info!(%peer_addr, "Client disconnected cleanly"),
            Err(e) => warn!(%peer_addr, error = %e, "Error while serving client"),
        }
    }
}
