//! One MCP session over stdin/stdout.
//!
//! Stdout carries protocol frames only; logs go to stderr. The session ends
//! when the client closes stdin.

use rmcp::ServiceExt;
use tracing::info;

use super::{TransportError, TransportResult};
use crate::core::McpServer;

pub struct StdioTransport;

impl StdioTransport {
    /// Serve one client over stdin/stdout until it disconnects.
    pub async fn run(server: McpServer) -> TransportResult<()> {
        info!(tools = server.registry().list().len(), "Serving MCP over stdio");

        let session = server
            .serve(rmcp::transport::stdio())
            .await
            .map_err(|e| TransportError::handshake(e.to_string()))?;

        session
            .waiting()
            .await
            .map_err(|e| TransportError::session(e.to_string()))?;

        info!("Client closed stdin");
        Ok(())
    }
}
