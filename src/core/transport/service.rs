//! Runs whichever transport the configuration selected, stopping on Ctrl-C.

use tracing::info;

use super::{TransportConfig, TransportResult};
use crate::core::McpServer;

#[cfg(feature = "stdio")]
use super::stdio::StdioTransport;

#[cfg(feature = "tcp")]
use super::tcp::TcpTransport;

pub struct TransportService {
    config: TransportConfig,
}

impl TransportService {
    /// Create a new transport service with the given configuration.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Get the transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Serve clients until the transport finishes or Ctrl-C arrives.
    ///
    /// The server is not shut down here; the caller owns that step.
    pub async fn run(self, server: McpServer) -> TransportResult<()> {
        info!("Starting transport: {}", self.config.description());

        let transport = async move {
            match self.config {
                #[cfg(feature = "stdio")]
                TransportConfig::Stdio => StdioTransport::run(server).await,
                #[cfg(feature = "tcp")]
                TransportConfig::Tcp(cfg) => TcpTransport::new(cfg).run(server).await,
            }
        };

        tokio::select! {
            result = transport => result,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupt received, stopping transport");
                Ok(())
            }
        }
    }
}
