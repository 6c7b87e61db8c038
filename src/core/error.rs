//! Error types and handling for the MCP server.
//!
//! Tool calls report failures through [`ToolError`](crate::domains::tools::ToolError);
//! this type covers everything around them: configuration, startup and the
//! transport.

use thiserror::Error;

use super::transport::TransportError;
use crate::domains::tools::RegistryError;

/// A specialized Result type for MCP server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the MCP server.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration-related errors. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The tool registry could not be assembled.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
