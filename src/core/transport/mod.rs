//! How MCP clients reach the server.
//!
//! `stdio` serves the single client that launched the process. `tcp` accepts
//! many clients at once, all sharing one [`McpServer`](crate::core::McpServer)
//! and therefore one set of backend connections. Neither transport shuts the
//! backends down; `main` does that after the transport returns.

mod config;
mod error;
mod service;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "stdio")]
pub mod stdio;

pub use config::TransportConfig;
pub use error::{TransportError, TransportResult};
pub use service::TransportService;

#[cfg(feature = "tcp")]
pub use config::TcpConfig;
