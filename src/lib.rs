//! Local MCP Server Library
//!
//! An MCP server that exposes Jira, Confluence, Bitbucket, Figma, PostgreSQL,
//! Redis and Kafka as tools. Only backends enabled in the environment are
//! advertised, and each backend connection is opened on first use.
//!
//! # Architecture
//!
//! - **backends**: Connection ports, live adapters, in-memory stand-ins and
//!   the lazy connection manager
//! - **core**: Configuration, error handling, the server handler and its
//!   transports
//! - **domains**: Business logic organized by bounded contexts
//!   - **tools**: Tool definitions, registry, dispatch, result
//!     normalization and error translation
//!
//! # Example
//!
//! ```rust,no_run
//! use local_mcp_server::core::{Config, McpServer, TransportService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let server = McpServer::new(config.clone())?;
//!     TransportService::new(config.transport).run(server.clone()).await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod backends;
pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Error, McpServer, Result};
