//! Tools domain module.
//!
//! Tools are the named operations MCP clients call. Each one is backed by a
//! single remote system (Jira, Postgres, Kafka, ...) reached through the
//! connection manager.
//!
//! ## Architecture
//!
//! - `definitions/` - Tool implementations, one module per backend
//! - `descriptor.rs` - Argument schema, validation and the descriptor type
//! - `registry.rs` - The read-only set of tools for the enabled backends
//! - `dispatch.rs` - Lookup, validate, acquire, invoke
//! - `normalize.rs` - Backend results to structured data or text
//! - `translate.rs` - Backend failures to tool error kinds
//! - `error.rs` - Tool-specific error types
//!
//! ## Adding a New Tool
//!
//! 1. Add a params struct and a tool struct to the backend's module in
//!    `definitions/`, with `NAME`, `DESCRIPTION`, `execute()` and
//!    `descriptor()`
//! 2. List the descriptor in that module's `tools()`
//!
//! The registry and the server pick it up from the catalogue.

pub mod definitions;
pub mod descriptor;
mod dispatch;
mod error;
mod normalize;
mod registry;
mod translate;

pub use descriptor::{Acquired, ArgSchema, ArgSpec, ArgType, InvokeError, InvokeResult, ToolDescriptor};
pub use dispatch::Dispatcher;
pub use error::{ErrorKind, RegistryError, ToolError};
pub use normalize::{NormalizedResult, RawOutput, normalize};
pub use registry::{ToolRegistry, ToolRegistryBuilder};
pub use translate::translate;
