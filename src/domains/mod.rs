//! Domains module containing the MCP-facing business logic.
//!
//! The server only exposes tools; each tool is a thin operation over one of
//! the configured backends.

pub mod tools;
