//! Tool-specific error types.

use rmcp::ErrorData as McpError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::backends::BackendId;

/// The closed set of ways a tool call can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Arguments did not match the tool's schema.
    InvalidArgument,
    /// No tool with the requested name is registered.
    UnknownTool,
    /// The backend could not be reached or refused our credentials.
    BackendUnavailable,
    /// The backend was reached and refused this particular request.
    RemoteRejected,
    /// The backend did not answer in time.
    Timeout,
    /// The server is shutting down.
    Closed,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 6] = [
        Self::InvalidArgument,
        Self::UnknownTool,
        Self::BackendUnavailable,
        Self::RemoteRejected,
        Self::Timeout,
        Self::Closed,
    ];

    /// Snake-case name used in error data.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::UnknownTool => "unknown_tool",
            Self::BackendUnavailable => "backend_unavailable",
            Self::RemoteRejected => "remote_rejected",
            Self::Timeout => "timeout",
            Self::Closed => "closed",
        }
    }

    /// Whether the caller, not the backend, is at fault.
    pub fn is_client_error(self) -> bool {
        matches!(self, Self::InvalidArgument | Self::UnknownTool)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed tool call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
    /// The backend involved, when the failure concerns one.
    pub backend: Option<BackendId>,
    /// How long the backend asked us to wait before retrying.
    pub retry_after: Option<Duration>,
}

impl ToolError {
    /// Create an error of any kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            backend: None,
            retry_after: None,
        }
    }

    /// Create an "invalid argument" error naming the offending field.
    pub fn invalid_argument(field: &str, reason: impl fmt::Display) -> Self {
        Self::new(ErrorKind::InvalidArgument, format!("'{field}': {reason}"))
    }

    /// Create an "unknown tool" error.
    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorKind::UnknownTool, format!("Tool not found: {name}"))
    }

    /// Create a "backend unavailable" error.
    pub fn backend_unavailable(backend: BackendId, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnavailable, message).with_backend(backend)
    }

    /// Create a "remote rejected" error.
    pub fn remote_rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteRejected, message)
    }

    /// Create a "closed" error.
    pub fn closed(backend: BackendId) -> Self {
        Self::new(
            ErrorKind::Closed,
            format!("Server is shutting down; backend '{backend}' is closed"),
        )
        .with_backend(backend)
    }

    /// Tag the error with a backend.
    pub fn with_backend(mut self, backend: BackendId) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Attach a retry hint.
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Structured data attached to the protocol error.
    pub fn data(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind,
            "backend": self.backend,
            "retry_after_ms": self.retry_after.map(|d| d.as_millis() as u64),
        })
    }
}

/// Errors raised while assembling the tool registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two descriptors share a name.
    #[error("Tool registered twice: {0}")]
    Duplicate(String),
}

impl RegistryError {
    /// Create a new "duplicate" error.
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::Duplicate(name.into())
    }
}

/// Caller mistakes are invalid-params errors; everything else is internal.
impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let data = Some(err.data());
        if err.kind.is_client_error() {
            McpError::invalid_params(err.message, data)
        } else {
            McpError::internal_error(err.to_string(), data)
        }
    }
}
