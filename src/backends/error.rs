//! Backend failure capture.
//!
//! Every adapter converts its native error type into a [`BackendFailure`]
//! before returning, so nothing native escapes the backends layer. The
//! variants describe *what happened* on the wire; deciding which
//! user-facing error kind that becomes is the job of the tool layer's
//! translator.

use rskafka::client::error::{Error as KafkaError, ProtocolError, RequestError};
use std::time::Duration;
use thiserror::Error;

/// Longest remote error body kept in a failure message.
const MAX_BODY_CHARS: usize = 2_000;

/// A classified failure reported by a backend or its client library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendFailure {
    /// The backend could not be reached (refused, DNS, TLS, pool closed).
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend rejected the configured credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// An HTTP API answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    /// The request or the connection attempt ran out of time.
    #[error("timed out: {0}")]
    TimedOut(String),

    /// The backend understood the request and refused it (SQL error,
    /// constraint violation, broker server error).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The backend answered with something that could not be decoded.
    #[error("malformed response: {0}")]
    Protocol(String),

    /// Anything the client library reported that fits no other variant.
    #[error("{0}")]
    Other(String),
}

impl BackendFailure {
    /// Create an HTTP status failure, truncating very long bodies.
    pub fn http_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let body = if body.chars().count() > MAX_BODY_CHARS {
            let cut: String = body.chars().take(MAX_BODY_CHARS).collect();
            format!("{cut}...")
        } else {
            body.to_string()
        };
        Self::HttpStatus {
            status,
            body,
            retry_after,
        }
    }

    /// Create a protocol failure.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a rejection failure.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Classify a reqwest error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TimedOut(err.to_string())
        } else if err.is_connect() {
            Self::Unreachable(err.to_string())
        } else if let Some(status) = err.status() {
            Self::http_status(status.as_u16(), &err.to_string(), None)
        } else if err.is_decode() || err.is_body() {
            Self::Protocol(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }

    /// Classify an sqlx error.
    pub fn from_sqlx(err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Unreachable(err.to_string()),
            sqlx::Error::PoolTimedOut => Self::TimedOut(err.to_string()),
            sqlx::Error::Protocol(msg) => Self::Protocol(msg.clone()),
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                let message = if code.is_empty() {
                    db.message().to_string()
                } else {
                    format!("{} (SQLSTATE {})", db.message(), code)
                };
                match code.as_str() {
                    // invalid_authorization_specification, invalid_password
                    "28000" | "28P01" => Self::Authentication(message),
                    // query_canceled (statement_timeout)
                    "57014" => Self::TimedOut(message),
                    _ => Self::Rejected(message),
                }
            }
            other => Self::Rejected(other.to_string()),
        }
    }

    /// Classify a redis error.
    pub fn from_redis(err: &redis::RedisError) -> Self {
        if err.is_timeout() {
            Self::TimedOut(err.to_string())
        } else if err.kind() == redis::ErrorKind::AuthenticationFailed {
            Self::Authentication(err.to_string())
        } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error()
        {
            Self::Unreachable(err.to_string())
        } else {
            Self::Rejected(err.to_string())
        }
    }

    /// Classify an rskafka error.
    pub fn from_kafka(err: &KafkaError) -> Self {
        match err {
            KafkaError::Connection(_)
            | KafkaError::RetryFailed(_)
            | KafkaError::Request(RequestError::IO(_) | RequestError::Poisoned(_)) => {
                Self::Unreachable(err.to_string())
            }
            KafkaError::Timeout
            | KafkaError::ServerError {
                protocol_error: ProtocolError::RequestTimedOut,
                ..
            } => Self::TimedOut(err.to_string()),
            KafkaError::ServerError {
                protocol_error:
                    ProtocolError::SaslAuthenticationFailed
                    | ProtocolError::TopicAuthorizationFailed
                    | ProtocolError::ClusterAuthorizationFailed,
                ..
            } => Self::Authentication(err.to_string()),
            KafkaError::InvalidResponse(msg) => Self::Protocol(msg.clone()),
            _ => Self::Rejected(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_http_body_truncated() {
        let body = "x".repeat(MAX_BODY_CHARS + 50);
        let failure = BackendFailure::http_status(500, &body, None);
        match failure {
            BackendFailure::HttpStatus { body, .. } => {
                assert!(body.ends_with("..."));
                assert_eq!(body.chars().count(), MAX_BODY_CHARS + 3);
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn test_redis_refusal_is_unreachable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = redis::RedisError::from(io);
        assert!(matches!(
            BackendFailure::from_redis(&err),
            BackendFailure::Unreachable(_)
        ));
    }

    #[test]
    fn test_sqlx_pool_timeout_is_timeout() {
        assert!(matches!(
            BackendFailure::from_sqlx(&sqlx::Error::PoolTimedOut),
            BackendFailure::TimedOut(_)
        ));
        assert!(matches!(
            BackendFailure::from_sqlx(&sqlx::Error::PoolClosed),
            BackendFailure::Unreachable(_)
        ));
    }
}
