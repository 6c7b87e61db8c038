//! Mapping from backend failures to tool errors.

use crate::backends::{AcquireError, BackendFailure, BackendKind};

use super::error::{ErrorKind, ToolError};

/// Classify a failure reported while a tool talked to a backend of `kind`.
///
/// Every failure maps to exactly one [`ErrorKind`]. Anything not recognised
/// as an availability or timing problem is a rejection, with the backend's
/// own message kept.
pub fn translate(kind: BackendKind, failure: BackendFailure) -> ToolError {
    match failure {
        BackendFailure::Unreachable(msg) => {
            ToolError::new(ErrorKind::BackendUnavailable, format!("Backend unreachable: {msg}"))
        }
        BackendFailure::Authentication(msg) => {
            ToolError::new(ErrorKind::BackendUnavailable, format!("Authentication failed: {msg}"))
        }
        BackendFailure::HttpStatus {
            status: status @ (401 | 403),
            body,
            ..
        } if kind == BackendKind::HttpApi => ToolError::new(
            ErrorKind::BackendUnavailable,
            format!("Credentials rejected (HTTP {status}): {body}"),
        ),
        BackendFailure::HttpStatus {
            status: status @ (408 | 504),
            body,
            ..
        } => ToolError::new(ErrorKind::Timeout, format!("HTTP {status}: {body}")),
        BackendFailure::HttpStatus {
            status,
            body,
            retry_after,
        } => ToolError::remote_rejected(format!("HTTP {status}: {body}"))
            .with_retry_after(retry_after),
        BackendFailure::TimedOut(msg) => {
            ToolError::new(ErrorKind::Timeout, format!("Timed out: {msg}"))
        }
        failure @ (BackendFailure::Rejected(_)
        | BackendFailure::Protocol(_)
        | BackendFailure::Other(_)) => ToolError::remote_rejected(failure.to_string()),
    }
}

impl From<AcquireError> for ToolError {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::Closed(backend) => ToolError::closed(backend),
            AcquireError::NotConfigured(backend) => {
                ToolError::backend_unavailable(backend, format!("Backend '{backend}' is not enabled"))
            }
            AcquireError::Failed { backend, failure } => {
                ToolError::backend_unavailable(backend, format!("Backend '{backend}' is unavailable: {failure}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::BackendId;
    use std::time::Duration;

    fn http(status: u16) -> BackendFailure {
        BackendFailure::http_status(status, "body", None)
    }

    #[test]
    fn test_http_statuses() {
        let kind = BackendKind::HttpApi;
        assert_eq!(translate(kind, http(404)).kind, ErrorKind::RemoteRejected);
        assert_eq!(translate(kind, http(500)).kind, ErrorKind::RemoteRejected);
        assert_eq!(translate(kind, http(429)).kind, ErrorKind::RemoteRejected);
        assert_eq!(translate(kind, http(401)).kind, ErrorKind::BackendUnavailable);
        assert_eq!(translate(kind, http(403)).kind, ErrorKind::BackendUnavailable);
        assert_eq!(translate(kind, http(408)).kind, ErrorKind::Timeout);
        assert_eq!(translate(kind, http(504)).kind, ErrorKind::Timeout);
    }

    #[test]
    fn test_refused_and_timeout() {
        let refused = BackendFailure::Unreachable("connection refused".to_string());
        let timeout = BackendFailure::TimedOut("operation timed out".to_string());
        assert_eq!(
            translate(BackendKind::HttpApi, refused).kind,
            ErrorKind::BackendUnavailable
        );
        assert_eq!(translate(BackendKind::HttpApi, timeout).kind, ErrorKind::Timeout);
    }

    #[test]
    fn test_retry_after_is_kept() {
        let failure = BackendFailure::http_status(429, "slow down", Some(Duration::from_secs(9)));
        let err = translate(BackendKind::HttpApi, failure);
        assert_eq!(err.retry_after, Some(Duration::from_secs(9)));
        assert!(err.message.contains("slow down"));
    }

    #[test]
    fn test_rejections_keep_message() {
        let sql = BackendFailure::rejected("relation \"nope\" does not exist (SQLSTATE 42P01)");
        let err = translate(BackendKind::RelationalStore, sql);
        assert_eq!(err.kind, ErrorKind::RemoteRejected);
        assert!(err.message.contains("42P01"));

        let odd = BackendFailure::Other("something new".to_string());
        assert_eq!(
            translate(BackendKind::MessageBroker, odd).kind,
            ErrorKind::RemoteRejected
        );
    }

    #[test]
    fn test_every_failure_maps_for_every_kind() {
        let failures = [
            BackendFailure::Unreachable("x".to_string()),
            BackendFailure::Authentication("x".to_string()),
            http(400),
            http(401),
            http(408),
            http(503),
            BackendFailure::TimedOut("x".to_string()),
            BackendFailure::Rejected("x".to_string()),
            BackendFailure::Protocol("x".to_string()),
            BackendFailure::Other("x".to_string()),
        ];
        let kinds = [
            BackendKind::HttpApi,
            BackendKind::RelationalStore,
            BackendKind::KeyValueStore,
            BackendKind::MessageBroker,
        ];
        for kind in kinds {
            for failure in &failures {
                let err = translate(kind, failure.clone());
                assert!(ErrorKind::ALL.contains(&err.kind));
                assert!(!err.kind.is_client_error());
                assert_ne!(err.kind, ErrorKind::Closed);
                assert!(!err.message.is_empty());
            }
        }
    }

    #[test]
    fn test_acquire_errors() {
        let closed: ToolError = AcquireError::Closed(BackendId::Kafka).into();
        assert_eq!(closed.kind, ErrorKind::Closed);
        assert_eq!(closed.backend, Some(BackendId::Kafka));

        let failed: ToolError = AcquireError::Failed {
            backend: BackendId::Postgres,
            failure: BackendFailure::TimedOut("pool".to_string()),
        }
        .into();
        assert_eq!(failed.kind, ErrorKind::BackendUnavailable);
        assert_eq!(failed.backend, Some(BackendId::Postgres));
    }
    #[derive(Debug)]
    struct PgFailure {
        code: &'static str,
    }

    impl std::fmt::Display for PgFailure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "statement failed ({})", self.code)
        }
    }

    impl std::error::Error for PgFailure {}

    impl sqlx::error::DatabaseError for PgFailure {
        fn message(&self) -> &str {
            "statement failed"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(std::borrow::Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    #[test]
    fn test_native_kafka_errors() {
        use rskafka::client::error::{Error, ProtocolError, RequestContext, RequestError};

        let server = |protocol_error: ProtocolError| Error::ServerError {
            protocol_error,
            error_message: None,
            request: RequestContext::Topic("events".to_string()),
            response: None,
            is_virtual: false,
        };
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let gave_up = rskafka::BackoffError::DeadlineExceded {
            deadline: Duration::from_secs(1),
            source: "no broker answered".into(),
        };

        let cases = [
            (Error::Timeout, ErrorKind::Timeout),
            (server(ProtocolError::RequestTimedOut), ErrorKind::Timeout),
            (Error::Request(RequestError::IO(reset)), ErrorKind::BackendUnavailable),
            (Error::RetryFailed(gave_up), ErrorKind::BackendUnavailable),
            (
                server(ProtocolError::SaslAuthenticationFailed),
                ErrorKind::BackendUnavailable,
            ),
            (
                server(ProtocolError::TopicAuthorizationFailed),
                ErrorKind::BackendUnavailable,
            ),
            (
                server(ProtocolError::UnknownTopicOrPartition),
                ErrorKind::RemoteRejected,
            ),
            (server(ProtocolError::TopicAlreadyExists), ErrorKind::RemoteRejected),
            (
                Error::InvalidResponse("short read".to_string()),
                ErrorKind::RemoteRejected,
            ),
        ];
        for (err, expected) in cases {
            let failure = BackendFailure::from_kafka(&err);
            let tool_error = translate(BackendKind::MessageBroker, failure);
            assert_eq!(tool_error.kind, expected, "{err}");
        }
    }

    #[test]
    fn test_native_sqlx_errors() {
        let cases = [
            ("28000", ErrorKind::BackendUnavailable),
            ("28P01", ErrorKind::BackendUnavailable),
            ("57014", ErrorKind::Timeout),
            ("23505", ErrorKind::RemoteRejected),
            ("42P01", ErrorKind::RemoteRejected),
        ];
        for (code, expected) in cases {
            let err = sqlx::Error::Database(Box::new(PgFailure { code }));
            let failure = BackendFailure::from_sqlx(&err);
            let tool_error = translate(BackendKind::RelationalStore, failure);
            assert_eq!(tool_error.kind, expected, "SQLSTATE {code}");
        }

        let err = sqlx::Error::Database(Box::new(PgFailure { code: "23505" }));
        let failure = BackendFailure::from_sqlx(&err);
        let tool_error = translate(BackendKind::RelationalStore, failure);
        assert!(tool_error.message.contains("SQLSTATE 23505"));

        let pool = |err: sqlx::Error| {
            translate(BackendKind::RelationalStore, BackendFailure::from_sqlx(&err)).kind
        };
        assert_eq!(pool(sqlx::Error::PoolClosed), ErrorKind::BackendUnavailable);
        assert_eq!(pool(sqlx::Error::PoolTimedOut), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_native_reqwest_errors() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let refused = client.get("http://127.0.0.1:1/").send().await.unwrap_err();
        let tool_error = translate(BackendKind::HttpApi, BackendFailure::from_reqwest(&refused));
        assert_eq!(tool_error.kind, ErrorKind::BackendUnavailable);

        let malformed = client.get("not a url").send().await.unwrap_err();
        let tool_error = translate(BackendKind::HttpApi, BackendFailure::from_reqwest(&malformed));
        assert_eq!(tool_error.kind, ErrorKind::RemoteRejected);
    }
}
