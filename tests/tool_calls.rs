//! End-to-end tool calls through the server's dispatcher.
//!
//! HTTP backends run against a local mock server through the live reqwest
//! session; the other backend families use the in-memory stand-ins.

use rmcp::model::JsonObject;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use local_mcp_server::backends::memory::{MemoryBroker, MemoryConnector, MemoryKv, RecordingHttp};
use local_mcp_server::backends::{
    ApiBody, BackendConfig, BackendId, Connection, Credentials, PoolLimits,
};
use local_mcp_server::core::{Config, McpServer};
use local_mcp_server::domains::tools::{ErrorKind, NormalizedResult};

fn args(value: Value) -> Option<JsonObject> {
    value.as_object().cloned()
}

fn config_with(backends: Vec<BackendConfig>) -> Config {
    Config {
        backends,
        ..Config::default()
    }
}

fn structured(result: NormalizedResult) -> Value {
    match result {
        NormalizedResult::Structured(value) => value,
        NormalizedResult::Text(text) => panic!("expected structured output, got text: {text}"),
    }
}

fn jira_at(base: impl Into<String>, request_timeout: Duration) -> BackendConfig {
    BackendConfig::new(BackendId::Jira, base)
        .with_credentials(Credentials::Basic {
            username: "me@example.com".to_string(),
            secret: "token".to_string(),
        })
        .with_limits(PoolLimits {
            connect_timeout: Duration::from_secs(2),
            request_timeout,
            ..PoolLimits::default()
        })
}

fn memory_server(id: BackendId, address: &str, connection: Connection) -> McpServer {
    let connector = MemoryConnector::new().with_connection(id, connection);
    McpServer::with_connector(
        config_with(vec![BackendConfig::new(id, address)]),
        Arc::new(connector),
    )
    .unwrap()
}

// ============================================================================
// Key-value
// ============================================================================

#[tokio::test]
async fn test_missing_key_differs_from_empty_value() {
    let kv = Arc::new(MemoryKv::new().with_entry("empty", ""));
    let server = memory_server(BackendId::Redis, "redis://memory", Connection::KeyValue(kv));

    let missing = structured(
        server
            .dispatcher()
            .invoke("redis_get", args(json!({"key": "absent"})))
            .await
            .unwrap(),
    );
    let empty = structured(
        server
            .dispatcher()
            .invoke("redis_get", args(json!({"key": "empty"})))
            .await
            .unwrap(),
    );

    assert_eq!(missing["found"], false);
    assert_eq!(missing["value"], Value::Null);
    assert_eq!(empty["found"], true);
    assert_eq!(empty["value"], "");
}

#[tokio::test]
async fn test_invalid_arguments_reach_no_backend() {
    let kv = Arc::new(MemoryKv::new());
    let server = memory_server(
        BackendId::Redis,
        "redis://memory",
        Connection::KeyValue(kv.clone()),
    );

    let err = server
        .dispatcher()
        .invoke("redis_set", args(json!({"key": "k", "value": "v", "ttl": 0})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let err = server
        .dispatcher()
        .invoke("redis_get", args(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    assert_eq!(kv.calls(), 0);
}

// ============================================================================
// Broker
// ============================================================================

#[tokio::test]
async fn test_consume_returns_what_arrived_before_the_deadline() {
    let broker = Arc::new(MemoryBroker::new().with_topic("events", 1));
    let server = memory_server(BackendId::Kafka, "memory:9092", Connection::Broker(broker));

    for n in 0..3 {
        server
            .dispatcher()
            .invoke(
                "kafka_produce",
                args(json!({"topic": "events", "value": format!("m{n}")})),
            )
            .await
            .unwrap();
    }

    let consumed = structured(
        server
            .dispatcher()
            .invoke(
                "kafka_consume",
                args(json!({"topic": "events", "count": 5, "timeout_ms": 1000})),
            )
            .await
            .unwrap(),
    );

    let messages = consumed.as_array().unwrap();
    assert_eq!(messages.len(), 3);
    let offsets: Vec<i64> = messages.iter().map(|m| m["offset"].as_i64().unwrap()).collect();
    assert_eq!(offsets, vec![0, 1, 2]);
    assert_eq!(messages[0]["value"], "m0");
    assert_eq!(messages[2]["value"], "m2");
}

// ============================================================================
// HTTP APIs
// ============================================================================

#[tokio::test]
async fn test_concurrent_creates_both_execute() {
    let api = Arc::new(RecordingHttp::new(|_| {
        Ok(ApiBody::Json(json!({"key": "PROJ-1"})))
    }));
    let server = memory_server(
        BackendId::Jira,
        "https://jira.example/rest/api/3",
        Connection::Http(api.clone()),
    );

    let call = json!({"project_key": "PROJ", "summary": "Same summary"});
    let (first, second) = tokio::join!(
        server.dispatcher().invoke("jira_create_issue", args(call.clone())),
        server.dispatcher().invoke("jira_create_issue", args(call)),
    );
    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(api.requests().len(), 2);
}

#[tokio::test]
async fn test_remote_statuses_become_rejections() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/NOPE-1"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Issue does not exist"))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/BOOM-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&mock)
        .await;

    let base = format!("{}/rest/api/3", mock.uri());
    let server = McpServer::new(config_with(vec![jira_at(base, Duration::from_secs(5))])).unwrap();

    let not_found = server
        .dispatcher()
        .invoke("jira_get_issue", args(json!({"issue_key": "NOPE-1"})))
        .await
        .unwrap_err();
    assert_eq!(not_found.kind, ErrorKind::RemoteRejected);
    assert!(not_found.message.contains("404"));
    assert!(not_found.message.contains("Issue does not exist"));

    let server_error = server
        .dispatcher()
        .invoke("jira_get_issue", args(json!({"issue_key": "BOOM-1"})))
        .await
        .unwrap_err();
    assert_eq!(server_error.kind, ErrorKind::RemoteRejected);
}

#[tokio::test]
async fn test_live_issue_lookup() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/PROJ-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key": "PROJ-7",
            "self": "https://jira.example/rest/api/3/issue/10007",
            "fields": {
                "summary": "Broken build",
                "status": {"name": "Open"},
                "assignee": null,
                "priority": {"name": "High"},
                "description": null
            }
        })))
        .mount(&mock)
        .await;

    let base = format!("{}/rest/api/3", mock.uri());
    let server = McpServer::new(config_with(vec![jira_at(base, Duration::from_secs(5))])).unwrap();

    let issue = structured(
        server
            .dispatcher()
            .invoke("jira_get_issue", args(json!({"issue_key": "PROJ-7"})))
            .await
            .unwrap(),
    );
    assert_eq!(issue["key"], "PROJ-7");
    assert_eq!(issue["summary"], "Broken build");
    assert_eq!(issue["status"], "Open");
    assert_eq!(issue["assignee"], "Unassigned");
    assert_eq!(issue["priority"], "High");
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"key": "SLOW-1"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock)
        .await;

    let base = format!("{}/rest/api/3", mock.uri());
    let server =
        McpServer::new(config_with(vec![jira_at(base, Duration::from_millis(200))])).unwrap();

    let err = server
        .dispatcher()
        .invoke("jira_get_issue", args(json!({"issue_key": "SLOW-1"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
}

#[tokio::test]
async fn test_refused_connection_is_unavailable() {
    // Nothing listens on port 1.
    let server = McpServer::new(config_with(vec![jira_at(
        "http://127.0.0.1:1/rest/api/3",
        Duration::from_secs(2),
    )]))
    .unwrap();

    let err = server
        .dispatcher()
        .invoke("jira_get_issue", args(json!({"issue_key": "PROJ-1"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::BackendUnavailable);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_calls_after_shutdown_are_closed() {
    let kv = Arc::new(MemoryKv::new().with_entry("k", "v"));
    let server = memory_server(
        BackendId::Redis,
        "redis://memory",
        Connection::KeyValue(kv.clone()),
    );

    server
        .dispatcher()
        .invoke("redis_get", args(json!({"key": "k"})))
        .await
        .unwrap();
    assert!(server.shutdown().await.is_clean());

    let err = server
        .dispatcher()
        .invoke("redis_get", args(json!({"key": "k"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Closed);
    assert_eq!(kv.calls(), 1);
}

#[tokio::test]
async fn test_unknown_and_disabled_tools() {
    let server = memory_server(
        BackendId::Redis,
        "redis://memory",
        Connection::KeyValue(Arc::new(MemoryKv::new())),
    );

    let err = server
        .dispatcher()
        .invoke("does_not_exist", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownTool);

    // Jira is not enabled, so its tools are not registered at all.
    let err = server
        .dispatcher()
        .invoke("jira_search", args(json!({"jql": "project = X"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownTool);
}
