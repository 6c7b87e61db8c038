//! Dispatch of one tool call: lookup, validate, acquire, invoke, then
//! normalize the result or translate the failure.

use rmcp::model::JsonObject;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::backends::ConnectionManager;

use super::descriptor::{Acquired, InvokeError};
use super::error::ToolError;
use super::normalize::{NormalizedResult, normalize};
use super::registry::ToolRegistry;
use super::translate::translate;

/// Runs tool calls against a registry and a connection manager.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    manager: Arc<ConnectionManager>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, manager: Arc<ConnectionManager>) -> Self {
        Self { registry, manager }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Run the named tool.
    ///
    /// Arguments are validated before any backend is touched, and every
    /// required backend is acquired before the tool runs; the first
    /// acquisition failure ends the call. Nothing is retried.
    #[instrument(skip(self, args), fields(tool = %name))]
    pub async fn invoke(
        &self,
        name: &str,
        args: Option<JsonObject>,
    ) -> Result<NormalizedResult, ToolError> {
        let descriptor = self
            .registry
            .lookup(name)
            .ok_or_else(|| ToolError::unknown_tool(name))?;

        let args = descriptor.schema.validate(args)?;

        let mut acquired = Acquired::new();
        for &backend in descriptor.backends() {
            let connection = self.manager.acquire(backend).await.map_err(|e| {
                warn!(%backend, error = %e, "Backend acquisition failed");
                ToolError::from(e)
            })?;
            acquired.insert(backend, connection);
        }

        let primary = descriptor.primary_backend();
        debug!(%primary, "Invoking tool");
        match descriptor.invoke(args, acquired).await {
            Ok(raw) => Ok(normalize(primary.kind(), raw)),
            Err(InvokeError::Tool(err)) => Err(err),
            Err(InvokeError::Backend(failure)) => {
                let err = translate(primary.kind(), failure).with_backend(primary);
                warn!(kind = %err.kind, message = %err.message, "Tool call failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryConnector, MemoryKv};
    use crate::backends::{BackendConfig, BackendFailure, BackendId, Connection};
    use crate::domains::tools::descriptor::{ArgSpec, ToolDescriptor};
    use crate::domains::tools::error::ErrorKind;
    use crate::domains::tools::normalize::RawOutput;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct KeyParams {
        key: String,
    }

    fn two_backend_tool() -> ToolDescriptor {
        ToolDescriptor::new(
            "cache_then_publish",
            "Read from the cache, publish to the broker",
            BackendId::Redis,
            vec![ArgSpec::string("key", "Key").required()],
            |params: KeyParams, acquired: Acquired| async move {
                let kv = acquired.kv(BackendId::Redis)?;
                let value = kv.get(&params.key).await?;
                Ok(RawOutput::KvValue {
                    key: params.key,
                    value,
                })
            },
        )
        .also_requires(BackendId::Kafka)
    }

    fn dispatcher(connector: Arc<MemoryConnector>) -> Dispatcher {
        let enabled = [BackendId::Redis, BackendId::Kafka];
        let registry = ToolRegistry::from_descriptors(&enabled, vec![two_backend_tool()]).unwrap();
        let manager = ConnectionManager::new(
            [
                BackendConfig::new(BackendId::Redis, "redis://memory"),
                BackendConfig::new(BackendId::Kafka, "memory:9092"),
            ],
            connector,
        );
        Dispatcher::new(Arc::new(registry), Arc::new(manager))
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let dispatcher = dispatcher(Arc::new(MemoryConnector::new()));
        let err = dispatcher.invoke("nope", None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownTool);
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_acquire() {
        let connector = Arc::new(MemoryConnector::new());
        let dispatcher = dispatcher(connector.clone());
        let err = dispatcher
            .invoke("cache_then_publish", json!({"key": 1}).as_object().cloned())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert_eq!(connector.attempts(BackendId::Redis), 0);
        assert_eq!(connector.attempts(BackendId::Kafka), 0);
    }

    #[tokio::test]
    async fn test_fail_fast_on_second_backend() {
        let kv = Arc::new(MemoryKv::new().with_entry("k", "v"));
        let connector = Arc::new(
            MemoryConnector::new().with_connection(BackendId::Redis, Connection::KeyValue(kv.clone())),
        );
        connector.fail(
            BackendId::Kafka,
            BackendFailure::Unreachable("connection refused".to_string()),
        );
        let dispatcher = dispatcher(connector);

        let err = dispatcher
            .invoke("cache_then_publish", json!({"key": "k"}).as_object().cloned())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::BackendUnavailable);
        assert_eq!(err.backend, Some(BackendId::Kafka));
        assert_eq!(kv.calls(), 0);
    }

    #[tokio::test]
    async fn test_success_is_normalized_by_primary_kind() {
        let kv = Arc::new(MemoryKv::new().with_entry("k", "v"));
        let connector = Arc::new(
            MemoryConnector::new()
                .with_connection(BackendId::Redis, Connection::KeyValue(kv))
                .with_connection(
                    BackendId::Kafka,
                    Connection::Broker(Arc::new(crate::backends::memory::MemoryBroker::new())),
                ),
        );
        let dispatcher = dispatcher(connector);
        let result = dispatcher
            .invoke("cache_then_publish", json!({"key": "k"}).as_object().cloned())
            .await
            .unwrap();
        assert_eq!(
            result,
            NormalizedResult::Structured(json!({"key": "k", "found": true, "value": "v"}))
        );
    }
}
