//! MCP Server implementation and lifecycle management.
//!
//! The server owns the connection manager and the tool registry. `tools/list`
//! reads the registry; `tools/call` goes through the [`Dispatcher`]. Backend
//! connections are opened on first use and closed by [`McpServer::shutdown`].

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, model::*, service::RequestContext,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::config::Config;
use super::error::Result;
use crate::backends::{ConnectionManager, Connector, LiveConnector, ShutdownReport};
use crate::domains::tools::{Dispatcher, ToolRegistry};

/// The main MCP server handler.
///
/// Cheap to clone: every clone shares the same registry and connections.
#[derive(Clone)]
pub struct McpServer {
    /// Server configuration.
    config: Arc<Config>,

    /// Tool lookup plus backend acquisition.
    dispatcher: Dispatcher,
}

impl McpServer {
    /// Create a server that opens real backend connections.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_connector(config, Arc::new(LiveConnector))
    }

    /// Create a server whose backend connections come from `connector`.
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Result<Self> {
        let registry = ToolRegistry::from_backends(&config.enabled_backends())?;
        let manager = ConnectionManager::new(config.backends.iter().cloned(), connector);

        Ok(Self {
            config: Arc::new(config),
            dispatcher: Dispatcher::new(Arc::new(registry), Arc::new(manager)),
        })
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.config.server.version
    }

    /// Get the server configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The registry of tools served.
    pub fn registry(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    /// The dispatcher behind `tools/call`.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Close every open backend connection. Later tool calls fail with
    /// `closed`.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.dispatcher.manager().shutdown().await
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(format!(
                "Tools for {} backend(s): Jira, Confluence, Bitbucket, Figma, PostgreSQL, \
                 Redis and Kafka, as configured. Call tools/list to see what is enabled.",
                self.config.backends.len()
            )),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    #[instrument(skip(self, _request, _context))]
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        info!(tools = self.registry().len(), "Listing tools");
        Ok(ListToolsResult {
            tools: self.registry().tools(),
            next_cursor: None,
            meta: None,
        })
    }

    #[instrument(skip(self, request, _context), fields(tool = %request.name))]
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.dispatcher
            .invoke(&request.name, request.arguments)
            .await
            .map(|result| result.into_call_result())
            .map_err(McpError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryConnector, MemoryKv};
    use crate::backends::{BackendConfig, BackendId, Connection};

    fn redis_config() -> Config {
        Config {
            backends: vec![BackendConfig::new(BackendId::Redis, "redis://memory")],
            ..Config::default()
        }
    }

    #[test]
    fn test_registry_follows_enabled_backends() {
        let server =
            McpServer::with_connector(redis_config(), Arc::new(MemoryConnector::new())).unwrap();
        assert_eq!(server.registry().len(), 4);
        assert!(server.get_info().capabilities.tools.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_closes_opened_backends() {
        let kv = Arc::new(MemoryKv::new());
        let connector = MemoryConnector::new()
            .with_connection(BackendId::Redis, Connection::KeyValue(kv.clone()));
        let server = McpServer::with_connector(redis_config(), Arc::new(connector)).unwrap();

        let mut args = JsonObject::new();
        args.insert("key".to_string(), serde_json::json!("k"));
        server
            .dispatcher()
            .invoke("redis_get", Some(args))
            .await
            .unwrap();

        let report = server.shutdown().await;
        assert_eq!(report.closed, vec![BackendId::Redis]);
        assert_eq!(kv.close_count(), 1);
    }
}
