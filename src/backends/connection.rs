//! The native connection held by a handle, and the factory that opens it.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::broker::{KafkaBroker, MessageBroker};
use super::config::{BackendConfig, BackendKind};
use super::error::BackendFailure;
use super::http::{HttpApi, HttpSession};
use super::kv::{KvStore, RedisStore};
use super::sql::{PgStore, SqlStore};

/// A live connection to one backend. Cloning shares the underlying client.
#[derive(Clone)]
pub enum Connection {
    Http(Arc<dyn HttpApi>),
    Relational(Arc<dyn SqlStore>),
    KeyValue(Arc<dyn KvStore>),
    Broker(Arc<dyn MessageBroker>),
}

impl Connection {
    /// The family of backend this connection talks to.
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Http(_) => BackendKind::HttpApi,
            Self::Relational(_) => BackendKind::RelationalStore,
            Self::KeyValue(_) => BackendKind::KeyValueStore,
            Self::Broker(_) => BackendKind::MessageBroker,
        }
    }

    /// Release the native resource.
    pub async fn close(&self) -> Result<(), BackendFailure> {
        match self {
            Self::Http(api) => api.close().await,
            Self::Relational(store) => store.close().await,
            Self::KeyValue(store) => store.close().await,
            Self::Broker(broker) => broker.close().await,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection({})", self.kind())
    }
}

/// Opens the native connection for a backend.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &BackendConfig) -> Result<Connection, BackendFailure>;
}

/// Connector for real network backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveConnector;

#[async_trait]
impl Connector for LiveConnector {
    async fn connect(&self, config: &BackendConfig) -> Result<Connection, BackendFailure> {
        let connection = match config.kind() {
            BackendKind::HttpApi => Connection::Http(Arc::new(HttpSession::connect(config)?)),
            BackendKind::RelationalStore => {
                Connection::Relational(Arc::new(PgStore::connect(config).await?))
            }
            BackendKind::KeyValueStore => {
                Connection::KeyValue(Arc::new(RedisStore::connect(config).await?))
            }
            BackendKind::MessageBroker => {
                Connection::Broker(Arc::new(KafkaBroker::connect(config).await?))
            }
        };
        Ok(connection)
    }
}
