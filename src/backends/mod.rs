//! Backend connections.
//!
//! Each external system is reached through a port trait ([`HttpApi`],
//! [`SqlStore`], [`KvStore`], [`MessageBroker`]) with one live adapter and one
//! in-memory stand-in. The [`ConnectionManager`] owns one lazily opened
//! [`ConnectionHandle`] per configured backend.

pub mod broker;
pub mod config;
pub mod connection;
pub mod error;
pub mod handle;
pub mod http;
pub mod kv;
pub mod manager;
pub mod memory;
pub mod sql;

pub use broker::{BrokerMessage, MessageBroker, ProducedRecord, TopicDescription};
pub use config::{BackendConfig, BackendId, BackendKind, Credentials, PoolLimits};
pub use connection::{Connection, Connector, LiveConnector};
pub use error::BackendFailure;
pub use handle::{AcquireError, ConnectionHandle, HandleStatus};
pub use http::{ApiBody, ApiRequest, HttpApi};
pub use kv::KvStore;
pub use manager::{ConnectionManager, ShutdownReport};
pub use sql::{RowSet, SqlQuery, SqlStore, SqlValue};
