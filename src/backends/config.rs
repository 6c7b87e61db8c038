//! Backend identities and connection descriptors.
//!
//! A [`BackendConfig`] is pure data: it names one backend, where it lives,
//! how to authenticate and how large its pool may grow. It is built once at
//! startup and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The four families of backend the server knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// A JSON-over-HTTP remote API.
    HttpApi,
    /// A relational database reached through a connection pool.
    RelationalStore,
    /// A key-value store.
    KeyValueStore,
    /// A message broker.
    MessageBroker,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HttpApi => "HTTP API",
            Self::RelationalStore => "relational store",
            Self::KeyValueStore => "key-value store",
            Self::MessageBroker => "message broker",
        };
        f.write_str(name)
    }
}

/// One concrete backend. Each id has exactly one [`BackendKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendId {
    Jira,
    Confluence,
    Bitbucket,
    Figma,
    Postgres,
    Redis,
    Kafka,
}

impl BackendId {
    /// Every backend the server can be configured with.
    pub const ALL: [BackendId; 7] = [
        Self::Jira,
        Self::Confluence,
        Self::Bitbucket,
        Self::Figma,
        Self::Postgres,
        Self::Redis,
        Self::Kafka,
    ];

    /// The family this backend belongs to.
    pub fn kind(self) -> BackendKind {
        match self {
            Self::Jira | Self::Confluence | Self::Bitbucket | Self::Figma => BackendKind::HttpApi,
            Self::Postgres => BackendKind::RelationalStore,
            Self::Redis => BackendKind::KeyValueStore,
            Self::Kafka => BackendKind::MessageBroker,
        }
    }

    /// Lower-case name used in logs and error data.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jira => "jira",
            Self::Confluence => "confluence",
            Self::Bitbucket => "bitbucket",
            Self::Figma => "figma",
            Self::Postgres => "postgres",
            Self::Redis => "redis",
            Self::Kafka => "kafka",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-resolved credentials for a backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// No credentials, or credentials embedded in the address (database URLs).
    None,
    /// HTTP basic authentication.
    Basic { username: String, secret: String },
    /// A static token sent in a named request header.
    Header { name: String, value: String },
}

/// Custom Debug implementation to redact secrets from logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("secret", &"[REDACTED]")
                .finish(),
            Self::Header { name, .. } => f
                .debug_struct("Header")
                .field("name", name)
                .field("value", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Sizing and timing hints for a backend's native connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLimits {
    /// Connections kept open once the pool exists.
    pub min_connections: u32,
    /// Upper bound on concurrently open connections.
    pub max_connections: u32,
    /// How long establishing the native connection may take.
    pub connect_timeout: Duration,
    /// How long a single request may take.
    pub request_timeout: Duration,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 5,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything needed to open one backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Which backend this is.
    pub id: BackendId,
    /// Base URL, database URL or bootstrap server list.
    pub address: String,
    /// How to authenticate.
    pub credentials: Credentials,
    /// Pool sizing and timeouts.
    pub limits: PoolLimits,
}

impl BackendConfig {
    /// Create a descriptor with default limits and no credentials.
    pub fn new(id: BackendId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            credentials: Credentials::None,
            limits: PoolLimits::default(),
        }
    }

    /// Attach credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Replace the pool limits.
    pub fn with_limits(mut self, limits: PoolLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The family of this backend.
    pub fn kind(&self) -> BackendKind {
        self.id.kind()
    }
}

/// Database and broker URLs may embed passwords, so only the scheme and host
/// part of the address is shown.
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("id", &self.id)
            .field("address", &redact_address(&self.address))
            .field("credentials", &self.credentials)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Strip `user:password@` from a URL-shaped address.
pub fn redact_address(address: &str) -> String {
    match (address.find("://"), address.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://[REDACTED]@{}", &address[..scheme_end], &address[at + 1..])
        }
        _ => address.to_string(),
    }
}
