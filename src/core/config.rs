//! Configuration management for the MCP server.
//!
//! Everything is read from environment variables (optionally seeded from a
//! `.env` file). Reading goes through a lookup function so the same parsing
//! can be driven from a map in tests.

use std::time::Duration;

use super::error::{Error, Result};
use super::transport::TransportConfig;
use crate::backends::{BackendConfig, BackendId, Credentials, PoolLimits};

const BITBUCKET_DEFAULT_BASE: &str = "https://api.bitbucket.org/2.0";
const FIGMA_DEFAULT_BASE: &str = "https://api.figma.com/v1";
const FIGMA_TOKEN_HEADER: &str = "X-Figma-Token";

/// Main configuration structure for the MCP server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Transport configuration.
    pub transport: TransportConfig,

    /// Enabled backends, in [`BackendId::ALL`] order.
    pub backends: Vec<BackendConfig>,
}

/// Server identification configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The name of the server as reported to clients.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "local-mcp-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            transport: TransportConfig::default(),
            backends: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment, after loading `.env`
    /// if one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`.
    ///
    /// A backend is enabled by `ENABLE_<NAME>=true`. An enabled backend with a
    /// missing required parameter is a configuration error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env { lookup: &lookup };
        let mut config = Self::default();

        if let Some(name) = env.get("MCP_SERVER_NAME") {
            config.server.name = name;
        }
        if let Some(level) = env.get("MCP_LOG_LEVEL") {
            config.logging.level = level;
        }
        config.transport = TransportConfig::from_lookup(&lookup);

        let limits = env.limits()?;
        for id in BackendId::ALL {
            if env.enabled(id) {
                config.backends.push(env.backend(id, limits.clone())?);
            }
        }
        Ok(config)
    }

    /// Ids of the enabled backends.
    pub fn enabled_backends(&self) -> Vec<BackendId> {
        self.backends.iter().map(|b| b.id).collect()
    }
}

/// Typed access to the variable lookup.
struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    /// A set, non-blank variable.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str, backend: BackendId) -> Result<String> {
        self.get(key)
            .ok_or_else(|| Error::config(format!("{key} is required when {backend} is enabled")))
    }

    fn number<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("{key} must be a non-negative integer, got '{raw}'"))),
        }
    }

    fn enabled(&self, id: BackendId) -> bool {
        let key = format!("ENABLE_{}", id.as_str().to_uppercase());
        self.get(&key).is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    fn limits(&self) -> Result<PoolLimits> {
        let defaults = PoolLimits::default();
        let limits = PoolLimits {
            min_connections: self.number("POSTGRES_POOL_MIN", defaults.min_connections)?,
            max_connections: self.number("POSTGRES_POOL_MAX", defaults.max_connections)?,
            connect_timeout: Duration::from_secs(
                self.number("BACKEND_CONNECT_TIMEOUT_SECS", defaults.connect_timeout.as_secs())?,
            ),
            request_timeout: Duration::from_secs(
                self.number("HTTP_TIMEOUT_SECS", defaults.request_timeout.as_secs())?,
            ),
        };
        if limits.max_connections == 0 || limits.min_connections > limits.max_connections {
            return Err(Error::config(format!(
                "POSTGRES_POOL_MIN ({}) must not exceed POSTGRES_POOL_MAX ({}), which must be at least 1",
                limits.min_connections, limits.max_connections
            )));
        }
        Ok(limits)
    }

    /// Base URL for an Atlassian-hosted API: an explicit override, or one
    /// derived from `ATLASSIAN_DOMAIN`.
    fn atlassian_base(&self, id: BackendId, override_key: &str, path: &str) -> Result<String> {
        match self.get(override_key) {
            Some(base) => Ok(base),
            None => {
                let domain = self.required("ATLASSIAN_DOMAIN", id)?;
                Ok(format!("https://{}{path}", domain.trim_end_matches('/')))
            }
        }
    }

    fn basic(&self, id: BackendId, user_key: &str, secret_key: &str) -> Result<Credentials> {
        Ok(Credentials::Basic {
            username: self.required(user_key, id)?,
            secret: self.required(secret_key, id)?,
        })
    }

    fn backend(&self, id: BackendId, limits: PoolLimits) -> Result<BackendConfig> {
        let config = match id {
            BackendId::Jira => BackendConfig::new(
                id,
                self.atlassian_base(id, "JIRA_BASE_URL", "/rest/api/3")?,
            )
            .with_credentials(self.basic(id, "JIRA_EMAIL", "JIRA_API_TOKEN")?),
            BackendId::Confluence => BackendConfig::new(
                id,
                self.atlassian_base(id, "CONFLUENCE_BASE_URL", "/wiki/api/v2")?,
            )
            .with_credentials(self.basic(id, "CONFLUENCE_EMAIL", "CONFLUENCE_API_TOKEN")?),
            BackendId::Bitbucket => {
                let base = self
                    .get("BITBUCKET_BASE_URL")
                    .unwrap_or_else(|| BITBUCKET_DEFAULT_BASE.to_string());
                let workspace = self.required("BITBUCKET_WORKSPACE", id)?;
                BackendConfig::new(
                    id,
                    format!("{}/repositories/{workspace}", base.trim_end_matches('/')),
                )
                .with_credentials(self.basic(id, "BITBUCKET_EMAIL", "BITBUCKET_API_TOKEN")?)
            }
            BackendId::Figma => BackendConfig::new(
                id,
                self.get("FIGMA_BASE_URL")
                    .unwrap_or_else(|| FIGMA_DEFAULT_BASE.to_string()),
            )
            .with_credentials(Credentials::Header {
                name: FIGMA_TOKEN_HEADER.to_string(),
                value: self.required("FIGMA_API_TOKEN", id)?,
            }),
            BackendId::Postgres => BackendConfig::new(id, self.required("POSTGRES_URL", id)?),
            BackendId::Redis => BackendConfig::new(id, self.required("REDIS_URL", id)?),
            BackendId::Kafka => {
                BackendConfig::new(id, self.required("KAFKA_BOOTSTRAP_SERVERS", id)?)
            }
        };
        Ok(config.with_limits(limits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_nothing_enabled_by_default() {
        let config = load(&[]).unwrap();
        assert!(config.backends.is_empty());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_enable_flag_is_case_insensitive() {
        let config = load(&[
            ("ENABLE_REDIS", "TRUE"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("ENABLE_KAFKA", "yes"),
        ])
        .unwrap();
        assert_eq!(config.enabled_backends(), vec![BackendId::Redis]);
    }

    #[test]
    fn test_atlassian_urls_and_credentials() {
        let config = load(&[
            ("ENABLE_JIRA", "true"),
            ("ENABLE_CONFLUENCE", "true"),
            ("ATLASSIAN_DOMAIN", "acme.atlassian.net"),
            ("JIRA_EMAIL", "me@acme.io"),
            ("JIRA_API_TOKEN", "jira-token"),
            ("CONFLUENCE_EMAIL", "me@acme.io"),
            ("CONFLUENCE_API_TOKEN", "wiki-token"),
        ])
        .unwrap();

        let jira = &config.backends[0];
        assert_eq!(jira.address, "https://acme.atlassian.net/rest/api/3");
        assert_eq!(
            jira.credentials,
            Credentials::Basic {
                username: "me@acme.io".to_string(),
                secret: "jira-token".to_string()
            }
        );
        assert_eq!(config.backends[1].address, "https://acme.atlassian.net/wiki/api/v2");
    }

    #[test]
    fn test_bitbucket_and_figma_defaults() {
        let config = load(&[
            ("ENABLE_BITBUCKET", "true"),
            ("BITBUCKET_EMAIL", "me@acme.io"),
            ("BITBUCKET_API_TOKEN", "bb"),
            ("BITBUCKET_WORKSPACE", "acme"),
            ("ENABLE_FIGMA", "true"),
            ("FIGMA_API_TOKEN", "fig"),
        ])
        .unwrap();
        assert_eq!(
            config.backends[0].address,
            "https://api.bitbucket.org/2.0/repositories/acme"
        );
        assert_eq!(config.backends[1].address, "https://api.figma.com/v1");
        assert!(matches!(
            &config.backends[1].credentials,
            Credentials::Header { name, .. } if name == "X-Figma-Token"
        ));
    }

    #[test]
    fn test_missing_required_parameter_is_fatal() {
        let err = load(&[("ENABLE_POSTGRES", "true")]).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("POSTGRES_URL")));

        let err = load(&[
            ("ENABLE_JIRA", "true"),
            ("JIRA_BASE_URL", "https://jira.internal"),
            ("JIRA_EMAIL", "me@acme.io"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("JIRA_API_TOKEN"));
    }

    #[test]
    fn test_limits_from_env() {
        let config = load(&[
            ("ENABLE_POSTGRES", "true"),
            ("POSTGRES_URL", "postgres://u:p@db/app"),
            ("POSTGRES_POOL_MIN", "2"),
            ("POSTGRES_POOL_MAX", "8"),
            ("BACKEND_CONNECT_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        let limits = &config.backends[0].limits;
        assert_eq!(limits.min_connections, 2);
        assert_eq!(limits.max_connections, 8);
        assert_eq!(limits.connect_timeout, Duration::from_secs(3));
        assert_eq!(limits.request_timeout, Duration::from_secs(30));

        assert!(load(&[("POSTGRES_POOL_MIN", "9"), ("POSTGRES_POOL_MAX", "2")]).is_err());
        assert!(load(&[("HTTP_TIMEOUT_SECS", "soon")]).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[
            ("ENABLE_FIGMA", "true"),
            ("FIGMA_API_TOKEN", "figma-secret"),
            ("ENABLE_POSTGRES", "true"),
            ("POSTGRES_URL", "postgres://app:hunter2@db/app"),
        ])
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("figma-secret"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }
}
