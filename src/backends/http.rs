//! HTTP API port and its reqwest-backed session.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use super::config::{BackendConfig, Credentials};
use super::error::BackendFailure;

/// HTTP verbs used by the tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One request against an HTTP API, relative to the backend's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Create a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Create a POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Create a PUT request with a JSON body.
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Put,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Append a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Append a query parameter only when a value is present.
    pub fn query_opt(self, name: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(name, v),
            None => self,
        }
    }
}

/// Body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiBody {
    Json(Value),
    Text(String),
    Empty,
}

impl ApiBody {
    /// Interpret the body as JSON. Empty bodies become `null`.
    pub fn into_json(self) -> Result<Value, BackendFailure> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Empty => Ok(Value::Null),
            Self::Text(text) => serde_json::from_str(&text)
                .map_err(|e| BackendFailure::protocol(format!("expected a JSON body: {e}"))),
        }
    }

    /// Interpret the body as text. JSON bodies are rendered back to text.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Json(value) => value.to_string(),
            Self::Empty => String::new(),
        }
    }
}

/// A remote JSON-over-HTTP API.
#[async_trait]
pub trait HttpApi: Send + Sync {
    /// Send one request. Non-success statuses come back as
    /// [`BackendFailure::HttpStatus`].
    async fn send(&self, request: ApiRequest) -> Result<ApiBody, BackendFailure>;

    /// Release the session.
    async fn close(&self) -> Result<(), BackendFailure> {
        Ok(())
    }

    /// GET a JSON document.
    async fn get_json(&self, request: ApiRequest) -> Result<Value, BackendFailure> {
        self.send(request).await?.into_json()
    }
}

/// An authenticated reqwest session bound to one API base URL.
pub struct HttpSession {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpSession {
    /// Build the session. No network traffic happens until the first request.
    pub fn connect(config: &BackendConfig) -> Result<Self, BackendFailure> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Credentials::Header { name, value } = &config.credentials {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| BackendFailure::Other(format!("invalid auth header name: {e}")))?;
            let mut value = HeaderValue::from_str(value)
                .map_err(|e| BackendFailure::Other(format!("invalid auth header value: {e}")))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.limits.request_timeout)
            .connect_timeout(config.limits.connect_timeout)
            .pool_max_idle_per_host(config.limits.max_connections as usize)
            .build()
            .map_err(|e| BackendFailure::from_reqwest(&e))?;

        Ok(Self {
            client,
            base_url: config.address.trim_end_matches('/').to_string(),
            credentials: config.credentials.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl HttpApi for HttpSession {
    #[instrument(skip_all, fields(method = ?request.method, path = %request.path))]
    async fn send(&self, request: ApiRequest) -> Result<ApiBody, BackendFailure> {
        let mut builder = self
            .client
            .request(request.method.as_reqwest(), self.url(&request.path));

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Credentials::Basic { username, secret } = &self.credentials {
            builder = builder.basic_auth(username, Some(secret));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BackendFailure::from_reqwest(&e))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));

        let text = response
            .text()
            .await
            .map_err(|e| BackendFailure::from_reqwest(&e))?;

        debug!(status = status.as_u16(), bytes = text.len(), "Response received");

        if !status.is_success() {
            return Err(BackendFailure::http_status(
                status.as_u16(),
                &text,
                retry_after,
            ));
        }

        if text.trim().is_empty() {
            Ok(ApiBody::Empty)
        } else if is_json {
            serde_json::from_str(&text)
                .map(ApiBody::Json)
                .map_err(|e| BackendFailure::protocol(format!("invalid JSON body: {e}")))
        } else {
            Ok(ApiBody::Text(text))
        }
    }
}

/// Read a `Retry-After` header given in seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
