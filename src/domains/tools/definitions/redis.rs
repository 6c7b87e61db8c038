//! Redis tools: get, set, delete and key listing.

use serde::Deserialize;
use serde_json::Value;

use crate::backends::{BackendId, KvStore};
use crate::domains::tools::descriptor::{Acquired, ArgSpec, InvokeResult, ToolDescriptor};
use crate::domains::tools::normalize::RawOutput;

fn key_arg() -> ArgSpec {
    ArgSpec::string("key", "Key name").required()
}

// ============================================================================
// Get
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RedisKeyParams {
    pub key: String,
}

/// Reads one key. A missing key and an empty value stay distinguishable.
pub struct RedisGetTool;

impl RedisGetTool {
    pub const NAME: &'static str = "redis_get";
    pub const DESCRIPTION: &'static str = "Get the value of a Redis key.";

    pub async fn execute(params: RedisKeyParams, store: &dyn KvStore) -> InvokeResult {
        let value = store.get(&params.key).await?;
        Ok(RawOutput::KvValue {
            key: params.key,
            value,
        })
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Redis,
            vec![key_arg()],
            |params: RedisKeyParams, acquired: Acquired| async move {
                let store = acquired.kv(BackendId::Redis)?;
                Self::execute(params, store.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Set
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSetParams {
    pub key: String,
    pub value: String,
    pub ttl: Option<u64>,
}

pub struct RedisSetTool;

impl RedisSetTool {
    pub const NAME: &'static str = "redis_set";
    pub const DESCRIPTION: &'static str =
        "Set a Redis key to a value. Optionally set a TTL in seconds.";

    pub async fn execute(params: RedisSetParams, store: &dyn KvStore) -> InvokeResult {
        store.set(&params.key, &params.value, params.ttl).await?;
        Ok(RawOutput::Text(format!("OK, set '{}'", params.key)))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Redis,
            vec![
                key_arg(),
                ArgSpec::string("value", "Value to store").required(),
                ArgSpec::integer("ttl", "Expiry in seconds", Some(1), None),
            ],
            |params: RedisSetParams, acquired: Acquired| async move {
                let store = acquired.kv(BackendId::Redis)?;
                Self::execute(params, store.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Delete
// ============================================================================

pub struct RedisDeleteTool;

impl RedisDeleteTool {
    pub const NAME: &'static str = "redis_delete";
    pub const DESCRIPTION: &'static str = "Delete a Redis key.";

    pub async fn execute(params: RedisKeyParams, store: &dyn KvStore) -> InvokeResult {
        let removed = store.delete(&params.key).await?;
        Ok(RawOutput::Text(format!("Deleted {removed} key(s).")))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Redis,
            vec![key_arg()],
            |params: RedisKeyParams, acquired: Acquired| async move {
                let store = acquired.kv(BackendId::Redis)?;
                Self::execute(params, store.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Keys
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RedisKeysParams {
    pub pattern: String,
}

pub struct RedisKeysTool;

impl RedisKeysTool {
    pub const NAME: &'static str = "redis_keys";
    pub const DESCRIPTION: &'static str =
        "List Redis keys matching a glob pattern (default: *).";

    pub async fn execute(params: RedisKeysParams, store: &dyn KvStore) -> InvokeResult {
        let mut keys = store.keys(&params.pattern).await?;
        keys.sort_unstable();
        Ok(RawOutput::Document(Value::from(keys)))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Redis,
            vec![ArgSpec::string("pattern", "Glob pattern").default("*")],
            |params: RedisKeysParams, acquired: Acquired| async move {
                let store = acquired.kv(BackendId::Redis)?;
                Self::execute(params, store.as_ref()).await
            },
        )
    }
}

/// Every Redis tool.
pub fn tools() -> Vec<ToolDescriptor> {
    vec![
        RedisGetTool::descriptor(),
        RedisSetTool::descriptor(),
        RedisDeleteTool::descriptor(),
        RedisKeysTool::descriptor(),
    ]
}
