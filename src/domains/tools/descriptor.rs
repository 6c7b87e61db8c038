//! Tool descriptors: name, argument schema, required backends and the
//! function that does the work.

use futures::FutureExt;
use futures::future::BoxFuture;
use rmcp::model::{JsonObject, Tool};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::backends::{
    BackendFailure, BackendId, Connection, HttpApi, KvStore, MessageBroker, SqlStore,
};

use super::error::{ErrorKind, ToolError};
use super::normalize::RawOutput;

// ============================================================================
// Argument Schema
// ============================================================================

/// The accepted type of one argument, with its constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgType {
    String,
    Integer { min: Option<i64>, max: Option<i64> },
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
    /// A string drawn from a fixed set.
    OneOf(&'static [&'static str]),
}

/// One named argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub ty: ArgType,
    pub required: bool,
    pub default: Option<Value>,
}

impl ArgSpec {
    fn new(name: &'static str, description: &'static str, ty: ArgType) -> Self {
        Self {
            name,
            description,
            ty,
            required: false,
            default: None,
        }
    }

    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, ArgType::String)
    }

    pub fn integer(
        name: &'static str,
        description: &'static str,
        min: Option<i64>,
        max: Option<i64>,
    ) -> Self {
        Self::new(name, description, ArgType::Integer { min, max })
    }

    pub fn number(
        name: &'static str,
        description: &'static str,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        Self::new(name, description, ArgType::Number { min, max })
    }

    pub fn boolean(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, ArgType::Boolean)
    }

    pub fn one_of(
        name: &'static str,
        description: &'static str,
        values: &'static [&'static str],
    ) -> Self {
        Self::new(name, description, ArgType::OneOf(values))
    }

    /// Mark the argument as mandatory.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value used when the caller omits the argument.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Check one supplied value against the type and its bounds.
    fn check(&self, value: &Value) -> Result<(), ToolError> {
        let fail = |reason: String| Err(ToolError::invalid_argument(self.name, reason));
        match &self.ty {
            ArgType::String => {
                if !value.is_string() {
                    return fail(format!("expected a string, got {}", type_name(value)));
                }
            }
            ArgType::Boolean => {
                if !value.is_boolean() {
                    return fail(format!("expected a boolean, got {}", type_name(value)));
                }
            }
            ArgType::Integer { min, max } => {
                let Some(n) = value.as_i64() else {
                    return fail(format!("expected an integer, got {}", type_name(value)));
                };
                if let Some(min) = min.filter(|min| n < *min) {
                    return fail(format!("must be at least {min}, got {n}"));
                }
                if let Some(max) = max.filter(|max| n > *max) {
                    return fail(format!("must be at most {max}, got {n}"));
                }
            }
            ArgType::Number { min, max } => {
                let Some(n) = value.as_f64() else {
                    return fail(format!("expected a number, got {}", type_name(value)));
                };
                if let Some(min) = min.filter(|min| n < *min) {
                    return fail(format!("must be at least {min}, got {n}"));
                }
                if let Some(max) = max.filter(|max| n > *max) {
                    return fail(format!("must be at most {max}, got {n}"));
                }
            }
            ArgType::OneOf(allowed) => {
                let Some(s) = value.as_str() else {
                    return fail(format!("expected a string, got {}", type_name(value)));
                };
                if !allowed.contains(&s) {
                    return fail(format!("must be one of {}, got '{s}'", allowed.join(", ")));
                }
            }
        }
        Ok(())
    }

    fn json_schema(&self) -> Value {
        let mut schema = match &self.ty {
            ArgType::String => json!({"type": "string"}),
            ArgType::Boolean => json!({"type": "boolean"}),
            ArgType::Integer { min, max } => {
                let mut s = json!({"type": "integer"});
                if let Some(min) = min {
                    s["minimum"] = json!(min);
                }
                if let Some(max) = max {
                    s["maximum"] = json!(max);
                }
                s
            }
            ArgType::Number { min, max } => {
                let mut s = json!({"type": "number"});
                if let Some(min) = min {
                    s["minimum"] = json!(min);
                }
                if let Some(max) = max {
                    s["maximum"] = json!(max);
                }
                s
            }
            ArgType::OneOf(values) => json!({"type": "string", "enum": values}),
        };
        schema["description"] = json!(self.description);
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        schema
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "an integer",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The ordered argument list of a tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgSchema {
    args: Vec<ArgSpec>,
}

impl ArgSchema {
    pub fn new(args: Vec<ArgSpec>) -> Self {
        Self { args }
    }

    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    /// Validate caller arguments and fill in defaults.
    ///
    /// Rejects unknown fields, missing required fields, wrong types and
    /// out-of-range values, naming the field. An explicit `null` counts as
    /// absent.
    pub fn validate(&self, args: Option<JsonObject>) -> Result<JsonObject, ToolError> {
        let mut supplied = args.unwrap_or_default();

        if let Some(unknown) = supplied
            .keys()
            .find(|key| !self.args.iter().any(|spec| spec.name == key.as_str()))
        {
            return Err(ToolError::invalid_argument(unknown, "unknown argument"));
        }

        let mut validated = Map::new();
        for spec in &self.args {
            match supplied.remove(spec.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    spec.check(&value)?;
                    validated.insert(spec.name.to_string(), value);
                }
                None if spec.required => {
                    return Err(ToolError::invalid_argument(spec.name, "missing required argument"));
                }
                None => {
                    if let Some(default) = &spec.default {
                        validated.insert(spec.name.to_string(), default.clone());
                    }
                }
            }
        }
        Ok(validated)
    }

    /// JSON Schema advertised in `tools/list`.
    pub fn input_schema(&self) -> JsonObject {
        let properties: Map<String, Value> = self
            .args
            .iter()
            .map(|spec| (spec.name.to_string(), spec.json_schema()))
            .collect();
        let required: Vec<&str> = self
            .args
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name)
            .collect();

        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), json!(required));
        }
        schema.insert("additionalProperties".to_string(), json!(false));
        schema
    }
}

// ============================================================================
// Acquired Connections
// ============================================================================

/// Connections acquired for one invocation, keyed by backend.
#[derive(Debug, Clone, Default)]
pub struct Acquired {
    connections: BTreeMap<BackendId, Connection>,
}

impl Acquired {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, backend: BackendId, connection: Connection) {
        self.connections.insert(backend, connection);
    }

    fn get(&self, backend: BackendId) -> Result<&Connection, ToolError> {
        self.connections.get(&backend).ok_or_else(|| {
            ToolError::backend_unavailable(backend, format!("Backend '{backend}' was not acquired"))
        })
    }

    fn mismatch(backend: BackendId, connection: &Connection) -> ToolError {
        ToolError::backend_unavailable(
            backend,
            format!("Backend '{backend}' is a {}, not the expected kind", connection.kind()),
        )
    }

    pub fn http(&self, backend: BackendId) -> Result<Arc<dyn HttpApi>, ToolError> {
        match self.get(backend)? {
            Connection::Http(api) => Ok(Arc::clone(api)),
            other => Err(Self::mismatch(backend, other)),
        }
    }

    pub fn sql(&self, backend: BackendId) -> Result<Arc<dyn SqlStore>, ToolError> {
        match self.get(backend)? {
            Connection::Relational(store) => Ok(Arc::clone(store)),
            other => Err(Self::mismatch(backend, other)),
        }
    }

    pub fn kv(&self, backend: BackendId) -> Result<Arc<dyn KvStore>, ToolError> {
        match self.get(backend)? {
            Connection::KeyValue(store) => Ok(Arc::clone(store)),
            other => Err(Self::mismatch(backend, other)),
        }
    }

    pub fn broker(&self, backend: BackendId) -> Result<Arc<dyn MessageBroker>, ToolError> {
        match self.get(backend)? {
            Connection::Broker(broker) => Ok(Arc::clone(broker)),
            other => Err(Self::mismatch(backend, other)),
        }
    }
}

// ============================================================================
// Tool Descriptor
// ============================================================================

/// How a tool invocation failed, before translation.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The backend reported a failure.
    #[error(transparent)]
    Backend(#[from] BackendFailure),

    /// The tool itself decided the call cannot proceed.
    #[error(transparent)]
    Tool(#[from] ToolError),
}

pub type InvokeResult = Result<RawOutput, InvokeError>;

type InvokeFn = dyn Fn(JsonObject, Acquired) -> BoxFuture<'static, InvokeResult> + Send + Sync;

/// Everything the dispatcher needs to know about one tool.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// Backends acquired before invocation. Never empty; the first one
    /// decides how the result is normalized.
    backends: Vec<BackendId>,
    pub schema: ArgSchema,
    invoke: Arc<InvokeFn>,
}

impl ToolDescriptor {
    /// Describe a tool whose validated arguments deserialize into `P`.
    pub fn new<P, F, Fut>(
        name: &'static str,
        description: &'static str,
        backend: BackendId,
        args: Vec<ArgSpec>,
        run: F,
    ) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P, Acquired) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = InvokeResult> + Send + 'static,
    {
        let invoke = move |args: JsonObject, acquired: Acquired| {
            match serde_json::from_value::<P>(Value::Object(args)) {
                Ok(params) => run(params, acquired).boxed(),
                Err(e) => {
                    let err = ToolError::new(ErrorKind::InvalidArgument, e.to_string());
                    async move { Err(InvokeError::Tool(err)) }.boxed()
                }
            }
        };
        Self {
            name,
            description,
            backends: vec![backend],
            schema: ArgSchema::new(args),
            invoke: Arc::new(invoke),
        }
    }

    /// Require an additional backend.
    pub fn also_requires(mut self, backend: BackendId) -> Self {
        if !self.backends.contains(&backend) {
            self.backends.push(backend);
        }
        self
    }

    /// Every backend the tool needs, primary first.
    pub fn backends(&self) -> &[BackendId] {
        &self.backends
    }

    /// The backend whose kind decides result normalization.
    pub fn primary_backend(&self) -> BackendId {
        self.backends[0]
    }

    /// Run the tool with already-validated arguments.
    pub fn invoke(&self, args: JsonObject, acquired: Acquired) -> BoxFuture<'static, InvokeResult> {
        (self.invoke)(args, acquired)
    }

    /// Metadata advertised in `tools/list`.
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.name.into(),
            description: Some(self.description.into()),
            input_schema: Arc::new(self.schema.input_schema()),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("backends", &self.backends)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
