//! Tool Registry - the fixed set of tools this process serves.
//!
//! The registry is built once at startup from the enabled backends and is
//! read-only afterwards. A tool is present only if every backend it needs is
//! enabled.

use rmcp::model::Tool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backends::BackendId;

use super::definitions::catalogue;
use super::descriptor::ToolDescriptor;
use super::error::RegistryError;

// ============================================================================
// Builder
// ============================================================================

/// Collects descriptors during startup.
#[derive(Debug, Default)]
pub struct ToolRegistryBuilder {
    tools: BTreeMap<&'static str, Arc<ToolDescriptor>>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names must be unique.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        if self.tools.contains_key(descriptor.name) {
            return Err(RegistryError::duplicate(descriptor.name));
        }
        debug!(tool = descriptor.name, "Registering tool");
        self.tools.insert(descriptor.name, Arc::new(descriptor));
        Ok(())
    }

    /// Freeze the registry.
    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}

// ============================================================================
// Tool Registry
// ============================================================================

/// Read-only map from tool name to descriptor.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// Registry of every catalogued tool whose backends are all enabled.
    pub fn from_backends(enabled: &[BackendId]) -> Result<Self, RegistryError> {
        Self::from_descriptors(enabled, catalogue())
    }

    /// Registry of the given descriptors, keeping those whose backends are all
    /// enabled. The result does not depend on descriptor order.
    pub fn from_descriptors(
        enabled: &[BackendId],
        descriptors: impl IntoIterator<Item = ToolDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut builder = Self::builder();
        for descriptor in descriptors {
            if descriptor.backends().iter().all(|b| enabled.contains(b)) {
                builder.register(descriptor)?;
            }
        }
        let registry = builder.build();
        info!(tools = registry.len(), ?enabled, "Tool registry built");
        Ok(registry)
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(Arc::as_ref)
    }

    /// All descriptors, ordered by name.
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.tools.values().map(Arc::as_ref).collect()
    }

    /// Tool names, ordered.
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    /// Metadata for `tools/list`, ordered by name.
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.values().map(|d| d.to_tool()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_backends_no_tools() {
        let registry = ToolRegistry::from_backends(&[]).unwrap();
        assert!(registry.is_empty());
        assert!(registry.lookup("jira_search").is_none());
    }

    #[test]
    fn test_all_backends_full_catalogue() {
        let registry = ToolRegistry::from_backends(&BackendId::ALL).unwrap();
        assert_eq!(registry.len(), 31);
        let names = registry.tool_names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert!(names.contains(&"jira_search"));
        assert!(names.contains(&"figma_post_comment"));
        assert!(names.contains(&"kafka_consume"));
    }

    #[test]
    fn test_only_enabled_backends_contribute() {
        let registry = ToolRegistry::from_backends(&[BackendId::Redis]).unwrap();
        assert_eq!(
            registry.tool_names(),
            vec!["redis_delete", "redis_get", "redis_keys", "redis_set"]
        );
        assert!(registry.list().iter().all(|d| d.backends() == [BackendId::Redis]));
    }

    #[test]
    fn test_order_independent() {
        let enabled = [BackendId::Postgres, BackendId::Kafka, BackendId::Jira];
        let forward = ToolRegistry::from_descriptors(&enabled, catalogue()).unwrap();
        let mut reversed = catalogue();
        reversed.reverse();
        let backward = ToolRegistry::from_descriptors(&enabled, reversed).unwrap();
        assert_eq!(forward.tool_names(), backward.tool_names());

        let shuffled_enabled = [BackendId::Jira, BackendId::Postgres, BackendId::Kafka];
        let third = ToolRegistry::from_descriptors(&shuffled_enabled, catalogue()).unwrap();
        assert_eq!(forward.tool_names(), third.tool_names());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut builder = ToolRegistry::builder();
        let mut tools = catalogue().into_iter().filter(|d| d.name == "redis_get");
        let first = tools.next().unwrap();
        builder.register(first.clone()).unwrap();
        assert_eq!(
            builder.register(first).unwrap_err(),
            RegistryError::duplicate("redis_get")
        );
    }

    #[test]
    fn test_listed_tools_have_schemas() {
        let registry = ToolRegistry::from_backends(&BackendId::ALL).unwrap();
        for tool in registry.tools() {
            assert_eq!(tool.input_schema["type"], "object");
            assert!(tool.description.is_some());
        }
    }
}
