//! Tool definitions, one module per backend.
//!
//! Each tool is a unit struct with `NAME`, `DESCRIPTION`, an `execute`
//! function written against a backend port, and a `descriptor()` that wires
//! it into the registry.

pub mod bitbucket;
mod common;
pub mod confluence;
pub mod figma;
pub mod jira;
pub mod kafka;
pub mod postgres;
pub mod redis;

use super::descriptor::ToolDescriptor;

pub use figma::parse_file_key;

/// Every tool this server knows about, for all backends.
pub fn catalogue() -> Vec<ToolDescriptor> {
    [
        jira::tools(),
        confluence::tools(),
        bitbucket::tools(),
        figma::tools(),
        postgres::tools(),
        redis::tools(),
        kafka::tools(),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::BackendId;
    use std::collections::BTreeSet;

    #[test]
    fn test_catalogue_names_unique() {
        let tools = catalogue();
        let names: BTreeSet<&str> = tools.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), tools.len());
        assert_eq!(tools.len(), 31);
    }

    #[test]
    fn test_tool_names_prefixed_by_backend() {
        for tool in catalogue() {
            let prefix = match tool.primary_backend() {
                BackendId::Postgres => "pg_".to_string(),
                other => format!("{other}_"),
            };
            assert!(tool.name.starts_with(&prefix), "{} vs {prefix}", tool.name);
        }
    }
}
