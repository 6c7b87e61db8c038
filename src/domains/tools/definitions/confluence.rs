//! Confluence tools: page search and page retrieval.

use serde::Deserialize;
use serde_json::json;

use crate::backends::{ApiRequest, BackendId, HttpApi};
use crate::domains::tools::descriptor::{Acquired, ArgSpec, InvokeResult, ToolDescriptor};
use crate::domains::tools::normalize::RawOutput;

use super::common::{items, lines_or, segment, str_at, value_at};

// ============================================================================
// Search
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ConfluenceSearchParams {
    pub query: String,
    pub limit: u32,
}

/// Finds pages by title.
pub struct ConfluenceSearchTool;

impl ConfluenceSearchTool {
    pub const NAME: &'static str = "confluence_search";
    pub const DESCRIPTION: &'static str = "Search Confluence pages by title or content.";

    pub async fn execute(params: ConfluenceSearchParams, api: &dyn HttpApi) -> InvokeResult {
        let data = api
            .get_json(
                ApiRequest::get("/pages")
                    .query("title", &params.query)
                    .query("limit", params.limit),
            )
            .await?;

        let lines = items(&data, "results")
            .iter()
            .map(|page| {
                format!(
                    "[{}] {} (Status: {})",
                    str_at(page, "/id").unwrap_or_default(),
                    str_at(page, "/title").unwrap_or_default(),
                    str_at(page, "/status").unwrap_or("unknown"),
                )
            })
            .collect();
        Ok(RawOutput::Text(lines_or(lines, "No pages found.")))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Confluence,
            vec![
                ArgSpec::string("query", "Title to search for").required(),
                ArgSpec::integer("limit", "Maximum pages to return", Some(1), Some(250))
                    .default(10),
            ],
            |params: ConfluenceSearchParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Confluence)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Get Page
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ConfluenceGetPageParams {
    pub page_id: String,
}

/// Fetches a page with its storage-format body.
pub struct ConfluenceGetPageTool;

impl ConfluenceGetPageTool {
    pub const NAME: &'static str = "confluence_get_page";
    pub const DESCRIPTION: &'static str =
        "Get a Confluence page by ID, including its body content.";

    pub async fn execute(params: ConfluenceGetPageParams, api: &dyn HttpApi) -> InvokeResult {
        let path = format!("/pages/{}", segment(&params.page_id));
        let data = api
            .get_json(ApiRequest::get(path).query("body-format", "storage"))
            .await?;

        Ok(RawOutput::Document(json!({
            "id": value_at(&data, "/id"),
            "title": value_at(&data, "/title"),
            "status": value_at(&data, "/status"),
            "body": str_at(&data, "/body/storage/value").unwrap_or_default(),
        })))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Confluence,
            vec![ArgSpec::string("page_id", "Page ID").required()],
            |params: ConfluenceGetPageParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Confluence)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

/// Every Confluence tool.
pub fn tools() -> Vec<ToolDescriptor> {
    vec![
        ConfluenceSearchTool::descriptor(),
        ConfluenceGetPageTool::descriptor(),
    ]
}
