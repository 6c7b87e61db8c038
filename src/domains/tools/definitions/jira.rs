//! Jira tools: JQL search, issue details, issue creation and comments.

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::backends::{ApiRequest, BackendId, HttpApi};
use crate::domains::tools::descriptor::{Acquired, ArgSpec, InvokeResult, ToolDescriptor};
use crate::domains::tools::normalize::RawOutput;

use super::common::{adf_paragraph, items, lines_or, segment, str_at, value_at};

// ============================================================================
// Search
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct JiraSearchParams {
    pub jql: String,
    pub max_results: u32,
}

/// Searches issues with JQL and lists them one per line.
pub struct JiraSearchTool;

impl JiraSearchTool {
    pub const NAME: &'static str = "jira_search";
    pub const DESCRIPTION: &'static str = "Search Jira issues using a JQL query.";

    pub async fn execute(params: JiraSearchParams, api: &dyn HttpApi) -> InvokeResult {
        let data = api
            .get_json(
                ApiRequest::get("/search")
                    .query("jql", &params.jql)
                    .query("maxResults", params.max_results),
            )
            .await?;

        let lines = items(&data, "issues")
            .iter()
            .map(|issue| {
                format!(
                    "[{}] {} (Status: {})",
                    str_at(issue, "/key").unwrap_or_default(),
                    str_at(issue, "/fields/summary").unwrap_or_default(),
                    str_at(issue, "/fields/status/name").unwrap_or("Unknown"),
                )
            })
            .collect();
        Ok(RawOutput::Text(lines_or(lines, "No issues found.")))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Jira,
            vec![
                ArgSpec::string("jql", "JQL query, e.g. 'project = PROJ AND status = Open'")
                    .required(),
                ArgSpec::integer("max_results", "Maximum issues to return", Some(1), Some(100))
                    .default(10),
            ],
            |params: JiraSearchParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Jira)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Get Issue
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct JiraGetIssueParams {
    pub issue_key: String,
}

/// Fetches one issue and reduces it to its headline fields.
pub struct JiraGetIssueTool;

impl JiraGetIssueTool {
    pub const NAME: &'static str = "jira_get_issue";
    pub const DESCRIPTION: &'static str =
        "Get details of a specific Jira issue by key (e.g. PROJ-123).";

    pub async fn execute(params: JiraGetIssueParams, api: &dyn HttpApi) -> InvokeResult {
        let path = format!("/issue/{}", segment(&params.issue_key));
        let data = api.get_json(ApiRequest::get(path)).await?;

        Ok(RawOutput::Document(json!({
            "key": value_at(&data, "/key"),
            "summary": value_at(&data, "/fields/summary"),
            "status": value_at(&data, "/fields/status/name"),
            "assignee": str_at(&data, "/fields/assignee/displayName").unwrap_or("Unassigned"),
            "priority": str_at(&data, "/fields/priority/name").unwrap_or("None"),
            "description": value_at(&data, "/fields/description"),
        })))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Jira,
            vec![ArgSpec::string("issue_key", "Issue key, e.g. PROJ-123").required()],
            |params: JiraGetIssueParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Jira)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Create Issue
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct JiraCreateIssueParams {
    pub project_key: String,
    pub summary: String,
    pub issue_type: String,
    pub description: String,
}

/// Creates an issue. Not idempotent: every call creates a new issue.
pub struct JiraCreateIssueTool;

impl JiraCreateIssueTool {
    pub const NAME: &'static str = "jira_create_issue";
    pub const DESCRIPTION: &'static str = "Create a new Jira issue.";

    pub async fn execute(params: JiraCreateIssueParams, api: &dyn HttpApi) -> InvokeResult {
        let mut body = json!({
            "fields": {
                "project": {"key": params.project_key},
                "summary": params.summary,
                "issuetype": {"name": params.issue_type},
            }
        });
        if !params.description.is_empty() {
            body["fields"]["description"] = adf_paragraph(&params.description);
        }

        let data = api.get_json(ApiRequest::post("/issue", body)).await?;
        let key = str_at(&data, "/key").unwrap_or("?");
        info!(issue = key, "Jira issue created");
        Ok(RawOutput::Text(format!("Created {key}: {}", params.summary)))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Jira,
            vec![
                ArgSpec::string("project_key", "Project key, e.g. PROJ").required(),
                ArgSpec::string("summary", "Issue summary").required(),
                ArgSpec::string("issue_type", "Issue type name").default("Task"),
                ArgSpec::string("description", "Plain-text description").default(""),
            ],
            |params: JiraCreateIssueParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Jira)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Add Comment
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct JiraAddCommentParams {
    pub issue_key: String,
    pub comment: String,
}

/// Adds a plain-text comment to an issue.
pub struct JiraAddCommentTool;

impl JiraAddCommentTool {
    pub const NAME: &'static str = "jira_add_comment";
    pub const DESCRIPTION: &'static str = "Add a comment to a Jira issue.";

    pub async fn execute(params: JiraAddCommentParams, api: &dyn HttpApi) -> InvokeResult {
        let path = format!("/issue/{}/comment", segment(&params.issue_key));
        api.send(ApiRequest::post(path, json!({"body": adf_paragraph(&params.comment)})))
            .await?;
        Ok(RawOutput::Text(format!("Comment added to {}.", params.issue_key)))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Jira,
            vec![
                ArgSpec::string("issue_key", "Issue key, e.g. PROJ-123").required(),
                ArgSpec::string("comment", "Comment text").required(),
            ],
            |params: JiraAddCommentParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Jira)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

/// Every Jira tool.
pub fn tools() -> Vec<ToolDescriptor> {
    vec![
        JiraSearchTool::descriptor(),
        JiraGetIssueTool::descriptor(),
        JiraCreateIssueTool::descriptor(),
        JiraAddCommentTool::descriptor(),
    ]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::RecordingHttp;
    use crate::backends::{ApiBody, BackendFailure};
    use crate::backends::http::HttpMethod;

    #[tokio::test]
    async fn test_search_formats_lines() {
        let api = RecordingHttp::json(json!({
            "issues": [
                {"key": "P-1", "fields": {"summary": "Broken", "status": {"name": "Open"}}},
                {"key": "P-2", "fields": {"summary": "Slow", "status": {"name": "Done"}}}
            ]
        }));
        let output = JiraSearchTool::execute(
            JiraSearchParams {
                jql: "project = P".to_string(),
                max_results: 5,
            },
            &api,
        )
        .await
        .unwrap();

        assert_eq!(
            output,
            RawOutput::Text("[P-1] Broken (Status: Open)\n[P-2] Slow (Status: Done)".to_string())
        );
        let request = &api.requests()[0];
        assert_eq!(request.path, "/search");
        assert!(request.query.contains(&("maxResults".to_string(), "5".to_string())));
    }

    #[tokio::test]
    async fn test_search_empty() {
        let api = RecordingHttp::json(json!({"issues": []}));
        let output = JiraSearchTool::execute(
            JiraSearchParams {
                jql: "x".to_string(),
                max_results: 10,
            },
            &api,
        )
        .await
        .unwrap();
        assert_eq!(output, RawOutput::Text("No issues found.".to_string()));
    }

    #[tokio::test]
    async fn test_get_issue_defaults() {
        let api = RecordingHttp::json(json!({
            "key": "P-9",
            "fields": {"summary": "S", "status": {"name": "Open"}, "assignee": null, "description": null}
        }));
        let output = JiraGetIssueTool::execute(
            JiraGetIssueParams {
                issue_key: "P-9".to_string(),
            },
            &api,
        )
        .await
        .unwrap();
        assert_eq!(
            output,
            RawOutput::Document(json!({
                "key": "P-9",
                "summary": "S",
                "status": "Open",
                "assignee": "Unassigned",
                "priority": "None",
                "description": null
            }))
        );
        assert_eq!(api.requests()[0].path, "/issue/P-9");
    }

    #[tokio::test]
    async fn test_create_issue_with_description() {
        let api = RecordingHttp::json(json!({"key": "P-10"}));
        let output = JiraCreateIssueTool::execute(
            JiraCreateIssueParams {
                project_key: "P".to_string(),
                summary: "New".to_string(),
                issue_type: "Bug".to_string(),
                description: "Steps".to_string(),
            },
            &api,
        )
        .await
        .unwrap();
        assert_eq!(output, RawOutput::Text("Created P-10: New".to_string()));

        let request = &api.requests()[0];
        assert_eq!(request.method, HttpMethod::Post);
        let body = request.body.as_ref().unwrap();
        assert_eq!(body["fields"]["issuetype"]["name"], "Bug");
        assert_eq!(body["fields"]["description"]["type"], "doc");
    }

    #[tokio::test]
    async fn test_create_issue_without_description_omits_field() {
        let api = RecordingHttp::json(json!({"key": "P-11"}));
        JiraCreateIssueTool::execute(
            JiraCreateIssueParams {
                project_key: "P".to_string(),
                summary: "New".to_string(),
                issue_type: "Task".to_string(),
                description: String::new(),
            },
            &api,
        )
        .await
        .unwrap();
        let body = api.requests()[0].body.clone().unwrap();
        assert!(body["fields"].get("description").is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let api = RecordingHttp::new(|_| Err(BackendFailure::http_status(404, "nope", None)));
        let err = JiraAddCommentTool::execute(
            JiraAddCommentParams {
                issue_key: "P-1".to_string(),
                comment: "hi".to_string(),
            },
            &api,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            crate::domains::tools::descriptor::InvokeError::Backend(BackendFailure::HttpStatus {
                status: 404,
                ..
            })
        ));

        let ok = RecordingHttp::new(|_| Ok(ApiBody::Empty));
        let output = JiraAddCommentTool::execute(
            JiraAddCommentParams {
                issue_key: "P-1".to_string(),
                comment: "hi".to_string(),
            },
            &ok,
        )
        .await
        .unwrap();
        assert_eq!(output, RawOutput::Text("Comment added to P-1.".to_string()));
    }
}
