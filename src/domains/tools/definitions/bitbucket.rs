//! Bitbucket tools: repositories, pull requests, diffs and comments.
//!
//! The backend's base address already points at the configured workspace
//! (`.../2.0/repositories/{workspace}`), so request paths start at the
//! repository slug.

use serde::Deserialize;
use serde_json::json;

use crate::backends::{ApiRequest, BackendId, HttpApi};
use crate::domains::tools::descriptor::{Acquired, ArgSpec, InvokeResult, ToolDescriptor};
use crate::domains::tools::normalize::RawOutput;

use super::common::{items, lines_or, segment, str_at, value_at};

const PR_STATES: &[&str] = &["OPEN", "MERGED", "DECLINED", "SUPERSEDED"];

fn pr_path(repo_slug: &str, pr_id: u64) -> String {
    format!("/{}/pullrequests/{pr_id}", segment(repo_slug))
}

fn repo_slug_arg() -> ArgSpec {
    ArgSpec::string("repo_slug", "Repository slug").required()
}

fn pr_id_arg() -> ArgSpec {
    ArgSpec::integer("pr_id", "Pull request ID", Some(1), None).required()
}

// ============================================================================
// List Repositories
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketListReposParams {
    pub limit: u32,
}

/// Lists repositories in the workspace.
pub struct BitbucketListReposTool;

impl BitbucketListReposTool {
    pub const NAME: &'static str = "bitbucket_list_repos";
    pub const DESCRIPTION: &'static str =
        "List repositories in the configured Bitbucket workspace.";

    pub async fn execute(params: BitbucketListReposParams, api: &dyn HttpApi) -> InvokeResult {
        let data = api
            .get_json(ApiRequest::get("").query("pagelen", params.limit))
            .await?;

        let lines = items(&data, "values")
            .iter()
            .map(|repo| {
                let updated: String = str_at(repo, "/updated_on")
                    .unwrap_or_default()
                    .chars()
                    .take(10)
                    .collect();
                format!(
                    "[{}] {} (Updated: {updated})",
                    str_at(repo, "/slug").unwrap_or_default(),
                    str_at(repo, "/description").unwrap_or("No description"),
                )
            })
            .collect();
        Ok(RawOutput::Text(lines_or(lines, "No repositories found.")))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Bitbucket,
            vec![
                ArgSpec::integer("limit", "Maximum repositories to return", Some(1), Some(100))
                    .default(10),
            ],
            |params: BitbucketListReposParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Bitbucket)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// List Pull Requests
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketListPrsParams {
    pub repo_slug: String,
    pub state: String,
    pub target_branch: Option<String>,
    pub source_branch: Option<String>,
    pub author: Option<String>,
}

impl BitbucketListPrsParams {
    /// BBQL filter built from the optional branch and author arguments.
    fn filter(&self) -> Option<String> {
        let clauses: Vec<String> = [
            ("destination.branch.name =", &self.target_branch),
            ("source.branch.name =", &self.source_branch),
            ("author.display_name ~", &self.author),
        ]
        .into_iter()
        .filter_map(|(field, value)| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| format!("{field} \"{}\"", v.replace('"', "\\\"")))
        })
        .collect();

        (!clauses.is_empty()).then(|| clauses.join(" AND "))
    }
}

/// Lists pull requests of one repository, optionally filtered.
pub struct BitbucketListPrsTool;

impl BitbucketListPrsTool {
    pub const NAME: &'static str = "bitbucket_list_prs";
    pub const DESCRIPTION: &'static str = "List pull requests for a Bitbucket repository. \
        Optionally filter by target_branch, source_branch, or author display name.";

    pub async fn execute(params: BitbucketListPrsParams, api: &dyn HttpApi) -> InvokeResult {
        let path = format!("/{}/pullrequests", segment(&params.repo_slug));
        let request = ApiRequest::get(path)
            .query("state", &params.state)
            .query_opt("q", params.filter());
        let data = api.get_json(request).await?;

        let lines = items(&data, "values")
            .iter()
            .map(|pr| {
                format!(
                    "[PR #{}] {} by {} ({})",
                    value_at(pr, "/id"),
                    str_at(pr, "/title").unwrap_or_default(),
                    str_at(pr, "/author/display_name").unwrap_or("Unknown"),
                    str_at(pr, "/state").unwrap_or_default(),
                )
            })
            .collect();
        Ok(RawOutput::Text(lines_or(lines, "No pull requests found.")))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Bitbucket,
            vec![
                repo_slug_arg(),
                ArgSpec::one_of("state", "Pull request state", PR_STATES).default("OPEN"),
                ArgSpec::string("target_branch", "Destination branch name"),
                ArgSpec::string("source_branch", "Source branch name"),
                ArgSpec::string("author", "Author display name (substring match)"),
            ],
            |params: BitbucketListPrsParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Bitbucket)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Get Pull Request
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketPrParams {
    pub repo_slug: String,
    pub pr_id: u64,
}

/// Fetches one pull request.
pub struct BitbucketGetPrTool;

impl BitbucketGetPrTool {
    pub const NAME: &'static str = "bitbucket_get_pr";
    pub const DESCRIPTION: &'static str = "Get details of a specific Bitbucket pull request.";

    pub async fn execute(params: BitbucketPrParams, api: &dyn HttpApi) -> InvokeResult {
        let data = api
            .get_json(ApiRequest::get(pr_path(&params.repo_slug, params.pr_id)))
            .await?;

        Ok(RawOutput::Document(json!({
            "id": value_at(&data, "/id"),
            "title": value_at(&data, "/title"),
            "state": value_at(&data, "/state"),
            "author": value_at(&data, "/author/display_name"),
            "source": value_at(&data, "/source/branch/name"),
            "destination": value_at(&data, "/destination/branch/name"),
            "description": str_at(&data, "/description").unwrap_or_default(),
        })))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Bitbucket,
            vec![repo_slug_arg(), pr_id_arg()],
            |params: BitbucketPrParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Bitbucket)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Pull Request Diff
// ============================================================================

/// Returns the raw unified diff of a pull request.
pub struct BitbucketGetPrDiffTool;

impl BitbucketGetPrDiffTool {
    pub const NAME: &'static str = "bitbucket_get_pr_diff";
    pub const DESCRIPTION: &'static str = "Get the full diff of a pull request.";

    pub async fn execute(params: BitbucketPrParams, api: &dyn HttpApi) -> InvokeResult {
        let path = format!("{}/diff", pr_path(&params.repo_slug, params.pr_id));
        let body = api.send(ApiRequest::get(path)).await?;
        Ok(RawOutput::Text(body.into_text()))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Bitbucket,
            vec![repo_slug_arg(), pr_id_arg()],
            |params: BitbucketPrParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Bitbucket)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Pull Request Comments
// ============================================================================

/// Lists comments on a pull request, skipping deleted (empty) ones.
pub struct BitbucketListPrCommentsTool;

impl BitbucketListPrCommentsTool {
    pub const NAME: &'static str = "bitbucket_list_pr_comments";
    pub const DESCRIPTION: &'static str = "List comments on a pull request.";

    pub async fn execute(params: BitbucketPrParams, api: &dyn HttpApi) -> InvokeResult {
        let path = format!("{}/comments", pr_path(&params.repo_slug, params.pr_id));
        let data = api.get_json(ApiRequest::get(path)).await?;

        let lines = items(&data, "values")
            .iter()
            .filter_map(|comment| {
                let raw = str_at(comment, "/content/raw").filter(|raw| !raw.is_empty())?;
                let user = str_at(comment, "/user/display_name").unwrap_or("Unknown");
                Some(format!("[{user}] {raw}"))
            })
            .collect();
        Ok(RawOutput::Text(lines_or(lines, "No comments.")))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Bitbucket,
            vec![repo_slug_arg(), pr_id_arg()],
            |params: BitbucketPrParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Bitbucket)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Update Description
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketUpdatePrDescriptionParams {
    pub repo_slug: String,
    pub pr_id: u64,
    pub description: String,
}

/// Replaces the description of a pull request.
pub struct BitbucketUpdatePrDescriptionTool;

impl BitbucketUpdatePrDescriptionTool {
    pub const NAME: &'static str = "bitbucket_update_pr_description";
    pub const DESCRIPTION: &'static str = "Update the description of a Bitbucket pull request.";

    pub async fn execute(
        params: BitbucketUpdatePrDescriptionParams,
        api: &dyn HttpApi,
    ) -> InvokeResult {
        api.send(ApiRequest::put(
            pr_path(&params.repo_slug, params.pr_id),
            json!({"description": params.description}),
        ))
        .await?;
        Ok(RawOutput::Text(format!("PR #{} description updated.", params.pr_id)))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Bitbucket,
            vec![
                repo_slug_arg(),
                pr_id_arg(),
                ArgSpec::string("description", "New description (Markdown)").required(),
            ],
            |params: BitbucketUpdatePrDescriptionParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Bitbucket)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Create Comment
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketCreatePrCommentParams {
    pub repo_slug: String,
    pub pr_id: u64,
    pub content: String,
}

/// Posts a comment on a pull request and returns the created comment.
pub struct BitbucketCreatePrCommentTool;

impl BitbucketCreatePrCommentTool {
    pub const NAME: &'static str = "bitbucket_create_pr_comment";
    pub const DESCRIPTION: &'static str = "Post a comment on a pull request.";

    pub async fn execute(params: BitbucketCreatePrCommentParams, api: &dyn HttpApi) -> InvokeResult {
        let path = format!("{}/comments", pr_path(&params.repo_slug, params.pr_id));
        let created = api
            .get_json(ApiRequest::post(path, json!({"content": {"raw": params.content}})))
            .await?;
        Ok(RawOutput::Document(created))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Bitbucket,
            vec![
                repo_slug_arg(),
                pr_id_arg(),
                ArgSpec::string("content", "Comment text (Markdown)").required(),
            ],
            |params: BitbucketCreatePrCommentParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Bitbucket)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

/// Every Bitbucket tool.
pub fn tools() -> Vec<ToolDescriptor> {
    vec![
        BitbucketListReposTool::descriptor(),
        BitbucketListPrsTool::descriptor(),
        BitbucketGetPrTool::descriptor(),
        BitbucketGetPrDiffTool::descriptor(),
        BitbucketListPrCommentsTool::descriptor(),
        BitbucketUpdatePrDescriptionTool::descriptor(),
        BitbucketCreatePrCommentTool::descriptor(),
    ]
}
