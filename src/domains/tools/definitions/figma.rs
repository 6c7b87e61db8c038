//! Figma tools: file structure, nodes, image exports and comments.

use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::LazyLock;

use crate::backends::{ApiRequest, BackendId, HttpApi};
use crate::domains::tools::descriptor::{Acquired, ArgSpec, InvokeResult, ToolDescriptor};
use crate::domains::tools::normalize::RawOutput;

use super::common::{items, segment, str_at, value_at};

static FILE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"figma\.com/(?:file|design|proto|board)/([a-zA-Z0-9]+)")
        .expect("file URL pattern is valid")
});

const IMAGE_FORMATS: &[&str] = &["png", "jpg", "svg", "pdf"];

/// Extract the file key from a Figma URL; anything else is taken as a key.
pub fn parse_file_key(key_or_url: &str) -> &str {
    FILE_URL
        .captures(key_or_url)
        .and_then(|captures| captures.get(1))
        .map_or(key_or_url, |m| m.as_str())
}

fn file_path(key_or_url: &str, suffix: &str) -> String {
    format!("/files/{}{suffix}", segment(parse_file_key(key_or_url)))
}

fn file_key_arg() -> ArgSpec {
    ArgSpec::string("file_key", "File key or full Figma URL").required()
}

// ============================================================================
// Get File
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FigmaGetFileParams {
    pub file_key: String,
    pub depth: Option<u32>,
}

pub struct FigmaGetFileTool;

impl FigmaGetFileTool {
    pub const NAME: &'static str = "figma_get_file";
    pub const DESCRIPTION: &'static str = "Get a Figma file's structure and metadata. \
        Accepts a file key or full Figma URL. Use depth to limit tree traversal.";

    pub async fn execute(params: FigmaGetFileParams, api: &dyn HttpApi) -> InvokeResult {
        let request = ApiRequest::get(file_path(&params.file_key, "")).query_opt("depth", params.depth);
        let data = api.get_json(request).await?;

        Ok(RawOutput::Document(json!({
            "name": value_at(&data, "/name"),
            "lastModified": value_at(&data, "/lastModified"),
            "version": value_at(&data, "/version"),
            "document": value_at(&data, "/document"),
            "components": value_at(&data, "/components"),
            "styles": value_at(&data, "/styles"),
        })))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Figma,
            vec![
                file_key_arg(),
                ArgSpec::integer("depth", "Tree depth to return (1 = pages only)", Some(1), None),
            ],
            |params: FigmaGetFileParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Figma)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Get File Nodes
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FigmaGetFileNodesParams {
    pub file_key: String,
    pub ids: String,
    pub depth: Option<u32>,
}

pub struct FigmaGetFileNodesTool;

impl FigmaGetFileNodesTool {
    pub const NAME: &'static str = "figma_get_file_nodes";
    pub const DESCRIPTION: &'static str = "Get specific nodes from a Figma file by their IDs. \
        ids is a comma-separated list of node IDs (e.g. '1:2,1:3').";

    pub async fn execute(params: FigmaGetFileNodesParams, api: &dyn HttpApi) -> InvokeResult {
        let request = ApiRequest::get(file_path(&params.file_key, "/nodes"))
            .query("ids", &params.ids)
            .query_opt("depth", params.depth);
        let data = api.get_json(request).await?;
        Ok(RawOutput::Document(object_or_empty(value_at(&data, "/nodes"))))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Figma,
            vec![
                file_key_arg(),
                ArgSpec::string("ids", "Comma-separated node IDs").required(),
                ArgSpec::integer("depth", "Tree depth below each node", Some(1), None),
            ],
            |params: FigmaGetFileNodesParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Figma)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Get Images
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FigmaGetImagesParams {
    pub file_key: String,
    pub ids: String,
    pub scale: f64,
    pub format: String,
}

/// Renders nodes and returns a map of node ID to image URL.
pub struct FigmaGetImagesTool;

impl FigmaGetImagesTool {
    pub const NAME: &'static str = "figma_get_images";
    pub const DESCRIPTION: &'static str = "Export Figma nodes as images. \
        Returns a map of node IDs to image URLs.";

    pub async fn execute(params: FigmaGetImagesParams, api: &dyn HttpApi) -> InvokeResult {
        let path = format!("/images/{}", segment(parse_file_key(&params.file_key)));
        let request = ApiRequest::get(path)
            .query("ids", &params.ids)
            .query("scale", params.scale)
            .query("format", &params.format);
        let data = api.get_json(request).await?;
        Ok(RawOutput::Document(object_or_empty(value_at(&data, "/images"))))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Figma,
            vec![
                file_key_arg(),
                ArgSpec::string("ids", "Comma-separated node IDs").required(),
                ArgSpec::number("scale", "Image scale", Some(0.01), Some(4.0)).default(1.0),
                ArgSpec::one_of("format", "Image format", IMAGE_FORMATS).default("png"),
            ],
            |params: FigmaGetImagesParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Figma)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Comments
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FigmaGetCommentsParams {
    pub file_key: String,
}

pub struct FigmaGetCommentsTool;

impl FigmaGetCommentsTool {
    pub const NAME: &'static str = "figma_get_comments";
    pub const DESCRIPTION: &'static str = "Get all comments on a Figma file.";

    pub async fn execute(params: FigmaGetCommentsParams, api: &dyn HttpApi) -> InvokeResult {
        let data = api
            .get_json(ApiRequest::get(file_path(&params.file_key, "/comments")))
            .await?;

        let comments = items(&data, "comments")
            .iter()
            .map(|c| {
                json!({
                    "id": value_at(c, "/id"),
                    "message": str_at(c, "/message").unwrap_or_default(),
                    "user": str_at(c, "/user/handle").unwrap_or("Unknown"),
                    "created_at": value_at(c, "/created_at"),
                    "order_id": value_at(c, "/order_id"),
                    "parent_id": value_at(c, "/parent_id"),
                })
            })
            .collect();
        Ok(RawOutput::Document(Value::Array(comments)))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Figma,
            vec![file_key_arg()],
            |params: FigmaGetCommentsParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Figma)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FigmaPostCommentParams {
    pub file_key: String,
    pub message: String,
    pub node_id: Option<String>,
    pub comment_id: Option<String>,
}

/// Posts a comment, optionally pinned to a node or replying to a comment.
pub struct FigmaPostCommentTool;

impl FigmaPostCommentTool {
    pub const NAME: &'static str = "figma_post_comment";
    pub const DESCRIPTION: &'static str = "Post a comment on a Figma file. \
        Optionally pin to a node_id or reply to an existing comment_id.";

    pub async fn execute(params: FigmaPostCommentParams, api: &dyn HttpApi) -> InvokeResult {
        let mut body = json!({"message": params.message});
        if let Some(comment_id) = params.comment_id.filter(|id| !id.is_empty()) {
            body["comment_id"] = json!(comment_id);
        }
        if let Some(node_id) = params.node_id.filter(|id| !id.is_empty()) {
            body["client_meta"] = json!({"node_id": node_id, "node_offset": {"x": 0, "y": 0}});
        }

        let created = api
            .get_json(ApiRequest::post(file_path(&params.file_key, "/comments"), body))
            .await?;
        Ok(RawOutput::Document(created))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Figma,
            vec![
                file_key_arg(),
                ArgSpec::string("message", "Comment text").required(),
                ArgSpec::string("node_id", "Node to pin the comment to"),
                ArgSpec::string("comment_id", "Comment to reply to"),
            ],
            |params: FigmaPostCommentParams, acquired: Acquired| async move {
                let api = acquired.http(BackendId::Figma)?;
                Self::execute(params, api.as_ref()).await
            },
        )
    }
}

fn object_or_empty(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        _ => json!({}),
    }
}

/// Every Figma tool.
pub fn tools() -> Vec<ToolDescriptor> {
    vec![
        FigmaGetFileTool::descriptor(),
        FigmaGetFileNodesTool::descriptor(),
        FigmaGetImagesTool::descriptor(),
        FigmaGetCommentsTool::descriptor(),
        FigmaPostCommentTool::descriptor(),
    ]
}
