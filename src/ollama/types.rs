//! Wire types for the Ollama model management API

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Descriptive model metadata reported by the daemon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub parent_model: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub family: String,
    /// Order is kept exactly as reported
    #[serde(default)]
    pub families: Option<Vec<String>>,
    #[serde(default)]
    pub parameter_size: String,
    #[serde(default)]
    pub quantization_level: String,
}

/// One entry of `GET /api/tags`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListModel {
    pub name: String,
    #[serde(default)]
    pub model: String,
    pub modified_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub details: ModelDetails,
}

/// Response from `GET /api/tags`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub models: Vec<ListModel>,
}

/// Body of `POST /api/show`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowRequest {
    pub model: String,
}

/// Response from `POST /api/show`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowResponse {
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub modelfile: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub details: ModelDetails,
    #[serde(default)]
    pub modified_at: Option<DateTime<FixedOffset>>,
}

/// Body of `POST /api/pull`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,
    /// `false` asks the daemon for a single final response instead of a progress stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl PullRequest {
    /// Non-streaming pull of `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            insecure: false,
            stream: Some(false),
        }
    }
}

/// Progress update during a pull
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
}

/// Body of `DELETE /api/delete`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub model: String,
}

/// Error body returned by the daemon
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub error: String,
}

/// Canonical form of a model name: an untagged name refers to `:latest`
pub fn canonical_name(name: &str) -> String {
    let last_segment = name.rsplit('/').next().unwrap_or(name);
    if last_segment.contains(':') {
        name.to_string()
    } else {
        format!("{}:latest", name)
    }
}
