//! Ollama model client adapter
//!
//! Provides the daemon operations the provider needs:
//! - Listing installed models
//! - Showing one model
//! - Pulling a model by name
//! - Deleting a model

pub mod client;
pub mod host;
pub mod types;

pub use client::{ClientSettings, OllamaClient};
pub use host::parse_host;
pub use types::{
    DeleteRequest, ListModel, ListResponse, ModelDetails, ProgressResponse, PullRequest,
    ShowRequest, ShowResponse, canonical_name,
};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Non-success HTTP status returned by the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    pub status_code: u16,
    /// Status line, e.g. `404 Not Found`
    pub status: String,
    /// Message from the daemon's error body
    pub error_message: String,
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status.is_empty(), self.error_message.is_empty()) {
            (false, false) => write!(f, "{}: {}", self.status, self.error_message),
            (false, true) => write!(f, "{}", self.status),
            (true, false) => write!(f, "{}", self.error_message),
            (true, true) => write!(
                f,
                "something went wrong, please see the ollama server logs for details"
            ),
        }
    }
}

impl std::error::Error for StatusError {}

/// Daemon client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Status(#[from] StatusError),

    #[error("failed to reach ollama: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to parse ollama response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Error reported inside a progress stream
    #[error("{0}")]
    Stream(String),

    #[error("invalid ollama host: {0}")]
    InvalidHost(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// Whether the daemon reported the model as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status(status) if status.status_code == 404)
    }
}

/// The daemon operations used by the provider
#[async_trait]
pub trait ModelApi: Send + Sync {
    async fn list(&self) -> Result<ListResponse, ClientError>;

    async fn show(&self, req: &ShowRequest) -> Result<ShowResponse, ClientError>;

    /// Pull a model, reporting each progress update to `progress`
    async fn pull(
        &self,
        req: &PullRequest,
        progress: &(dyn for<'a> Fn(&'a ProgressResponse) + Send + Sync),
    ) -> Result<(), ClientError>;

    async fn delete(&self, req: &DeleteRequest) -> Result<(), ClientError>;
}
