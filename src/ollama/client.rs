//! HTTP client for the Ollama model management endpoints

use super::host::parse_host;
use super::types::{
    DeleteRequest, ErrorResponse, ListResponse, ProgressResponse, PullRequest, ShowRequest,
    ShowResponse,
};
use super::{ClientError, ModelApi, StatusError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use std::time::Duration;

/// Transport settings for the daemon client.
///
/// No timeout is applied unless configured; calls otherwise run until the
/// daemon answers or the caller's context is cancelled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSettings {
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

/// HTTP client for one Ollama daemon
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: Url,
}

/// A line of the pull progress stream
#[derive(Debug, Deserialize)]
struct PullLine {
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    progress: ProgressResponse,
}

impl OllamaClient {
    /// Create a client for the daemon at `base_url`
    pub fn new(base_url: Url, settings: &ClientSettings) -> Result<Self, ClientError> {
        let mut builder = Client::builder().user_agent(concat!(
            "terraform-provider-ollama/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = settings.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
        })
    }

    /// Create a client from a host string such as `localhost:11434` or `https://ollama.internal`
    pub fn from_host(host: &str, settings: &ClientSettings) -> Result<Self, ClientError> {
        let base_url = parse_host(host).map_err(ClientError::InvalidHost)?;
        Self::new(base_url, settings)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        // base_url always ends with '/'
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into a [`StatusError`] carrying the daemon's message
    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error_message = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(parsed) if !parsed.error.is_empty() => parsed.error,
            _ => body.trim().to_string(),
        };

        Err(ClientError::Status(StatusError {
            status_code: status.as_u16(),
            status: status.to_string(),
            error_message,
        }))
    }
}

#[async_trait]
impl ModelApi for OllamaClient {
    async fn list(&self) -> Result<ListResponse, ClientError> {
        let response = self.http.get(self.endpoint("api/tags")).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn show(&self, req: &ShowRequest) -> Result<ShowResponse, ClientError> {
        let response = self
            .http
            .post(self.endpoint("api/show"))
            .json(req)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn pull(
        &self,
        req: &PullRequest,
        progress: &(dyn for<'a> Fn(&'a ProgressResponse) + Send + Sync),
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.endpoint("api/pull"))
            .json(req)
            .send()
            .await?;
        let response = Self::check(response).await?;

        // Streaming and non-streaming pulls both answer with newline separated
        // JSON objects; a non-streaming pull sends exactly one.
        let mut stream = response.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                handle_pull_line(&line, progress)?;
            }
        }
        handle_pull_line(&buf, progress)?;

        Ok(())
    }

    async fn delete(&self, req: &DeleteRequest) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.endpoint("api/delete"))
            .json(req)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

fn handle_pull_line(
    line: &[u8],
    progress: &(dyn for<'a> Fn(&'a ProgressResponse) + Send + Sync),
) -> Result<(), ClientError> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    let parsed: PullLine = serde_json::from_slice(line)?;
    if let Some(error) = parsed.error.filter(|e| !e.is_empty()) {
        return Err(ClientError::Stream(error));
    }
    progress(&parsed.progress);
    Ok(())
}
