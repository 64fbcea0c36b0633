//! Shared daemon client handle

use crate::error::{Operation, ProviderError, ProviderResult};
use crate::framework::Context;
use crate::ollama::{
    ClientError, DeleteRequest, ListModel, ListResponse, ModelApi, ProgressResponse, PullRequest,
    ShowRequest, ShowResponse, canonical_name,
};
use crate::registry::LockRegistry;
use std::fmt;
use std::sync::Arc;

/// Configured daemon connection shared by every resource and data source.
///
/// Read-only after construction. Every call races the context's cancellation
/// and surfaces daemon failures as [`ProviderError::Upstream`].
#[derive(Clone)]
pub struct ClientHandle {
    api: Arc<dyn ModelApi>,
    locks: LockRegistry,
    host: String,
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl ClientHandle {
    pub fn new(api: Arc<dyn ModelApi>, host: impl Into<String>) -> Self {
        Self {
            api,
            locks: LockRegistry::new(),
            host: host.into(),
        }
    }

    /// Host string this handle was resolved from
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    async fn call<T, F>(
        ctx: &Context,
        operation: Operation,
        model: Option<&str>,
        fut: F,
    ) -> ProviderResult<T>
    where
        F: std::future::Future<Output = Result<T, ClientError>>,
    {
        let result = ctx.run(fut).await.unwrap_or(Err(ClientError::Cancelled));
        result.map_err(|source| ProviderError::upstream(operation, model, source))
    }

    pub async fn list(&self, ctx: &Context) -> ProviderResult<ListResponse> {
        Self::call(ctx, Operation::List, None, self.api.list()).await
    }

    pub async fn show(&self, ctx: &Context, name: &str) -> ProviderResult<ShowResponse> {
        let req = ShowRequest {
            model: name.to_string(),
        };
        Self::call(ctx, Operation::Show, Some(name), self.api.show(&req)).await
    }

    /// Non-streaming pull of `name`
    pub async fn pull(&self, ctx: &Context, name: &str) -> ProviderResult<()> {
        let req = PullRequest::new(name);
        let progress = |p: &ProgressResponse| {
            tracing::debug!(
                model = %name,
                status = %p.status,
                completed = ?p.completed,
                total = ?p.total,
                "Pull progress"
            );
        };
        tracing::info!(model = %name, "Pulling model");
        Self::call(ctx, Operation::Pull, Some(name), self.api.pull(&req, &progress)).await
    }

    pub async fn delete(&self, ctx: &Context, name: &str) -> ProviderResult<()> {
        let req = DeleteRequest {
            model: name.to_string(),
        };
        tracing::info!(model = %name, "Deleting model");
        Self::call(ctx, Operation::Delete, Some(name), self.api.delete(&req)).await
    }

    /// Find the list entry for `name`, comparing canonical names
    pub async fn find(&self, ctx: &Context, name: &str) -> ProviderResult<Option<ListModel>> {
        let wanted = canonical_name(name);
        let listing = self.list(ctx).await?;
        Ok(listing
            .models
            .into_iter()
            .find(|m| canonical_name(&m.name) == wanted))
    }
}
