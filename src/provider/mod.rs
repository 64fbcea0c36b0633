//! The Ollama provider
//!
//! Resolves the daemon host, builds the shared [`ClientHandle`] and serves:
//! - `ollama_model` resource ([`model_resource`])
//! - `ollama_model` data source ([`model_data_source`])

pub mod handle;
pub mod model_data_source;
pub mod model_resource;
pub mod schema;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use handle::ClientHandle;
pub use model_data_source::ModelDataSource;
pub use model_resource::ModelResource;

use crate::error::{ProviderError, ProviderResult};
use crate::framework::{
    ConfigureResponse, Context, DataSourceFactory, Diagnostics, Field, Provider, ProviderMetadata,
    ResourceFactory, Schema, Value,
};
use crate::ollama::{ClientSettings, OllamaClient};
use async_trait::async_trait;
use std::sync::Arc;

/// Environment fallback for the daemon host
pub const HOST_ENV: &str = "OLLAMA_HOST";

/// Provider type name; prefixes every resource and data source
pub const TYPE_NAME: &str = "ollama";

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolve the effective daemon host.
///
/// A configured value takes precedence, even when empty. Without one the
/// environment value is used. An empty result is an error.
pub fn resolve_host(config: &Field<String>, env: Option<String>) -> ProviderResult<String> {
    let host = match config {
        Field::Unknown => return Err(ProviderError::HostUnknown),
        Field::Known(host) => host.clone(),
        Field::Null => env.unwrap_or_default(),
    };
    if host.trim().is_empty() {
        return Err(ProviderError::HostMissing);
    }
    Ok(host)
}

pub struct OllamaProvider {
    version: String,
    settings: ClientSettings,
    env: EnvLookup,
}

impl OllamaProvider {
    pub fn new(version: impl Into<String>, settings: ClientSettings) -> Self {
        Self {
            version: version.into(),
            settings,
            env: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the process environment lookup
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(env);
        self
    }

    fn connect(&self, config: &Value) -> ProviderResult<ClientHandle> {
        let host = Field::<String>::from_value(config.get("host"))
            .map_err(|e| ProviderError::codec("provider configuration", e))?;
        let host = resolve_host(&host, (self.env)(HOST_ENV))?;

        let client = OllamaClient::from_host(&host, &self.settings).map_err(|source| {
            ProviderError::InvalidHost {
                host: host.clone(),
                source,
            }
        })?;
        tracing::info!(host = %host, base_url = %client.base_url(), "Configured Ollama client");

        Ok(ClientHandle::new(Arc::new(client), host))
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    type Data = ClientHandle;

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            type_name: TYPE_NAME.to_string(),
            version: self.version.clone(),
        }
    }

    fn schema(&self) -> Schema {
        schema::provider_schema()
    }

    async fn configure(&self, _ctx: &Context, config: &Value) -> ConfigureResponse<ClientHandle> {
        match self.connect(config) {
            Ok(handle) => ConfigureResponse::ok(handle),
            Err(e) => {
                tracing::error!(error = %e, "Provider configuration failed");
                ConfigureResponse::failed(Diagnostics::from(e.to_diagnostic()))
            }
        }
    }

    fn resources(&self) -> Vec<ResourceFactory<ClientHandle>> {
        vec![ModelResource::new as ResourceFactory<ClientHandle>]
    }

    fn data_sources(&self) -> Vec<DataSourceFactory<ClientHandle>> {
        vec![ModelDataSource::new as DataSourceFactory<ClientHandle>]
    }
}
