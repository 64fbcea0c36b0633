//! Provider framework
//!
//! The host-facing half of the plugin, independent of any particular daemon:
//! - Dynamic values and typed fields ([`value`])
//! - Schema declarations ([`schema`])
//! - Diagnostics ([`diagnostics`])
//! - Cancellation context ([`context`])
//! - Plan computation ([`plan`])
//!
//! A provider implements [`Provider`] and hands out [`Resource`] and
//! [`DataSource`] factories. The gRPC layer instantiates one resource per
//! request, configures it with the provider data produced by
//! [`Provider::configure`], and then drives a single lifecycle callback.

pub mod context;
pub mod diagnostics;
pub mod plan;
pub mod schema;
pub mod value;

pub use context::Context;
pub use diagnostics::{AttributePath, Diagnostic, Diagnostics, Severity};
pub use schema::{Attribute, AttributeKind, ElementType, Schema};
pub use value::{CodecError, Field, FromValue, Value};

use async_trait::async_trait;

/// Factory for per-request resource instances
pub type ResourceFactory<D> = fn() -> Box<dyn Resource<D>>;

/// Factory for per-request data source instances
pub type DataSourceFactory<D> = fn() -> Box<dyn DataSource<D>>;

/// Provider identity reported to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata {
    /// Prefix for every resource and data source type name
    pub type_name: String,
    pub version: String,
}

/// Outcome of provider configuration
#[derive(Debug)]
pub struct ConfigureResponse<D> {
    /// Data shared with every resource and data source, absent on failure
    pub data: Option<D>,
    pub diagnostics: Diagnostics,
}

impl<D> ConfigureResponse<D> {
    pub fn ok(data: D) -> Self {
        Self {
            data: Some(data),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            data: None,
            diagnostics,
        }
    }
}

/// A provider: configuration surface plus the resources and data sources it serves
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Data produced by configuration and shared by all resources and data sources
    type Data: Clone + Send + Sync + 'static;

    fn metadata(&self) -> ProviderMetadata;

    fn schema(&self) -> Schema;

    async fn configure(&self, ctx: &Context, config: &Value) -> ConfigureResponse<Self::Data>;

    fn resources(&self) -> Vec<ResourceFactory<Self::Data>>;

    fn data_sources(&self) -> Vec<DataSourceFactory<Self::Data>>;
}

/// State returned by a resource or data source callback.
///
/// A null `state` after Read means the resource no longer exists and must be
/// removed from the host's state.
#[derive(Debug, Clone, Default)]
pub struct StateResponse {
    pub state: Value,
    pub diagnostics: Diagnostics,
}

impl StateResponse {
    pub fn new(state: Value) -> Self {
        Self {
            state,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Response carrying `state` and the given diagnostics
    pub fn with_diagnostics(state: Value, diagnostics: Diagnostics) -> Self {
        Self { state, diagnostics }
    }
}

/// Create request: the planned state and the raw configuration
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub plan: Value,
    pub config: Value,
}

/// Read request: the current state
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub state: Value,
}

/// Update request: prior state, planned state and configuration
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub state: Value,
    pub plan: Value,
    pub config: Value,
}

/// Delete request: the current state
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub state: Value,
}

/// A managed resource type
#[async_trait]
pub trait Resource<D>: Send + Sync {
    /// Full type name, derived from the provider's type name
    fn type_name(&self, provider_type_name: &str) -> String;

    fn schema(&self) -> Schema;

    /// Receive the provider data. `None` means the provider is not configured
    /// yet, which is normal during validation.
    fn configure(&mut self, data: Option<&D>, diagnostics: &mut Diagnostics);

    async fn create(&self, ctx: &Context, req: CreateRequest) -> StateResponse;

    async fn read(&self, ctx: &Context, req: ReadRequest) -> StateResponse;

    async fn update(&self, ctx: &Context, req: UpdateRequest) -> StateResponse;

    /// Delete the resource. On error diagnostics the host keeps the prior state.
    async fn delete(&self, ctx: &Context, req: DeleteRequest) -> Diagnostics;

    /// Build the initial state for `terraform import`
    async fn import_state(&self, _ctx: &Context, _id: &str) -> StateResponse {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_error(
            "Resource Import Not Implemented",
            "This resource does not support import.",
        );
        StateResponse::with_diagnostics(Value::Null, diagnostics)
    }
}

/// Read request for a data source: its configuration
#[derive(Debug, Clone)]
pub struct ReadDataSourceRequest {
    pub config: Value,
}

/// A data source type
#[async_trait]
pub trait DataSource<D>: Send + Sync {
    fn type_name(&self, provider_type_name: &str) -> String;

    fn schema(&self) -> Schema;

    fn configure(&mut self, data: Option<&D>, diagnostics: &mut Diagnostics);

    async fn read(&self, ctx: &Context, req: ReadDataSourceRequest) -> StateResponse;
}
