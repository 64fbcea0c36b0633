//! `tfplugin6.Provider` service implementation
//!
//! Translates protocol requests into framework calls on a [`Provider`]. Every
//! failure is reported as a diagnostic; gRPC errors are reserved for
//! malformed transport-level requests.

use super::convert::{decode_dynamic, diagnostics_to_proto, encode_dynamic, schema_to_proto};
use super::proto::tfplugin6 as proto;
use super::proto::tfplugin6::provider_server::Provider as ProviderRpc;
use crate::error::ProviderError;
use crate::framework::{
    CodecError, Context, CreateRequest, DataSource, DataSourceFactory, DeleteRequest, Diagnostic,
    Diagnostics, Provider, ReadDataSourceRequest, ReadRequest, Resource, ResourceFactory, Schema,
    StateResponse, UpdateRequest, Value, plan::plan_resource_change,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::instrument;

/// gRPC front of a framework provider
pub struct ProviderService<P: Provider> {
    provider: Arc<P>,
    type_name: String,
    data: Arc<RwLock<Option<P::Data>>>,
    resources: HashMap<String, ResourceFactory<P::Data>>,
    data_sources: HashMap<String, DataSourceFactory<P::Data>>,
    cancel: CancellationToken,
}

impl<P: Provider> ProviderService<P> {
    pub fn new(provider: P) -> Self {
        let type_name = provider.metadata().type_name;
        let resources = provider
            .resources()
            .into_iter()
            .map(|factory| (factory().type_name(&type_name), factory))
            .collect();
        let data_sources = provider
            .data_sources()
            .into_iter()
            .map(|factory| (factory().type_name(&type_name), factory))
            .collect();

        Self {
            provider: Arc::new(provider),
            type_name,
            data: Arc::new(RwLock::new(None)),
            resources,
            data_sources,
            cancel: CancellationToken::new(),
        }
    }

    /// Token cancelled when the host calls `StopProvider`
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn context(&self) -> Context {
        Context::new(self.cancel.clone())
    }

    async fn resource(&self, type_name: &str) -> Result<Box<dyn Resource<P::Data>>, Diagnostics> {
        let factory = self.resources.get(type_name).ok_or_else(|| {
            Diagnostics::from(Diagnostic::error(
                "Resource Type Not Found",
                format!(
                    "The {} provider does not serve resource type {:?}.",
                    self.type_name, type_name
                ),
            ))
        })?;

        let mut resource = factory();
        let mut diagnostics = Diagnostics::new();
        resource.configure(self.data.read().await.as_ref(), &mut diagnostics);
        if diagnostics.has_error() {
            return Err(diagnostics);
        }
        Ok(resource)
    }

    async fn data_source(
        &self,
        type_name: &str,
    ) -> Result<Box<dyn DataSource<P::Data>>, Diagnostics> {
        let factory = self.data_sources.get(type_name).ok_or_else(|| {
            Diagnostics::from(Diagnostic::error(
                "Data Source Type Not Found",
                format!(
                    "The {} provider does not serve data source type {:?}.",
                    self.type_name, type_name
                ),
            ))
        })?;

        let mut data_source = factory();
        let mut diagnostics = Diagnostics::new();
        data_source.configure(self.data.read().await.as_ref(), &mut diagnostics);
        if diagnostics.has_error() {
            return Err(diagnostics);
        }
        Ok(data_source)
    }
}

fn capabilities() -> proto::ServerCapabilities {
    proto::ServerCapabilities {
        plan_destroy: true,
        get_provider_schema_optional: false,
        move_resource_state: false,
    }
}

fn codec_diagnostics(what: &'static str, err: CodecError) -> Diagnostics {
    Diagnostics::from(ProviderError::codec(what, err).to_diagnostic())
}

fn decode(
    value: Option<&proto::DynamicValue>,
    what: &'static str,
    diagnostics: &mut Diagnostics,
) -> Option<Value> {
    match decode_dynamic(value) {
        Ok(value) => Some(value),
        Err(e) => {
            diagnostics.extend(codec_diagnostics(what, e));
            None
        }
    }
}

/// Conform `value` to `schema` and encode it for the host
fn encode_state(
    schema: &Schema,
    value: &Value,
    diagnostics: &mut Diagnostics,
) -> Option<proto::DynamicValue> {
    match encode_dynamic(&schema.conform(value)) {
        Ok(dv) => Some(dv),
        Err(e) => {
            diagnostics.extend(codec_diagnostics("state", e));
            None
        }
    }
}

#[tonic::async_trait]
impl<P: Provider> ProviderRpc for ProviderService<P> {
    async fn get_metadata(
        &self,
        _request: Request<proto::get_metadata::Request>,
    ) -> Result<Response<proto::get_metadata::Response>, Status> {
        Ok(Response::new(proto::get_metadata::Response {
            server_capabilities: Some(capabilities()),
            diagnostics: Vec::new(),
            data_sources: self
                .data_sources
                .keys()
                .map(|type_name| proto::get_metadata::DataSourceMetadata {
                    type_name: type_name.clone(),
                })
                .collect(),
            resources: self
                .resources
                .keys()
                .map(|type_name| proto::get_metadata::ResourceMetadata {
                    type_name: type_name.clone(),
                })
                .collect(),
        }))
    }

    #[instrument(skip_all)]
    async fn get_provider_schema(
        &self,
        _request: Request<proto::get_provider_schema::Request>,
    ) -> Result<Response<proto::get_provider_schema::Response>, Status> {
        let resource_schemas = self
            .resources
            .iter()
            .map(|(name, factory)| (name.clone(), schema_to_proto(&factory().schema())))
            .collect();
        let data_source_schemas = self
            .data_sources
            .iter()
            .map(|(name, factory)| (name.clone(), schema_to_proto(&factory().schema())))
            .collect();

        Ok(Response::new(proto::get_provider_schema::Response {
            provider: Some(schema_to_proto(&self.provider.schema())),
            resource_schemas,
            data_source_schemas,
            diagnostics: Vec::new(),
            provider_meta: Some(schema_to_proto(&Schema::default())),
            server_capabilities: Some(capabilities()),
        }))
    }

    #[instrument(skip_all)]
    async fn validate_provider_config(
        &self,
        request: Request<proto::validate_provider_config::Request>,
    ) -> Result<Response<proto::validate_provider_config::Response>, Status> {
        let mut diagnostics = Diagnostics::new();
        let config = request.get_ref().config.as_ref();
        decode(config, "provider configuration", &mut diagnostics);
        Ok(Response::new(proto::validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    #[instrument(skip_all, fields(type_name = %request.get_ref().type_name))]
    async fn validate_resource_config(
        &self,
        request: Request<proto::validate_resource_config::Request>,
    ) -> Result<Response<proto::validate_resource_config::Response>, Status> {
        let req = request.into_inner();
        let mut diagnostics = Diagnostics::new();
        if let Err(diags) = self.resource(&req.type_name).await {
            diagnostics.extend(diags);
        } else {
            decode(req.config.as_ref(), "resource configuration", &mut diagnostics);
        }
        Ok(Response::new(proto::validate_resource_config::Response {
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    #[instrument(skip_all, fields(type_name = %request.get_ref().type_name))]
    async fn validate_data_resource_config(
        &self,
        request: Request<proto::validate_data_resource_config::Request>,
    ) -> Result<Response<proto::validate_data_resource_config::Response>, Status> {
        let req = request.into_inner();
        let mut diagnostics = Diagnostics::new();
        if let Err(diags) = self.data_source(&req.type_name).await {
            diagnostics.extend(diags);
        } else {
            decode(req.config.as_ref(), "data source configuration", &mut diagnostics);
        }
        Ok(Response::new(proto::validate_data_resource_config::Response {
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    #[instrument(
        skip_all,
        fields(type_name = %request.get_ref().type_name, version = request.get_ref().version)
    )]
    async fn upgrade_resource_state(
        &self,
        request: Request<proto::upgrade_resource_state::Request>,
    ) -> Result<Response<proto::upgrade_resource_state::Response>, Status> {
        let req = request.into_inner();
        let mut diagnostics = Diagnostics::new();
        let upgraded_state = match self.resource(&req.type_name).await {
            Err(diags) => {
                diagnostics.extend(diags);
                None
            }
            Ok(resource) => {
                let schema = resource.schema();
                let raw = req.raw_state.unwrap_or_default();
                if raw.json.is_empty() && !raw.flatmap.is_empty() {
                    diagnostics.add_error(
                        "Unsupported State Format",
                        "Stored state uses the legacy flatmap format, which this provider cannot upgrade.",
                    );
                    None
                } else {
                    match Value::from_json_slice(&raw.json) {
                        Ok(state) => encode_state(&schema, &state, &mut diagnostics),
                        Err(e) => {
                            diagnostics.extend(codec_diagnostics("stored state", e));
                            None
                        }
                    }
                }
            }
        };

        Ok(Response::new(proto::upgrade_resource_state::Response {
            upgraded_state,
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    #[instrument(skip_all, fields(terraform_version = %request.get_ref().terraform_version))]
    async fn configure_provider(
        &self,
        request: Request<proto::configure_provider::Request>,
    ) -> Result<Response<proto::configure_provider::Response>, Status> {
        let req = request.into_inner();
        let mut diagnostics = Diagnostics::new();
        let config = decode(req.config.as_ref(), "provider configuration", &mut diagnostics);
        if let Some(config) = config {
            let configured = self.provider.configure(&self.context(), &config).await;
            diagnostics.extend(configured.diagnostics);
            if let Some(data) = configured.data {
                *self.data.write().await = Some(data);
            }
        }
        Ok(Response::new(proto::configure_provider::Response {
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    #[instrument(skip_all, fields(type_name = %request.get_ref().type_name))]
    async fn read_resource(
        &self,
        request: Request<proto::read_resource::Request>,
    ) -> Result<Response<proto::read_resource::Response>, Status> {
        let req = request.into_inner();
        let mut diagnostics = Diagnostics::new();
        let mut new_state = None;

        match self.resource(&req.type_name).await {
            Err(diags) => diagnostics.extend(diags),
            Ok(resource) => {
                let current = decode(req.current_state.as_ref(), "current state", &mut diagnostics);
                if let Some(state) = current {
                    let read = if state.is_null() {
                        StateResponse::new(Value::Null)
                    } else {
                        resource.read(&self.context(), ReadRequest { state }).await
                    };
                    diagnostics.extend(read.diagnostics);
                    new_state = encode_state(&resource.schema(), &read.state, &mut diagnostics);
                }
            }
        }

        Ok(Response::new(proto::read_resource::Response {
            new_state,
            diagnostics: diagnostics_to_proto(&diagnostics),
            private: req.private,
        }))
    }

    #[instrument(skip_all, fields(type_name = %request.get_ref().type_name))]
    async fn plan_resource_change(
        &self,
        request: Request<proto::plan_resource_change::Request>,
    ) -> Result<Response<proto::plan_resource_change::Response>, Status> {
        let req = request.into_inner();
        let mut diagnostics = Diagnostics::new();
        let mut planned_state = None;

        match self.resource(&req.type_name).await {
            Err(diags) => diagnostics.extend(diags),
            Ok(resource) => {
                let prior = decode(req.prior_state.as_ref(), "prior state", &mut diagnostics);
                let proposed =
                    decode(req.proposed_new_state.as_ref(), "proposed state", &mut diagnostics);
                let config =
                    decode(req.config.as_ref(), "resource configuration", &mut diagnostics);
                if let (Some(prior), Some(proposed), Some(config)) = (prior, proposed, config) {
                    let schema = resource.schema();
                    let planned = plan_resource_change(&schema, &prior, &proposed, &config);
                    planned_state = encode_state(&schema, &planned, &mut diagnostics);
                }
            }
        }

        Ok(Response::new(proto::plan_resource_change::Response {
            planned_state,
            requires_replace: Vec::new(),
            planned_private: req.prior_private,
            diagnostics: diagnostics_to_proto(&diagnostics),
            legacy_type_system: false,
        }))
    }

    #[instrument(skip_all, fields(type_name = %request.get_ref().type_name))]
    async fn apply_resource_change(
        &self,
        request: Request<proto::apply_resource_change::Request>,
    ) -> Result<Response<proto::apply_resource_change::Response>, Status> {
        let req = request.into_inner();
        let mut diagnostics = Diagnostics::new();
        let mut new_state = None;

        match self.resource(&req.type_name).await {
            Err(diags) => diagnostics.extend(diags),
            Ok(resource) => {
                let prior = decode(req.prior_state.as_ref(), "prior state", &mut diagnostics);
                let planned =
                    decode(req.planned_state.as_ref(), "planned state", &mut diagnostics);
                let config =
                    decode(req.config.as_ref(), "resource configuration", &mut diagnostics);
                if let (Some(prior), Some(planned), Some(config)) = (prior, planned, config) {
                    let ctx = self.context();
                    let state = if prior.is_null() {
                        tracing::debug!("Applying create");
                        let created = resource
                            .create(
                                &ctx,
                                CreateRequest {
                                    plan: planned,
                                    config,
                                },
                            )
                            .await;
                        diagnostics.extend(created.diagnostics);
                        created.state
                    } else if planned.is_null() {
                        tracing::debug!("Applying delete");
                        let deleted = resource
                            .delete(
                                &ctx,
                                DeleteRequest {
                                    state: prior.clone(),
                                },
                            )
                            .await;
                        let failed = deleted.has_error();
                        diagnostics.extend(deleted);
                        if failed { prior } else { Value::Null }
                    } else {
                        tracing::debug!("Applying update");
                        let updated = resource
                            .update(
                                &ctx,
                                UpdateRequest {
                                    state: prior,
                                    plan: planned,
                                    config,
                                },
                            )
                            .await;
                        diagnostics.extend(updated.diagnostics);
                        updated.state
                    };
                    new_state = encode_state(
                        &resource.schema(),
                        &state.unknowns_to_null(),
                        &mut diagnostics,
                    );
                }
            }
        }

        Ok(Response::new(proto::apply_resource_change::Response {
            new_state,
            private: req.planned_private,
            diagnostics: diagnostics_to_proto(&diagnostics),
            legacy_type_system: false,
        }))
    }

    #[instrument(
        skip_all,
        fields(type_name = %request.get_ref().type_name, id = %request.get_ref().id)
    )]
    async fn import_resource_state(
        &self,
        request: Request<proto::import_resource_state::Request>,
    ) -> Result<Response<proto::import_resource_state::Response>, Status> {
        let req = request.into_inner();
        let mut diagnostics = Diagnostics::new();
        let mut imported_resources = Vec::new();

        match self.resource(&req.type_name).await {
            Err(diags) => diagnostics.extend(diags),
            Ok(resource) => {
                let imported = resource.import_state(&self.context(), &req.id).await;
                diagnostics.extend(imported.diagnostics);
                if !imported.state.is_null()
                    && let Some(state) =
                        encode_state(&resource.schema(), &imported.state, &mut diagnostics)
                {
                    imported_resources.push(proto::import_resource_state::ImportedResource {
                        type_name: req.type_name.clone(),
                        state: Some(state),
                        private: Vec::new(),
                    });
                }
            }
        }

        Ok(Response::new(proto::import_resource_state::Response {
            imported_resources,
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    #[instrument(skip_all, fields(type_name = %request.get_ref().type_name))]
    async fn read_data_source(
        &self,
        request: Request<proto::read_data_source::Request>,
    ) -> Result<Response<proto::read_data_source::Response>, Status> {
        let req = request.into_inner();
        let mut diagnostics = Diagnostics::new();
        let mut state = None;

        match self.data_source(&req.type_name).await {
            Err(diags) => diagnostics.extend(diags),
            Ok(data_source) => {
                let config =
                    decode(req.config.as_ref(), "data source configuration", &mut diagnostics);
                if let Some(config) = config {
                    let read = data_source
                        .read(&self.context(), ReadDataSourceRequest { config })
                        .await;
                    diagnostics.extend(read.diagnostics);
                    if !diagnostics.has_error() {
                        state = encode_state(&data_source.schema(), &read.state, &mut diagnostics);
                    }
                }
            }
        }

        Ok(Response::new(proto::read_data_source::Response {
            state,
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<proto::stop_provider::Request>,
    ) -> Result<Response<proto::stop_provider::Response>, Status> {
        tracing::info!("Stop requested, cancelling in-flight operations");
        self.cancel.cancel();
        Ok(Response::new(proto::stop_provider::Response {
            error: String::new(),
        }))
    }
}
