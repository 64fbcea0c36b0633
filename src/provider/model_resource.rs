//! `ollama_model` resource: one named model installed on the daemon

use super::handle::ClientHandle;
use super::schema::model_resource_schema;
use super::state::{ModelResourceModel, Observation};
use crate::error::{ProviderError, ProviderResult};
use crate::framework::{
    Context, CreateRequest, DeleteRequest, Diagnostic, Diagnostics, ReadRequest, Resource, Schema,
    StateResponse, UpdateRequest, Value,
};
use crate::ollama::canonical_name;
use async_trait::async_trait;

/// Resource controller, instantiated per request
#[derive(Debug, Default)]
pub struct ModelResource {
    client: Option<ClientHandle>,
}

impl ModelResource {
    pub fn new() -> Box<dyn Resource<ClientHandle>> {
        Box::new(Self::default())
    }

    fn client(&self, diagnostics: &mut Diagnostics) -> Option<&ClientHandle> {
        if self.client.is_none() {
            diagnostics.add_error(
                "Unconfigured Provider",
                "Expected a configured Ollama client. Please report this issue to the provider developers.",
            );
        }
        self.client.as_ref()
    }

    fn decode(
        value: &Value,
        what: &'static str,
        diagnostics: &mut Diagnostics,
    ) -> Option<ModelResourceModel> {
        match ModelResourceModel::from_value(value) {
            Ok(model) => Some(model),
            Err(e) => {
                diagnostics.push(ProviderError::codec(what, e).into());
                None
            }
        }
    }

    /// Current daemon-side attributes of `name`
    async fn observe(
        client: &ClientHandle,
        ctx: &Context,
        name: &str,
    ) -> ProviderResult<Observation> {
        let show = client.show(ctx, name).await?;
        let entry = client.find(ctx, name).await?;
        if entry.is_none() {
            tracing::warn!(model = %name, "Model missing from listing after show");
        }
        Ok(Observation::new(show.modified_at.as_ref(), entry.as_ref()))
    }

    /// Fill the plan's unknown attributes after a successful pull
    async fn settle(
        client: &ClientHandle,
        ctx: &Context,
        planned: ModelResourceModel,
        diagnostics: &mut Diagnostics,
    ) -> ModelResourceModel {
        if !planned.has_unknowns() {
            return planned;
        }
        match Self::observe(client, ctx, &planned.name).await {
            Ok(observation) => planned.resolve(Some(&observation)),
            Err(e) => {
                tracing::warn!(model = %planned.name, error = %e, "Could not observe pulled model");
                diagnostics.push(Diagnostic::warning(
                    "Unable to Read Pulled Model",
                    format!(
                        "Model {} was pulled, but its attributes could not be read back: {}. \
                         They will be populated on the next refresh.",
                        planned.name, e
                    ),
                ));
                planned.resolve(None)
            }
        }
    }
}

#[async_trait]
impl Resource<ClientHandle> for ModelResource {
    fn type_name(&self, provider_type_name: &str) -> String {
        format!("{}_model", provider_type_name)
    }

    fn schema(&self) -> Schema {
        model_resource_schema()
    }

    fn configure(&mut self, data: Option<&ClientHandle>, _diagnostics: &mut Diagnostics) {
        // absent during validation, before the provider is configured
        if let Some(client) = data {
            self.client = Some(client.clone());
        }
    }

    async fn create(&self, ctx: &Context, req: CreateRequest) -> StateResponse {
        let mut diagnostics = Diagnostics::new();
        let Some(client) = self.client(&mut diagnostics) else {
            return StateResponse::with_diagnostics(Value::Null, diagnostics);
        };
        let Some(planned) = Self::decode(&req.plan, "planned model state", &mut diagnostics) else {
            return StateResponse::with_diagnostics(Value::Null, diagnostics);
        };

        let _lock = client.locks().acquire(&planned.name).await;
        tracing::debug!(model = %planned.name, "Creating model");

        if let Err(e) = client.pull(ctx, &planned.name).await {
            diagnostics.push(e.into());
            return StateResponse::with_diagnostics(Value::Null, diagnostics);
        }

        let state = Self::settle(client, ctx, planned, &mut diagnostics).await;
        StateResponse::with_diagnostics(state.to_value(), diagnostics)
    }

    async fn read(&self, ctx: &Context, req: ReadRequest) -> StateResponse {
        let mut diagnostics = Diagnostics::new();
        let Some(client) = self.client(&mut diagnostics) else {
            return StateResponse::with_diagnostics(req.state, diagnostics);
        };
        let Some(current) = Self::decode(&req.state, "model state", &mut diagnostics) else {
            return StateResponse::with_diagnostics(req.state, diagnostics);
        };

        let _lock = client.locks().acquire(&current.name).await;
        match Self::observe(client, ctx, &current.name).await {
            Ok(observation) => {
                let refreshed = current.refresh(&observation);
                StateResponse::new(refreshed.to_value())
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    model = %current.name,
                    "Model no longer exists, removing from state"
                );
                StateResponse::new(Value::Null)
            }
            Err(e) => {
                diagnostics.push(e.into());
                StateResponse::with_diagnostics(req.state, diagnostics)
            }
        }
    }

    async fn update(&self, ctx: &Context, req: UpdateRequest) -> StateResponse {
        let mut diagnostics = Diagnostics::new();
        let Some(client) = self.client(&mut diagnostics) else {
            return StateResponse::with_diagnostics(req.state, diagnostics);
        };
        let Some(prior) = Self::decode(&req.state, "prior model state", &mut diagnostics) else {
            return StateResponse::with_diagnostics(req.state, diagnostics);
        };
        let Some(planned) = Self::decode(&req.plan, "planned model state", &mut diagnostics) else {
            return StateResponse::with_diagnostics(req.state, diagnostics);
        };

        let _lock = client
            .locks()
            .acquire_many([prior.name.as_str(), planned.name.as_str()])
            .await;
        tracing::debug!(old = %prior.name, new = %planned.name, "Updating model");

        let renamed = canonical_name(&prior.name) != canonical_name(&planned.name);
        if renamed && let Err(e) = client.delete(ctx, &prior.name).await {
            diagnostics.push(e.into());
            return StateResponse::with_diagnostics(req.state, diagnostics);
        }

        if let Err(e) = client.pull(ctx, &planned.name).await {
            diagnostics.push(e.into());
            if !renamed {
                return StateResponse::with_diagnostics(req.state, diagnostics);
            }

            tracing::warn!(
                model = %prior.name,
                "Pull failed after delete, restoring previous model"
            );
            return match client.pull(ctx, &prior.name).await {
                Ok(()) => {
                    diagnostics.add_warning(
                        "Previous Model Restored",
                        format!(
                            "Model {} was deleted before pulling {} failed; it has been pulled again.",
                            prior.name, planned.name
                        ),
                    );
                    StateResponse::with_diagnostics(req.state, diagnostics)
                }
                Err(restore) => {
                    diagnostics.push(restore.into());
                    diagnostics.add_error(
                        "Previous Model Not Restored",
                        format!(
                            "Model {} was deleted and could not be pulled again; neither {} nor {} is installed.",
                            prior.name, prior.name, planned.name
                        ),
                    );
                    StateResponse::with_diagnostics(Value::Null, diagnostics)
                }
            };
        }

        let state = Self::settle(client, ctx, planned, &mut diagnostics).await;
        StateResponse::with_diagnostics(state.to_value(), diagnostics)
    }

    async fn delete(&self, ctx: &Context, req: DeleteRequest) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let Some(client) = self.client(&mut diagnostics) else {
            return diagnostics;
        };
        let Some(current) = Self::decode(&req.state, "model state", &mut diagnostics) else {
            return diagnostics;
        };

        let _lock = client.locks().acquire(&current.name).await;
        if let Err(e) = client.delete(ctx, &current.name).await {
            diagnostics.push(e.into());
        }
        diagnostics
    }

    async fn import_state(&self, _ctx: &Context, id: &str) -> StateResponse {
        let name = id.trim();
        if name.is_empty() {
            let mut diagnostics = Diagnostics::new();
            diagnostics.add_error(
                "Missing Model Name",
                "Import an ollama_model by its model name, e.g. `terraform import ollama_model.example llama2`.",
            );
            return StateResponse::with_diagnostics(Value::Null, diagnostics);
        }
        StateResponse::new(ModelResourceModel::named(name).to_value())
    }
}
