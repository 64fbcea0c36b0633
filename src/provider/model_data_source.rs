//! `ollama_model` data source: every model known to the daemon

use super::handle::ClientHandle;
use super::schema::model_data_source_schema;
use super::state::model_list_value;
use crate::framework::{
    Context, DataSource, Diagnostics, ReadDataSourceRequest, Schema, StateResponse, Value,
};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct ModelDataSource {
    client: Option<ClientHandle>,
}

impl ModelDataSource {
    pub fn new() -> Box<dyn DataSource<ClientHandle>> {
        Box::new(Self::default())
    }
}

#[async_trait]
impl DataSource<ClientHandle> for ModelDataSource {
    fn type_name(&self, provider_type_name: &str) -> String {
        format!("{}_model", provider_type_name)
    }

    fn schema(&self) -> Schema {
        model_data_source_schema()
    }

    fn configure(&mut self, data: Option<&ClientHandle>, _diagnostics: &mut Diagnostics) {
        if let Some(client) = data {
            self.client = Some(client.clone());
        }
    }

    async fn read(&self, ctx: &Context, _req: ReadDataSourceRequest) -> StateResponse {
        let mut diagnostics = Diagnostics::new();
        let Some(client) = &self.client else {
            diagnostics.add_error(
                "Unconfigured Provider",
                "Expected a configured Ollama client. Please report this issue to the provider developers.",
            );
            return StateResponse::with_diagnostics(Value::Null, diagnostics);
        };

        match client.list(ctx).await {
            Ok(listing) => {
                tracing::debug!(count = listing.models.len(), "Listed models");
                StateResponse::new(model_list_value(&listing.models))
            }
            Err(e) => {
                diagnostics.push(e.into());
                StateResponse::with_diagnostics(Value::Null, diagnostics)
            }
        }
    }
}
