//! In-memory daemon used by unit tests

use crate::ollama::{
    ClientError, DeleteRequest, ListModel, ListResponse, ModelApi, ModelDetails, ProgressResponse,
    PullRequest, ShowRequest, ShowResponse, StatusError, canonical_name,
};
use async_trait::async_trait;
use chrono::DateTime;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Show(String),
    Pull(String),
    Delete(String),
}

#[derive(Default)]
pub struct MockApi {
    models: Mutex<Vec<ListModel>>,
    calls: Mutex<Vec<Call>>,
    pull_failures: Mutex<HashMap<String, String>>,
    delete_failures: Mutex<HashMap<String, String>>,
}

fn model(name: &str, serial: usize) -> ListModel {
    ListModel {
        name: name.to_string(),
        model: name.to_string(),
        modified_at: DateTime::parse_from_rfc3339("2024-05-10T14:31:54-07:00").unwrap(),
        size: 1_000 + serial as i64,
        digest: format!("sha256:{:04}", serial),
        details: ModelDetails {
            format: "gguf".to_string(),
            family: "llama".to_string(),
            families: Some(vec!["llama".to_string()]),
            ..Default::default()
        },
    }
}

fn not_found(name: &str) -> ClientError {
    ClientError::Status(StatusError {
        status_code: 404,
        status: "404 Not Found".to_string(),
        error_message: format!("model '{}' not found", name),
    })
}

impl MockApi {
    pub fn with_models(names: &[&str]) -> Self {
        let api = Self::default();
        *api.models.lock().unwrap() = names
            .iter()
            .enumerate()
            .map(|(i, name)| model(name, i))
            .collect();
        api
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_pull(&self, name: &str, message: &str) {
        self.pull_failures
            .lock()
            .unwrap()
            .insert(canonical_name(name), message.to_string());
    }

    pub fn fail_delete(&self, name: &str, message: &str) {
        self.delete_failures
            .lock()
            .unwrap()
            .insert(canonical_name(name), message.to_string());
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn position(&self, name: &str) -> Option<usize> {
        let wanted = canonical_name(name);
        self.models
            .lock()
            .unwrap()
            .iter()
            .position(|m| canonical_name(&m.name) == wanted)
    }
}

#[async_trait]
impl ModelApi for MockApi {
    async fn list(&self) -> Result<ListResponse, ClientError> {
        self.record(Call::List);
        Ok(ListResponse {
            models: self.models.lock().unwrap().clone(),
        })
    }

    async fn show(&self, req: &ShowRequest) -> Result<ShowResponse, ClientError> {
        self.record(Call::Show(req.model.clone()));
        let index = self.position(&req.model).ok_or_else(|| not_found(&req.model))?;
        let model = self.models.lock().unwrap()[index].clone();
        Ok(ShowResponse {
            details: model.details,
            modified_at: Some(model.modified_at),
            ..Default::default()
        })
    }

    async fn pull(
        &self,
        req: &PullRequest,
        progress: &(dyn for<'a> Fn(&'a ProgressResponse) + Send + Sync),
    ) -> Result<(), ClientError> {
        self.record(Call::Pull(req.model.clone()));
        if let Some(message) = self.pull_failures.lock().unwrap().get(&canonical_name(&req.model)) {
            return Err(ClientError::Stream(message.clone()));
        }
        if self.position(&req.model).is_none() {
            let mut models = self.models.lock().unwrap();
            let serial = models.len() + 100;
            models.push(model(&canonical_name(&req.model), serial));
        }
        progress(&ProgressResponse {
            status: "success".to_string(),
            ..Default::default()
        });
        Ok(())
    }

    async fn delete(&self, req: &DeleteRequest) -> Result<(), ClientError> {
        self.record(Call::Delete(req.model.clone()));
        let failure = self
            .delete_failures
            .lock()
            .unwrap()
            .get(&canonical_name(&req.model))
            .cloned();
        if let Some(message) = failure {
            return Err(ClientError::Stream(message));
        }
        let index = self.position(&req.model).ok_or_else(|| not_found(&req.model))?;
        self.models.lock().unwrap().remove(index);
        Ok(())
    }
}
