//! Common test fixtures: an in-process fake Ollama daemon built on axum

#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use terraform_provider_ollama::framework::Value;
use terraform_provider_ollama::ollama::{ListModel, ListResponse, ModelDetails, canonical_name};
use tokio::net::TcpListener;

/// A request received by the fake daemon, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Show(String),
    Pull(String),
    Delete(String),
}

/// How an injected failure is reported
#[derive(Debug, Clone)]
pub enum Failure {
    /// Non-2xx status with an `{"error": ...}` body
    Status(u16, String),
    /// 200 response whose progress stream ends in an error line
    Stream(String),
}

#[derive(Default)]
struct DaemonState {
    models: Vec<ListModel>,
    calls: Vec<Call>,
    pull_failures: HashMap<String, Failure>,
    delete_failures: HashMap<String, Failure>,
    list_failure: Option<Failure>,
    serial: u64,
}

/// Fake daemon serving the model management endpoints on an ephemeral port
#[derive(Clone)]
pub struct FakeOllama {
    state: Arc<Mutex<DaemonState>>,
    addr: SocketAddr,
}

#[derive(Deserialize)]
struct ModelBody {
    model: String,
}

pub fn list_model(name: &str, families: Option<&[&str]>, serial: u64) -> ListModel {
    ListModel {
        name: name.to_string(),
        model: name.to_string(),
        modified_at: DateTime::parse_from_rfc3339("2024-05-10T14:31:54-07:00").unwrap(),
        size: 3_800_000_000 + serial as i64,
        digest: format!("{:064x}", serial),
        details: ModelDetails {
            parent_model: String::new(),
            format: "gguf".to_string(),
            family: "llama".to_string(),
            families: families.map(|f| f.iter().map(|s| s.to_string()).collect()),
            parameter_size: "7B".to_string(),
            quantization_level: "Q4_0".to_string(),
        },
    }
}

fn failure_response(failure: &Failure) -> Response {
    match failure {
        Failure::Status(code, message) => (
            StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(json!({ "error": message })),
        )
            .into_response(),
        Failure::Stream(message) => (
            StatusCode::OK,
            format!(
                "{}\n{}\n",
                json!({"status": "pulling manifest"}),
                json!({ "error": message })
            ),
        )
            .into_response(),
    }
}

fn not_found(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("model '{}' not found", name) })),
    )
        .into_response()
}

impl DaemonState {
    fn position(&self, name: &str) -> Option<usize> {
        let wanted = canonical_name(name);
        self.models
            .iter()
            .position(|m| canonical_name(&m.name) == wanted)
    }
}

async fn tags(State(state): State<Arc<Mutex<DaemonState>>>) -> Response {
    let mut state = state.lock().unwrap();
    state.calls.push(Call::List);
    if let Some(failure) = &state.list_failure {
        return failure_response(failure);
    }
    Json(ListResponse {
        models: state.models.clone(),
    })
    .into_response()
}

async fn show(
    State(state): State<Arc<Mutex<DaemonState>>>,
    Json(body): Json<ModelBody>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.calls.push(Call::Show(body.model.clone()));
    match state.position(&body.model) {
        Some(index) => {
            let model = &state.models[index];
            Json(json!({
                "license": "",
                "modelfile": format!("FROM {}", model.name),
                "parameters": "",
                "template": "{{ .Prompt }}",
                "details": model.details,
                "modified_at": model.modified_at,
            }))
            .into_response()
        }
        None => not_found(&body.model),
    }
}

async fn pull(
    State(state): State<Arc<Mutex<DaemonState>>>,
    Json(body): Json<ModelBody>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.calls.push(Call::Pull(body.model.clone()));
    if let Some(failure) = state.pull_failures.get(&canonical_name(&body.model)) {
        return failure_response(failure);
    }
    if state.position(&body.model).is_none() {
        state.serial += 1;
        let serial = state.serial;
        state
            .models
            .push(list_model(&canonical_name(&body.model), Some(&["llama"]), serial));
    }
    Json(json!({"status": "success"})).into_response()
}

async fn remove(
    State(state): State<Arc<Mutex<DaemonState>>>,
    Json(body): Json<ModelBody>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.calls.push(Call::Delete(body.model.clone()));
    if let Some(failure) = state.delete_failures.get(&canonical_name(&body.model)) {
        return failure_response(failure);
    }
    match state.position(&body.model) {
        Some(index) => {
            state.models.remove(index);
            StatusCode::OK.into_response()
        }
        None => not_found(&body.model),
    }
}

impl FakeOllama {
    /// Start the daemon with no models installed
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(DaemonState::default()));
        let app = Router::new()
            .route("/api/tags", get(tags))
            .route("/api/show", post(show))
            .route("/api/pull", post(pull))
            .route("/api/delete", delete(remove))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { state, addr }
    }

    /// Host string as a user would configure it
    pub fn host(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Provider configuration value pointing at this daemon
    pub fn provider_config(&self) -> Value {
        Value::object([("host", Value::from(self.host()))])
    }

    pub fn install(&self, model: ListModel) {
        self.state.lock().unwrap().models.push(model);
    }

    pub fn install_named(&self, names: &[&str]) {
        let mut state = self.state.lock().unwrap();
        for name in names {
            state.serial += 1;
            let serial = state.serial;
            state.models.push(list_model(name, Some(&["llama"]), serial));
        }
    }

    pub fn model_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .models
            .iter()
            .map(|m| m.name.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls other than list/show, which observation issues freely
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Pull(_) | Call::Delete(_)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn fail_pull(&self, name: &str, failure: Failure) {
        self.state
            .lock()
            .unwrap()
            .pull_failures
            .insert(canonical_name(name), failure);
    }

    pub fn fail_delete(&self, name: &str, failure: Failure) {
        self.state
            .lock()
            .unwrap()
            .delete_failures
            .insert(canonical_name(name), failure);
    }

    pub fn fail_list(&self, failure: Failure) {
        self.state.lock().unwrap().list_failure = Some(failure);
    }
}
