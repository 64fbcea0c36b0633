//! tfplugin6 protocol tests: a served provider driven by a generated client

mod common;

use common::{Call, FakeOllama};
use std::net::SocketAddr;
use std::time::Duration;
use terraform_provider_ollama::OllamaProvider;
use terraform_provider_ollama::framework::Value;
use terraform_provider_ollama::grpc::convert::{decode_dynamic, encode_dynamic};
use terraform_provider_ollama::grpc::proto::plugin::Empty;
use terraform_provider_ollama::grpc::proto::plugin::grpc_controller_client::GrpcControllerClient;
use terraform_provider_ollama::grpc::proto::tfplugin6 as proto;
use terraform_provider_ollama::grpc::proto::tfplugin6::provider_client::ProviderClient;
use terraform_provider_ollama::grpc::server::{ServerOptions, serve};
use terraform_provider_ollama::ollama::ClientSettings;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

struct Plugin {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>,
}

impl Plugin {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let provider = OllamaProvider::new("test", ClientSettings::default()).with_env(|_| None);
        let handle = tokio::spawn(serve(
            listener,
            provider,
            ServerOptions::default(),
            shutdown.clone(),
        ));
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    async fn client(&self) -> ProviderClient<Channel> {
        ProviderClient::connect(format!("http://{}", self.addr))
            .await
            .unwrap()
    }
}

fn dynamic(value: &Value) -> Option<proto::DynamicValue> {
    Some(encode_dynamic(value).unwrap())
}

fn value(dv: Option<&proto::DynamicValue>) -> Value {
    decode_dynamic(dv).unwrap()
}

fn model_config(name: &str) -> Value {
    Value::object([
        ("name", Value::from(name)),
        ("modified_at", Value::Null),
        ("size", Value::Null),
        ("digest", Value::Null),
    ])
}

fn summaries(diagnostics: &[proto::Diagnostic]) -> Vec<&str> {
    diagnostics.iter().map(|d| d.summary.as_str()).collect()
}

async fn configure(client: &mut ProviderClient<Channel>, daemon: &FakeOllama) {
    let response = client
        .configure_provider(proto::configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: dynamic(&daemon.provider_config()),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
}

/// Plan then apply a change, returning the new state
async fn plan_and_apply(
    client: &mut ProviderClient<Channel>,
    prior: &Value,
    config: &Value,
) -> (Value, Vec<proto::Diagnostic>) {
    let proposed = if config.is_null() {
        Value::Null
    } else {
        let mut proposed = prior.clone();
        if proposed.is_null() {
            proposed = config.clone();
        }
        proposed.set("name", config.get("name").clone());
        proposed
    };

    let plan = client
        .plan_resource_change(proto::plan_resource_change::Request {
            type_name: "ollama_model".to_string(),
            prior_state: dynamic(prior),
            proposed_new_state: dynamic(&proposed),
            config: dynamic(config),
            prior_private: Vec::new(),
            provider_meta: None,
        })
        .await
        .unwrap()
        .into_inner();
    assert!(plan.diagnostics.is_empty(), "{:?}", plan.diagnostics);

    let apply = client
        .apply_resource_change(proto::apply_resource_change::Request {
            type_name: "ollama_model".to_string(),
            prior_state: dynamic(prior),
            planned_state: plan.planned_state,
            config: dynamic(config),
            planned_private: plan.planned_private,
            provider_meta: None,
        })
        .await
        .unwrap()
        .into_inner();
    (value(apply.new_state.as_ref()), apply.diagnostics)
}

#[tokio::test]
async fn test_metadata_and_schema() {
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;

    let metadata = client
        .get_metadata(proto::get_metadata::Request {})
        .await
        .unwrap()
        .into_inner();
    assert!(metadata.server_capabilities.unwrap().plan_destroy);
    assert_eq!(metadata.resources[0].type_name, "ollama_model");
    assert_eq!(metadata.data_sources[0].type_name, "ollama_model");

    let schema = client
        .get_provider_schema(proto::get_provider_schema::Request {})
        .await
        .unwrap()
        .into_inner();
    let provider = schema.provider.unwrap().block.unwrap();
    let host = provider.attributes.iter().find(|a| a.name == "host").unwrap();
    assert!(host.required);

    let resource = schema.resource_schemas["ollama_model"].block.clone().unwrap();
    let digest = resource
        .attributes
        .iter()
        .find(|a| a.name == "digest")
        .unwrap();
    assert!(digest.optional && digest.computed);

    let data_source = schema.data_source_schemas["ollama_model"].block.clone().unwrap();
    let models = data_source
        .attributes
        .iter()
        .find(|a| a.name == "models")
        .unwrap();
    assert!(models.computed);
    assert!(models.nested_type.is_some());
}

#[tokio::test]
async fn test_configure_without_host_reports_missing_host() {
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;

    let response = client
        .configure_provider(proto::configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: dynamic(&Value::object([("host", Value::Null)])),
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(summaries(&response.diagnostics), vec!["Missing Ollama API Host"]);
    let diagnostic = &response.diagnostics[0];
    assert_eq!(diagnostic.severity, proto::diagnostic::Severity::Error as i32);
    assert!(diagnostic.attribute.is_some());
}

#[tokio::test]
async fn test_configure_with_unknown_host() {
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;

    let response = client
        .configure_provider(proto::configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: dynamic(&Value::object([("host", Value::Unknown)])),
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(summaries(&response.diagnostics), vec!["Unknown Ollama API Host"]);
}

#[tokio::test]
async fn test_resource_lifecycle() {
    let daemon = FakeOllama::start().await;
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;
    configure(&mut client, &daemon).await;

    // create
    let (state, diagnostics) =
        plan_and_apply(&mut client, &Value::Null, &model_config("llama2")).await;
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    assert_eq!(state.get("name"), &Value::from("llama2"));
    assert!(state.get("digest").as_str().is_some());
    assert!(state.is_wholly_known());

    // refresh
    let read = client
        .read_resource(proto::read_resource::Request {
            type_name: "ollama_model".to_string(),
            current_state: dynamic(&state),
            private: Vec::new(),
            provider_meta: None,
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(value(read.new_state.as_ref()), state);

    // rename
    let (renamed, diagnostics) =
        plan_and_apply(&mut client, &state, &model_config("mistral")).await;
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    assert_eq!(renamed.get("name"), &Value::from("mistral"));

    // destroy
    let (destroyed, diagnostics) = plan_and_apply(&mut client, &renamed, &Value::Null).await;
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    assert!(destroyed.is_null());

    assert_eq!(
        daemon
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::List | Call::Show(_)))
            .collect::<Vec<_>>(),
        vec![
            Call::Pull("llama2".to_string()),
            Call::Delete("llama2".to_string()),
            Call::Pull("mistral".to_string()),
            Call::Delete("mistral".to_string()),
        ]
    );
    assert!(daemon.model_names().is_empty());
}

#[tokio::test]
async fn test_plan_without_changes_keeps_prior_state() {
    let daemon = FakeOllama::start().await;
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;
    configure(&mut client, &daemon).await;

    let (state, _) = plan_and_apply(&mut client, &Value::Null, &model_config("llama2")).await;
    let plan = client
        .plan_resource_change(proto::plan_resource_change::Request {
            type_name: "ollama_model".to_string(),
            prior_state: dynamic(&state),
            proposed_new_state: dynamic(&state),
            config: dynamic(&model_config("llama2")),
            prior_private: Vec::new(),
            provider_meta: None,
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(value(plan.planned_state.as_ref()), state);
}

#[tokio::test]
async fn test_read_of_deleted_model_returns_null_state() {
    let daemon = FakeOllama::start().await;
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;
    configure(&mut client, &daemon).await;

    let ghost = Value::object([
        ("name", Value::from("ghost")),
        ("modified_at", Value::from("2024-05-10T14:31:54-07:00")),
        ("size", Value::Int(1)),
        ("digest", Value::from("abc")),
    ]);
    let read = client
        .read_resource(proto::read_resource::Request {
            type_name: "ollama_model".to_string(),
            current_state: dynamic(&ghost),
            private: Vec::new(),
            provider_meta: None,
        })
        .await
        .unwrap()
        .into_inner();

    assert!(read.diagnostics.is_empty());
    assert!(value(read.new_state.as_ref()).is_null());
}

#[tokio::test]
async fn test_read_data_source() {
    let daemon = FakeOllama::start().await;
    daemon.install_named(&["llama2:latest", "mistral:7b"]);
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;
    configure(&mut client, &daemon).await;

    let response = client
        .read_data_source(proto::read_data_source::Request {
            type_name: "ollama_model".to_string(),
            config: dynamic(&Value::object([("models", Value::Null)])),
            provider_meta: None,
        })
        .await
        .unwrap()
        .into_inner();

    assert!(response.diagnostics.is_empty());
    let state = value(response.state.as_ref());
    let names: Vec<_> = state
        .get("models")
        .as_list()
        .unwrap()
        .iter()
        .map(|m| m.get("name").as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["llama2:latest", "mistral:7b"]);
}

#[tokio::test]
async fn test_unknown_type_names() {
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;

    let read = client
        .read_resource(proto::read_resource::Request {
            type_name: "ollama_widget".to_string(),
            current_state: dynamic(&Value::Null),
            private: Vec::new(),
            provider_meta: None,
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(summaries(&read.diagnostics), vec!["Resource Type Not Found"]);

    let data = client
        .read_data_source(proto::read_data_source::Request {
            type_name: "ollama_widget".to_string(),
            config: dynamic(&Value::Null),
            provider_meta: None,
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(summaries(&data.diagnostics), vec!["Data Source Type Not Found"]);
}

#[tokio::test]
async fn test_apply_before_configure_reports_unconfigured_provider() {
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;

    let config = model_config("llama2");
    let response = client
        .apply_resource_change(proto::apply_resource_change::Request {
            type_name: "ollama_model".to_string(),
            prior_state: dynamic(&Value::Null),
            planned_state: dynamic(&config),
            config: dynamic(&config),
            planned_private: Vec::new(),
            provider_meta: None,
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(summaries(&response.diagnostics), vec!["Unconfigured Provider"]);
}

#[tokio::test]
async fn test_import_by_name() {
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;

    let response = client
        .import_resource_state(proto::import_resource_state::Request {
            type_name: "ollama_model".to_string(),
            id: " llama2 ".to_string(),
        })
        .await
        .unwrap()
        .into_inner();

    assert!(response.diagnostics.is_empty());
    let imported = &response.imported_resources[0];
    assert_eq!(imported.type_name, "ollama_model");
    let state = value(imported.state.as_ref());
    assert_eq!(state.get("name"), &Value::from("llama2"));
    assert!(state.get("digest").is_null());

    let empty = client
        .import_resource_state(proto::import_resource_state::Request {
            type_name: "ollama_model".to_string(),
            id: "  ".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(empty.imported_resources.is_empty());
    assert_eq!(summaries(&empty.diagnostics), vec!["Missing Model Name"]);
}

#[tokio::test]
async fn test_upgrade_json_state() {
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;

    let raw = br#"{"name":"llama2","digest":"abc","size":42,"modified_at":null,"id":"dropped"}"#;
    let response = client
        .upgrade_resource_state(proto::upgrade_resource_state::Request {
            type_name: "ollama_model".to_string(),
            version: 0,
            raw_state: Some(proto::RawState {
                json: raw.to_vec(),
                flatmap: Default::default(),
            }),
        })
        .await
        .unwrap()
        .into_inner();

    assert!(response.diagnostics.is_empty());
    let state = value(response.upgraded_state.as_ref());
    assert_eq!(state.get("size"), &Value::Int(42));
    assert!(matches!(&state, Value::Object(attrs) if !attrs.contains_key("id")));

    let flatmap = client
        .upgrade_resource_state(proto::upgrade_resource_state::Request {
            type_name: "ollama_model".to_string(),
            version: 0,
            raw_state: Some(proto::RawState {
                json: Vec::new(),
                flatmap: [("name".to_string(), "llama2".to_string())].into(),
            }),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(summaries(&flatmap.diagnostics), vec!["Unsupported State Format"]);
}

#[tokio::test]
async fn test_controller_shutdown_stops_server() {
    let plugin = Plugin::start().await;
    let mut controller = GrpcControllerClient::connect(format!("http://{}", plugin.addr))
        .await
        .unwrap();

    controller.shutdown(Empty {}).await.unwrap();
    drop(controller);

    assert!(plugin.shutdown.is_cancelled());
    let result = tokio::time::timeout(Duration::from_secs(5), plugin.handle)
        .await
        .expect("server should stop after controller shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_validate_runs_before_configure() {
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;

    let provider = client
        .validate_provider_config(proto::validate_provider_config::Request {
            config: dynamic(&Value::object([("host", Value::Unknown)])),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(provider.diagnostics.is_empty(), "{:?}", provider.diagnostics);

    let resource = client
        .validate_resource_config(proto::validate_resource_config::Request {
            type_name: "ollama_model".to_string(),
            config: dynamic(&model_config("llama2")),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(resource.diagnostics.is_empty(), "{:?}", resource.diagnostics);

    let data = client
        .validate_data_resource_config(proto::validate_data_resource_config::Request {
            type_name: "ollama_widget".to_string(),
            config: dynamic(&Value::Null),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(summaries(&data.diagnostics), vec!["Data Source Type Not Found"]);
}

#[tokio::test]
async fn test_validate_rejects_malformed_config() {
    let plugin = Plugin::start().await;
    let mut client = plugin.client().await;

    // fixmap header promising one entry, then nothing
    let truncated = proto::DynamicValue {
        msgpack: vec![0x81],
        json: Vec::new(),
    };
    let response = client
        .validate_resource_config(proto::validate_resource_config::Request {
            type_name: "ollama_model".to_string(),
            config: Some(truncated),
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(
        response.diagnostics[0].severity,
        proto::diagnostic::Severity::Error as i32
    );
}
