//! Terraform provider for Ollama
//!
//! A Terraform plugin that manages the models installed on an Ollama daemon:
//! an `ollama_model` resource that pulls, refreshes, renames and deletes one
//! model, and an `ollama_model` data source listing every installed model.

pub mod config;
pub mod error;
pub mod framework;
pub mod grpc;
pub mod ollama;
pub mod provider;
pub mod registry;

pub use config::PluginConfig;
pub use error::{Operation, ProviderError, ProviderResult};
pub use ollama::{ClientError, ModelApi, OllamaClient};
pub use provider::{ClientHandle, OllamaProvider};
pub use registry::LockRegistry;
