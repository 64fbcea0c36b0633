//! Plugin process configuration and loading logic
//!
//! Terraform starts the plugin without arguments, so everything here is
//! optional: a TOML file named by `--config` or `TF_OLLAMA_PLUGIN_CONFIG`, then
//! `TF_OLLAMA_*` environment overrides. The daemon host itself is provider
//! configuration and is not part of this file.

use crate::ollama::ClientSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "TF_OLLAMA_PLUGIN_CONFIG";

/// Main plugin configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Per-request timeout for daemon calls; none means wait until cancelled
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    /// Max gRPC message size in both directions
    pub max_message_size_mb: usize,
    /// Registry address reported in `--debug` reattach output
    pub provider_address: String,
    /// Serve gRPC reflection alongside the provider service
    pub reflection: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: None,
            connect_timeout_secs: None,
            max_message_size_mb: default_max_message_size_mb(),
            provider_address: default_provider_address(),
            reflection: false,
        }
    }
}

impl PluginConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Load using `env` as the environment lookup
    pub fn load_with_env<F>(path: Option<PathBuf>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = path.or_else(|| env(CONFIG_PATH_ENV).map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        // Environment variable overrides
        if let Some(timeout) = env("TF_OLLAMA_REQUEST_TIMEOUT") {
            config.request_timeout_secs = Some(
                timeout
                    .parse()
                    .context("Invalid TF_OLLAMA_REQUEST_TIMEOUT value")?,
            );
        }
        if let Some(timeout) = env("TF_OLLAMA_CONNECT_TIMEOUT") {
            config.connect_timeout_secs = Some(
                timeout
                    .parse()
                    .context("Invalid TF_OLLAMA_CONNECT_TIMEOUT value")?,
            );
        }
        if let Some(size) = env("TF_OLLAMA_MAX_MESSAGE_SIZE_MB") {
            config.max_message_size_mb = size
                .parse()
                .context("Invalid TF_OLLAMA_MAX_MESSAGE_SIZE_MB value")?;
        }
        if let Some(address) = env("TF_OLLAMA_PROVIDER_ADDRESS") {
            config.provider_address = address;
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).context("Failed to parse TOML config")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == Some(0) {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }
        if self.connect_timeout_secs == Some(0) {
            anyhow::bail!("connect_timeout_secs must be greater than 0");
        }
        if !(1..=2048).contains(&self.max_message_size_mb) {
            anyhow::bail!(
                "max_message_size_mb must be between 1 and 2048 (got {})",
                self.max_message_size_mb
            );
        }

        let segments: Vec<&str> = self.provider_address.split('/').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            anyhow::bail!(
                "provider_address must look like host/namespace/type (got {:?})",
                self.provider_address
            );
        }

        Ok(())
    }

    /// Max gRPC message size in bytes
    pub fn max_message_size(&self) -> usize {
        self.max_message_size_mb * 1024 * 1024
    }

    /// Transport settings for daemon clients
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
        }
    }
}

// Default functions
fn default_max_message_size_mb() -> usize {
    256
}
fn default_provider_address() -> String {
    "registry.terraform.io/ollama/ollama".to_string()
}
