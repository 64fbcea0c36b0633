//! Provider error types and their translation into host diagnostics

use crate::framework::{AttributePath, CodecError, Diagnostic};
use crate::ollama::ClientError;
use std::fmt;
use thiserror::Error;

/// Daemon operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Show,
    Pull,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => write!(f, "list"),
            Self::Show => write!(f, "show"),
            Self::Pull => write!(f, "pull"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Main error type for provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Configured host is not known yet at this stage of the plan
    #[error("host is unknown")]
    HostUnknown,

    /// Neither configuration nor environment yields a host
    #[error("host is missing")]
    HostMissing,

    /// Host could not be turned into a daemon client
    #[error("invalid host {host:?}: {source}")]
    InvalidHost {
        host: String,
        #[source]
        source: ClientError,
    },

    /// The daemon rejected or failed an operation
    #[error("{operation} failed{}: {source}", for_model(.model))]
    Upstream {
        operation: Operation,
        model: Option<String>,
        #[source]
        source: ClientError,
    },

    /// A value could not be decoded into the expected model
    #[error("invalid {what}: {source}")]
    Codec {
        what: &'static str,
        #[source]
        source: CodecError,
    },
}

pub type ProviderResult<T> = Result<T, ProviderError>;

fn for_model(model: &Option<String>) -> String {
    model
        .as_ref()
        .map(|m| format!(" for model {}", m))
        .unwrap_or_default()
}

impl ProviderError {
    pub fn upstream(operation: Operation, model: Option<&str>, source: ClientError) -> Self {
        Self::Upstream {
            operation,
            model: model.map(str::to_string),
            source,
        }
    }

    pub fn codec(what: &'static str, source: CodecError) -> Self {
        Self::Codec { what, source }
    }

    /// Daemon reported the model as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Upstream { source, .. } if source.is_not_found())
    }

    /// Translate into the diagnostic reported to the host
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::HostUnknown => Diagnostic::error(
                "Unknown Ollama API Host",
                "The provider cannot create the Ollama API client as there is an unknown \
                 configuration value for the Ollama API host. Either target apply the source \
                 of the value first, set the value statically in the configuration, or use \
                 the OLLAMA_HOST environment variable.",
            )
            .at(AttributePath::root("host")),
            Self::HostMissing => Diagnostic::error(
                "Missing Ollama API Host",
                "The provider cannot create the Ollama API client as there is a missing or \
                 empty value for the Ollama API host. Set the host value in the configuration \
                 or use the OLLAMA_HOST environment variable. If either is already set, \
                 ensure the value is not empty.",
            )
            .at(AttributePath::root("host")),
            Self::InvalidHost { host, source } => Diagnostic::error(
                "Error creating ollama client",
                format!(
                    "The provider cannot create the Ollama API client for host {:?}: {}",
                    host, source
                ),
            )
            .at(AttributePath::root("host")),
            Self::Upstream {
                operation,
                model,
                source,
            } => {
                let model = model.as_deref().unwrap_or_default();
                match operation {
                    Operation::List => Diagnostic::error(
                        "Client Error",
                        format!("Unable to read ollama models, got error: {}", source),
                    ),
                    Operation::Show => Diagnostic::error(
                        "Error Reading Ollama Model",
                        format!("Could not read ollama model {}: {}", model, source),
                    ),
                    Operation::Pull => Diagnostic::error(
                        "Error pulling model",
                        format!(
                            "Could not pull model {}, unexpected error: {}",
                            model, source
                        ),
                    ),
                    Operation::Delete => Diagnostic::error(
                        "Error deleting Ollama Model",
                        format!("Could not delete ollama model {}: {}", model, source),
                    ),
                }
            }
            Self::Codec { what, source } => Diagnostic::error(
                "Value Conversion Error",
                format!(
                    "Could not convert {}: {}. Please report this issue to the provider developers.",
                    what, source
                ),
            ),
        }
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        err.to_diagnostic()
    }
}
