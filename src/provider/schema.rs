//! Schema declarations for the provider, the model resource and the model list data source

use crate::framework::{Attribute, ElementType, Schema};

pub fn provider_schema() -> Schema {
    Schema::new("Interact with a local or remote Ollama daemon.").with_attribute(
        "host",
        Attribute::string()
            .required()
            .description("Ollama host"),
    )
}

pub fn model_resource_schema() -> Schema {
    Schema::new(
        "Manages an individual Ollama model, allowing for configuration and tracking of specific models.",
    )
    .with_attribute(
        "name",
        Attribute::string().required().description(
            "The unique name of the Ollama model. This name is used to identify and manage the model within the system.",
        ),
    )
    .with_attribute(
        "modified_at",
        Attribute::string().optional().computed().description(
            "The timestamp when the Ollama model was last modified. This attribute can be used to track updates.",
        ),
    )
    .with_attribute(
        "size",
        Attribute::int64().optional().computed().description(
            "The size of the Ollama model in bytes. This attribute provides information about the model's storage requirements.",
        ),
    )
    .with_attribute(
        "digest",
        Attribute::string().optional().computed().description(
            "A digest or checksum that uniquely identifies the specific version of the Ollama model.",
        ),
    )
}

fn details_attribute() -> Attribute {
    Attribute::single_nested([
        (
            "format",
            Attribute::string()
                .computed()
                .description("The format of the Ollama model (e.g., GGUF)."),
        ),
        (
            "family",
            Attribute::string()
                .computed()
                .description("The family category to which the Ollama model belongs."),
        ),
        (
            "families",
            Attribute::list(ElementType::String)
                .computed()
                .description("A list of family categories associated with the Ollama model."),
        ),
        (
            "parameter_size",
            Attribute::string()
                .computed()
                .description("The size of the parameters within the Ollama model."),
        ),
        (
            "quantization_level",
            Attribute::string().computed().description(
                "The level of quantization applied to the Ollama model, affecting its precision and size.",
            ),
        ),
    ])
    .computed()
    .description("Detailed attributes of the Ollama model, including format and family.")
}

pub fn model_data_source_schema() -> Schema {
    Schema::new("Provides a list of available Ollama models and their details.").with_attribute(
        "models",
        Attribute::list_nested([
            (
                "name",
                Attribute::string()
                    .computed()
                    .description("The name of the Ollama model."),
            ),
            (
                "modified_at",
                Attribute::string()
                    .computed()
                    .description("The date and time when the Ollama model was last modified."),
            ),
            (
                "size",
                Attribute::int64()
                    .computed()
                    .description("The size of the Ollama model in bytes."),
            ),
            (
                "digest",
                Attribute::string().computed().description(
                    "A unique identifier (digest) for the version of the Ollama model.",
                ),
            ),
            ("details", details_attribute()),
        ])
        .computed()
        .description(
            "A list of Ollama models, each representing a distinct machine learning model.",
        ),
    )
}
