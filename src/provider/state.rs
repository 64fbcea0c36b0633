//! Resource and data source state models and their value mapping

use crate::framework::{CodecError, Field, Value};
use crate::ollama::{ListModel, ModelDetails};
use chrono::{DateTime, FixedOffset, SecondsFormat};

/// State of one `ollama_model` resource
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelResourceModel {
    pub name: String,
    pub modified_at: Field<String>,
    pub size: Field<i64>,
    pub digest: Field<String>,
}

/// Daemon-sourced attributes of an installed model
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Observation {
    pub modified_at: Option<String>,
    pub size: Option<i64>,
    pub digest: Option<String>,
}

impl ModelResourceModel {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, CodecError> {
        let name = match Field::<String>::from_value(value.get("name"))? {
            Field::Known(name) => name,
            _ => {
                return Err(CodecError::Unsupported(
                    "model name must be known".to_string(),
                ));
            }
        };
        Ok(Self {
            name,
            modified_at: Field::from_value(value.get("modified_at"))?,
            size: Field::from_value(value.get("size"))?,
            digest: Field::from_value(value.get("digest"))?,
        })
    }

    pub fn to_value(&self) -> Value {
        Value::object([
            ("name", Value::from(self.name.as_str())),
            ("modified_at", Value::from(self.modified_at.clone())),
            ("size", Value::from(self.size.clone())),
            ("digest", Value::from(self.digest.clone())),
        ])
    }

    /// Fill unknown attributes from an observation, keeping known and null ones
    pub fn resolve(self, observation: Option<&Observation>) -> Self {
        let observation = observation.cloned().unwrap_or_default();
        Self {
            name: self.name,
            modified_at: self.modified_at.resolve(observation.modified_at),
            size: self.size.resolve(observation.size),
            digest: self.digest.resolve(observation.digest),
        }
    }

    /// Overwrite every daemon-sourced attribute from a fresh observation
    pub fn refresh(self, observation: &Observation) -> Self {
        Self {
            name: self.name,
            modified_at: observation.modified_at.clone().into(),
            size: observation.size.into(),
            digest: observation.digest.clone().into(),
        }
    }

    pub fn has_unknowns(&self) -> bool {
        self.modified_at.is_unknown() || self.size.is_unknown() || self.digest.is_unknown()
    }
}

/// Timestamps are reported as RFC 3339 with the daemon's own offset
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl Observation {
    /// Combine `show`'s timestamp with the matching list entry.
    /// The list entry is authoritative when both are present.
    pub fn new(
        show_modified_at: Option<&DateTime<FixedOffset>>,
        entry: Option<&ListModel>,
    ) -> Self {
        let modified_at = entry
            .map(|e| &e.modified_at)
            .or(show_modified_at)
            .map(format_timestamp);
        Self {
            modified_at,
            size: entry.map(|e| e.size),
            digest: entry.map(|e| e.digest.clone()),
        }
    }
}

fn details_value(details: &ModelDetails) -> Value {
    Value::object([
        ("format", Value::from(details.format.as_str())),
        ("family", Value::from(details.family.as_str())),
        ("families", Value::from(details.families.clone())),
        ("parameter_size", Value::from(details.parameter_size.as_str())),
        (
            "quantization_level",
            Value::from(details.quantization_level.as_str()),
        ),
    ])
}

/// One element of the data source's `models` list
pub fn model_entry_value(model: &ListModel) -> Value {
    Value::object([
        ("name", Value::from(model.name.as_str())),
        ("modified_at", Value::from(format_timestamp(&model.modified_at))),
        ("size", Value::from(model.size)),
        ("digest", Value::from(model.digest.as_str())),
        ("details", details_value(&model.details)),
    ])
}

/// Data source state: models in daemon order
pub fn model_list_value(models: &[ListModel]) -> Value {
    Value::object([(
        "models",
        Value::List(models.iter().map(model_entry_value).collect()),
    )])
}
