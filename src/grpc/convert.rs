//! Conversions between framework types and tfplugin6 messages

use super::proto::tfplugin6 as proto;
use crate::framework::{
    Attribute, AttributeKind, AttributePath, CodecError, Diagnostic, Diagnostics, Schema, Severity,
    Value, diagnostics::PathStep,
};
use std::collections::BTreeMap;

/// Decode a dynamic value, preferring msgpack and falling back to JSON
pub fn decode_dynamic(value: Option<&proto::DynamicValue>) -> Result<Value, CodecError> {
    match value {
        None => Ok(Value::Null),
        Some(dv) if !dv.msgpack.is_empty() => Value::from_msgpack(&dv.msgpack),
        Some(dv) => Value::from_json_slice(&dv.json),
    }
}

pub fn encode_dynamic(value: &Value) -> Result<proto::DynamicValue, CodecError> {
    Ok(proto::DynamicValue {
        msgpack: value.to_msgpack()?,
        json: Vec::new(),
    })
}

fn path_to_proto(path: &AttributePath) -> proto::AttributePath {
    use proto::attribute_path::step::Selector;

    proto::AttributePath {
        steps: path
            .steps()
            .iter()
            .map(|step| proto::attribute_path::Step {
                selector: Some(match step {
                    PathStep::Attribute(name) => Selector::AttributeName(name.clone()),
                    PathStep::ElementKeyString(key) => Selector::ElementKeyString(key.clone()),
                    PathStep::ElementKeyInt(index) => Selector::ElementKeyInt(*index),
                }),
            })
            .collect(),
    }
}

pub fn diagnostic_to_proto(diagnostic: &Diagnostic) -> proto::Diagnostic {
    let severity = match diagnostic.severity {
        Severity::Error => proto::diagnostic::Severity::Error,
        Severity::Warning => proto::diagnostic::Severity::Warning,
    };
    proto::Diagnostic {
        severity: severity as i32,
        summary: diagnostic.summary.clone(),
        detail: diagnostic.detail.clone(),
        attribute: diagnostic.attribute.as_ref().map(path_to_proto),
    }
}

pub fn diagnostics_to_proto(diagnostics: &Diagnostics) -> Vec<proto::Diagnostic> {
    diagnostics.iter().map(diagnostic_to_proto).collect()
}

fn nested_object(
    attributes: &BTreeMap<String, Attribute>,
    nesting: proto::schema::object::NestingMode,
) -> proto::schema::Object {
    proto::schema::Object {
        attributes: attributes
            .iter()
            .map(|(name, attr)| attribute_to_proto(name, attr))
            .collect(),
        nesting: nesting as i32,
    }
}

fn attribute_to_proto(name: &str, attr: &Attribute) -> proto::schema::Attribute {
    use proto::schema::object::NestingMode;

    let nested_type = match &attr.kind {
        AttributeKind::SingleNested(attrs) => Some(nested_object(attrs, NestingMode::Single)),
        AttributeKind::ListNested(attrs) => Some(nested_object(attrs, NestingMode::List)),
        _ => None,
    };
    let r#type = attr
        .cty_type()
        .map(|t| t.to_string().into_bytes())
        .unwrap_or_default();

    proto::schema::Attribute {
        name: name.to_string(),
        r#type,
        nested_type,
        description: attr.description.clone(),
        required: attr.required,
        optional: attr.optional,
        computed: attr.computed,
        sensitive: false,
        description_kind: proto::StringKind::Plain as i32,
        deprecated: false,
    }
}

pub fn schema_to_proto(schema: &Schema) -> proto::Schema {
    proto::Schema {
        version: schema.version,
        block: Some(proto::schema::Block {
            version: schema.version,
            attributes: schema
                .attributes
                .iter()
                .map(|(name, attr)| attribute_to_proto(name, attr))
                .collect(),
            block_types: Vec::new(),
            description: schema.description.clone(),
            description_kind: proto::StringKind::Plain as i32,
            deprecated: false,
        }),
    }
}
