//! Schema declarations for providers, resources and data sources

use super::value::Value;
use std::collections::BTreeMap;

/// Element type of a primitive list attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    String,
}

impl ElementType {
    fn cty_name(self) -> &'static str {
        match self {
            Self::String => "string",
        }
    }
}

/// Shape of an attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    String,
    Int64,
    List(ElementType),
    /// A single nested object
    SingleNested(BTreeMap<String, Attribute>),
    /// A list of nested objects
    ListNested(BTreeMap<String, Attribute>),
}

/// A schema attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub kind: AttributeKind,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
}

impl Attribute {
    fn new(kind: AttributeKind) -> Self {
        Self {
            kind,
            description: String::new(),
            required: false,
            optional: false,
            computed: false,
        }
    }

    pub fn string() -> Self {
        Self::new(AttributeKind::String)
    }

    pub fn int64() -> Self {
        Self::new(AttributeKind::Int64)
    }

    pub fn list(element: ElementType) -> Self {
        Self::new(AttributeKind::List(element))
    }

    pub fn single_nested<I, K>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Attribute)>,
        K: Into<String>,
    {
        Self::new(AttributeKind::SingleNested(collect_attributes(attributes)))
    }

    pub fn list_nested<I, K>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Attribute)>,
        K: Into<String>,
    {
        Self::new(AttributeKind::ListNested(collect_attributes(attributes)))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// cty type of a non-nested attribute as JSON (`"string"`, `["list","string"]`).
    /// Nested attributes carry their type in the nested object instead.
    pub fn cty_type(&self) -> Option<serde_json::Value> {
        match &self.kind {
            AttributeKind::String => Some(serde_json::json!("string")),
            AttributeKind::Int64 => Some(serde_json::json!("number")),
            AttributeKind::List(element) => Some(serde_json::json!(["list", element.cty_name()])),
            AttributeKind::SingleNested(_) | AttributeKind::ListNested(_) => None,
        }
    }

    /// Normalize `value` to this attribute's shape
    pub fn conform(&self, value: &Value) -> Value {
        match (value, &self.kind) {
            (Value::Null, _) => Value::Null,
            (Value::Unknown, _) => Value::Unknown,
            (Value::String(s), AttributeKind::Int64) => {
                s.parse::<i64>().map(Value::Int).unwrap_or(Value::Null)
            }
            (v, AttributeKind::Int64) => v.as_i64().map(Value::Int).unwrap_or_else(|| v.clone()),
            (Value::Object(_), AttributeKind::SingleNested(attrs)) => conform_object(attrs, value),
            (Value::List(items), AttributeKind::ListNested(attrs)) => Value::List(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Unknown => Value::Unknown,
                        other => conform_object(attrs, other),
                    })
                    .collect(),
            ),
            (v, _) => v.clone(),
        }
    }
}

fn collect_attributes<I, K>(attributes: I) -> BTreeMap<String, Attribute>
where
    I: IntoIterator<Item = (K, Attribute)>,
    K: Into<String>,
{
    attributes.into_iter().map(|(k, a)| (k.into(), a)).collect()
}

fn conform_object(attributes: &BTreeMap<String, Attribute>, value: &Value) -> Value {
    if value.is_unknown() {
        return Value::Unknown;
    }
    Value::Object(
        attributes
            .iter()
            .map(|(name, attr)| (name.clone(), attr.conform(value.get(name))))
            .collect(),
    )
}

/// Top-level schema of a provider, resource or data source
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub version: i64,
    pub description: String,
    pub attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            version: 0,
            description: description.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Normalize a value to the full object shape of this schema.
    ///
    /// Every declared attribute is present in the result (absent ones become
    /// null) and undeclared attributes are dropped. A null value stays null.
    pub fn conform(&self, value: &Value) -> Value {
        match value {
            Value::Null => Value::Null,
            other => conform_object(&self.attributes, other),
        }
    }
}
