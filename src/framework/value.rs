//! Dynamic attribute values exchanged with the host
//!
//! Terraform encodes configuration, plans and state as cty values in msgpack.
//! [`Value`] is the schema-less in-memory form of those values; [`Field`] is the
//! typed view that resource models decode into.

use std::collections::BTreeMap;
use thiserror::Error;

/// msgpack extension code cty uses for unknown values
const UNKNOWN_EXT: i8 = 0;
/// msgpack extension code for unknown values carrying refinements
const REFINED_UNKNOWN_EXT: i8 = 12;

static NULL: Value = Value::Null;

/// Value encoding errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid msgpack value: {0}")]
    Msgpack(String),

    #[error("invalid JSON value: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported value: {0}")]
    Unsupported(String),

    #[error("expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },
}

/// A dynamically typed attribute value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    /// Value not known until apply
    Unknown,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Build an object value from `(name, value)` pairs
    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// True when neither this value nor anything nested in it is unknown
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Self::Unknown => false,
            Self::List(items) => items.iter().all(Value::is_wholly_known),
            Self::Object(attrs) => attrs.values().all(Value::is_wholly_known),
            _ => true,
        }
    }

    /// Attribute lookup; missing attributes and non-objects read as null
    pub fn get(&self, name: &str) -> &Value {
        match self {
            Self::Object(attrs) => attrs.get(name).unwrap_or(&NULL),
            _ => &NULL,
        }
    }

    /// Set an attribute on an object value. Returns false for non-objects.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> bool {
        match self {
            Self::Object(attrs) => {
                attrs.insert(name.into(), value);
                true
            }
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Name of the value kind, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Unknown => "unknown",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::Float(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
        }
    }

    /// Copy of the value with every unknown replaced by null
    pub fn unknowns_to_null(&self) -> Value {
        match self {
            Self::Unknown => Self::Null,
            Self::List(items) => Self::List(items.iter().map(Value::unknowns_to_null).collect()),
            Self::Object(attrs) => Self::Object(
                attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.unknowns_to_null()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // msgpack
    // ------------------------------------------------------------------------

    /// Decode a cty msgpack payload. An empty payload decodes to null.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.is_empty() {
            return Ok(Self::Null);
        }
        let mut reader = bytes;
        let raw = rmpv::decode::read_value(&mut reader)
            .map_err(|e| CodecError::Msgpack(e.to_string()))?;
        Self::from_rmpv(raw)
    }

    /// Encode as a cty msgpack payload
    pub fn to_msgpack(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &self.to_rmpv())
            .map_err(|e| CodecError::Msgpack(e.to_string()))?;
        Ok(buf)
    }

    fn from_rmpv(raw: rmpv::Value) -> Result<Self, CodecError> {
        Ok(match raw {
            rmpv::Value::Nil => Self::Null,
            rmpv::Value::Boolean(b) => Self::Bool(b),
            rmpv::Value::Integer(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::MAX)),
            },
            rmpv::Value::F32(f) => Self::Float(f as f64),
            rmpv::Value::F64(f) => Self::Float(f),
            rmpv::Value::String(s) => match s.into_str() {
                Some(s) => Self::String(s),
                None => return Err(CodecError::Unsupported("non UTF-8 string".to_string())),
            },
            rmpv::Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(Self::from_rmpv)
                    .collect::<Result<_, _>>()?,
            ),
            rmpv::Value::Map(entries) => {
                let mut attrs = BTreeMap::new();
                for (key, value) in entries {
                    let key = match key {
                        rmpv::Value::String(s) => s.into_str().ok_or_else(|| {
                            CodecError::Unsupported("non UTF-8 attribute name".to_string())
                        })?,
                        other => {
                            return Err(CodecError::Unsupported(format!(
                                "attribute name of type {:?}",
                                other
                            )));
                        }
                    };
                    attrs.insert(key, Self::from_rmpv(value)?);
                }
                Self::Object(attrs)
            }
            rmpv::Value::Ext(code, _) if code == UNKNOWN_EXT || code == REFINED_UNKNOWN_EXT => {
                Self::Unknown
            }
            rmpv::Value::Ext(code, _) => {
                return Err(CodecError::Unsupported(format!(
                    "msgpack extension type {}",
                    code
                )));
            }
            rmpv::Value::Binary(_) => {
                return Err(CodecError::Unsupported("binary value".to_string()));
            }
        })
    }

    fn to_rmpv(&self) -> rmpv::Value {
        match self {
            Self::Null => rmpv::Value::Nil,
            // fixext1 with type 0, matching cty's own encoding
            Self::Unknown => rmpv::Value::Ext(UNKNOWN_EXT, vec![0]),
            Self::Bool(b) => rmpv::Value::Boolean(*b),
            Self::Int(n) => rmpv::Value::from(*n),
            Self::Float(f) => rmpv::Value::F64(*f),
            Self::String(s) => rmpv::Value::from(s.as_str()),
            Self::List(items) => rmpv::Value::Array(items.iter().map(Value::to_rmpv).collect()),
            Self::Object(attrs) => rmpv::Value::Map(
                attrs
                    .iter()
                    .map(|(k, v)| (rmpv::Value::from(k.as_str()), v.to_rmpv()))
                    .collect(),
            ),
        }
    }

    // ------------------------------------------------------------------------
    // JSON
    // ------------------------------------------------------------------------

    /// Decode a JSON document (stored state, JSON-encoded dynamic values)
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.is_empty() {
            return Ok(Self::Null);
        }
        let json: serde_json::Value = serde_json::from_slice(bytes)?;
        Ok(Self::from(json))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::MAX)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(attrs) => {
                Self::Object(attrs.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

// ============================================================================
// Typed fields
// ============================================================================

/// Conversion from a known, non-null [`Value`]
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, CodecError>;
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        value.as_str().map(str::to_string).ok_or(CodecError::Type {
            expected: "string",
            found: value.kind(),
        })
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        value.as_i64().ok_or(CodecError::Type {
            expected: "integer",
            found: value.kind(),
        })
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        value
            .as_list()
            .ok_or(CodecError::Type {
                expected: "list",
                found: value.kind(),
            })?
            .iter()
            .map(T::from_value)
            .collect()
    }
}

/// Typed attribute that may also be null or unknown
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field<T> {
    #[default]
    Null,
    Unknown,
    Known(T),
}

impl<T> Field<T> {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(v) => Some(v),
            _ => None,
        }
    }

    /// Resolve an unknown field from an observed value; known and null fields are kept
    pub fn resolve(self, observed: Option<T>) -> Self {
        match self {
            Self::Unknown => observed.map_or(Self::Null, Self::Known),
            other => other,
        }
    }
}

impl<T: FromValue> Field<T> {
    pub fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Unknown => Ok(Self::Unknown),
            known => T::from_value(known).map(Self::Known),
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Self::Known)
    }
}

impl<T: Into<Value>> From<Field<T>> for Value {
    fn from(field: Field<T>) -> Self {
        match field {
            Field::Null => Value::Null,
            Field::Unknown => Value::Unknown,
            Field::Known(v) => v.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::object([
            ("name", Value::from("llama2")),
            ("size", Value::from(3_826_793_677i64)),
            ("digest", Value::Unknown),
            ("modified_at", Value::Null),
            (
                "families",
                Value::from(vec!["llama".to_string(), "clip".to_string()]),
            ),
        ])
    }

    #[test]
    fn test_unknown_uses_cty_extension_bytes() {
        assert_eq!(Value::Unknown.to_msgpack().unwrap(), vec![0xd4, 0x00, 0x00]);
        assert_eq!(Value::Null.to_msgpack().unwrap(), vec![0xc0]);
    }

    #[test]
    fn test_decode_refined_unknown() {
        // fixext1, type 12
        let value = Value::from_msgpack(&[0xd4, 0x0c, 0x00]).unwrap();
        assert!(value.is_unknown());
    }

    #[test]
    fn test_empty_payload_is_null() {
        assert!(Value::from_msgpack(&[]).unwrap().is_null());
        assert!(Value::from_json_slice(&[]).unwrap().is_null());
    }

    #[test]
    fn test_msgpack_preserves_object() {
        let value = sample();
        let bytes = value.to_msgpack().unwrap();
        assert_eq!(Value::from_msgpack(&bytes).unwrap(), value);
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let err = Value::from_msgpack(&[0xd4, 0x05, 0x00]).unwrap_err();
        assert!(matches!(err, CodecError::Unsupported(_)));
    }

    #[test]
    fn test_json_numbers() {
        let value = Value::from_json_slice(br#"{"size": 42, "ratio": 0.5}"#).unwrap();
        assert_eq!(value.get("size"), &Value::Int(42));
        assert_eq!(value.get("ratio"), &Value::Float(0.5));
        assert!(value.get("missing").is_null());
    }

    #[test]
    fn test_wholly_known() {
        assert!(!sample().is_wholly_known());
        assert!(sample().unknowns_to_null().is_wholly_known());
    }

    #[test]
    fn test_field_decoding() {
        let value = sample();
        assert_eq!(
            Field::<String>::from_value(value.get("name")).unwrap(),
            Field::Known("llama2".to_string())
        );
        assert!(Field::<String>::from_value(value.get("digest")).unwrap().is_unknown());
        assert!(Field::<String>::from_value(value.get("modified_at")).unwrap().is_null());
        assert_eq!(
            Field::<Vec<String>>::from_value(value.get("families")).unwrap(),
            Field::Known(vec!["llama".to_string(), "clip".to_string()])
        );
        assert!(Field::<i64>::from_value(value.get("name")).is_err());
    }

    #[test]
    fn test_integral_float_reads_as_int() {
        assert_eq!(Value::Float(1024.0).as_i64(), Some(1024));
        assert_eq!(Value::Float(1.5).as_i64(), None);
    }

    #[test]
    fn test_field_resolve() {
        assert_eq!(Field::<i64>::Unknown.resolve(Some(7)), Field::Known(7));
        assert_eq!(Field::<i64>::Unknown.resolve(None), Field::Null);
        assert_eq!(Field::Known(1i64).resolve(Some(7)), Field::Known(1));
        assert_eq!(Field::<i64>::Null.resolve(Some(7)), Field::Null);
    }
}
