// ============================================================================
// Dynamic value model for shapeless decoding
// ============================================================================
//
// When no object shape is known, documents decode into `Value` trees.
// Object members keep insertion order; keys are shared `Arc<str>` so the
// interning cache can deduplicate them across parses.

use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A decoded JSON value.
///
/// Integers keep their parsed width: `Int` for anything that fits `i64`,
/// `UInt` for larger positive values, `Float` for everything with a
/// fraction or exponent (and for integers too large for either).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Vec<(Arc<str>, Value)>),
}

impl Value {
    /// Member lookup on objects; `None` on every other variant.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(members) => members
                .iter()
                .find(|(k, _)| &**k == key)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::UInt(u) => serializer.serialize_u64(*u),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(members) => {
                let mut map = serializer.serialize_map(Some(members.len()))?;
                for (key, value) in members {
                    map.serialize_entry(&**key, value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::Object(vec![
            (Arc::from("id"), Value::Int(1)),
            (Arc::from("name"), Value::Str("Ann".into())),
            (Arc::from("tags"), Value::Array(vec![Value::Bool(true), Value::Null])),
        ])
    }

    #[test]
    fn test_accessors() {
        let v = sample();
        assert_eq!(v.get("id").and_then(Value::as_i64), Some(1));
        assert_eq!(v.get("name").and_then(Value::as_str), Some("Ann"));
        assert!(v.get("missing").is_none());
        assert!(Value::Null.is_null());
        assert_eq!(Value::UInt(7).as_i64(), Some(7));
        assert_eq!(Value::UInt(u64::MAX).as_i64(), None);
    }

    #[test]
    fn test_serde_serialize() {
        let rendered = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            rendered,
            "{\"id\":1,\"name\":\"Ann\",\"tags\":[true,null]}"
        );
    }
}
