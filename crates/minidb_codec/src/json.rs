//! Conversion between [`Value`] and `serde_json::Value`.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde_json::{Map, Number};

impl Value {
    /// Converts a JSON value.
    ///
    /// Objects become text-keyed maps in canonical order. Numbers become
    /// integers when they fit in an `i64` and floats otherwise.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                // u64 above i64::MAX, or a float. serde_json never holds NaN.
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v))),
            ),
        }
    }

    /// Converts this value to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedType`] for byte strings, non-text map
    /// keys and non-finite floats, none of which JSON can carry.
    pub fn to_json(&self) -> CodecResult<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(n) => serde_json::Value::Number(Number::from(*n)),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| CodecError::unsupported_type(format!("float {f} in JSON")))?,
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(_) => return Err(CodecError::unsupported_type("bytes in JSON")),
            Value::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<CodecResult<Vec<_>>>()?,
            ),
            Value::Map(pairs) => {
                let mut fields = Map::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = k.as_text().ok_or_else(|| {
                        CodecError::unsupported_type(format!("{} map key in JSON", k.type_name()))
                    })?;
                    fields.insert(key.to_string(), v.to_json()?);
                }
                serde_json::Value::Object(fields)
            }
        })
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(&json)
    }
}
