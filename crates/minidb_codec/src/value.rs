//! Dynamic value type stored in MiniDB.

use crate::encoder::to_canonical_cbor;
use std::cmp::Ordering;

/// Whether a value is a scalar or a structured document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Null, boolean, number, text or byte string.
    Scalar,
    /// Array or map.
    Document,
}

impl ValueKind {
    /// Returns a lowercase name for diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Document => "document",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A schemaless value.
///
/// Scalars and documents share one keyspace, so the type carries its own tag.
/// The encoded form is CBOR and the variant maps one-to-one onto a CBOR
/// major type (floats onto the double-precision simple value).
///
/// Floats must be finite to be encodable. `Value` is therefore `PartialEq`
/// but not `Eq`. Maps compare equal regardless of pair order, as their
/// encodings do.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Finite double-precision float.
    Float(f64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string (UTF-8).
    Text(String),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Map of key-value pairs.
    ///
    /// Pairs may be in any order; the encoder writes them in canonical key
    /// order and the decoder returns them that way.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Create a map value with keys in canonical order.
    ///
    /// Maps built this way compare equal to their decoded form.
    pub fn map(mut pairs: Vec<(Value, Value)>) -> Self {
        pairs.sort_by_cached_key(|(k, _)| sort_key(k));
        Value::Map(pairs)
    }

    /// Create a map with text keys, the shape of a JSON object.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::map(
            fields
                .into_iter()
                .map(|(k, v)| (Value::Text(k.into()), v))
                .collect(),
        )
    }

    /// Returns this value with every nested map in canonical key order and
    /// `-0.0` folded into `0.0`.
    ///
    /// The result is the value [`crate::from_cbor`] would return for its
    /// encoding.
    #[must_use]
    pub fn canonicalize(self) -> Self {
        match self {
            Value::Array(items) => Value::Array(items.into_iter().map(Self::canonicalize).collect()),
            Value::Map(pairs) => Self::map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.canonicalize(), v.canonicalize()))
                    .collect(),
            ),
            Value::Float(f) if f == 0.0 => Value::Float(0.0),
            other => other,
        }
    }

    /// Returns whether this value is a scalar or a document.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Array(_) | Value::Map(_) => ValueKind::Document,
            _ => ValueKind::Scalar,
        }
    }

    /// Returns true for arrays and maps.
    #[must_use]
    pub fn is_document(&self) -> bool {
        self.kind() == ValueKind::Document
    }

    /// Short type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Compare two values by the order of their canonical encodings.
    ///
    /// Length of the encoding first, then bytewise. This is the order map
    /// keys are written in. Values that cannot be encoded sort last.
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        sort_key(self).cmp(&sort_key(other))
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float. Integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a text key in this map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs
                .iter()
                .find(|(k, _)| k.as_text() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Bit pattern written for a float, with `-0.0` folded into `0.0`.
pub(crate) fn canonical_float_bits(f: f64) -> u64 {
    if f == 0.0 {
        0
    } else {
        f.to_bits()
    }
}

/// `(unencodable, encoded length, encoded bytes)`, ordered lexicographically.
fn sort_key(value: &Value) -> (bool, usize, Vec<u8>) {
    match to_canonical_cbor(value) {
        Ok(bytes) => (false, bytes.len(), bytes),
        Err(_) => (true, 0, Vec::new()),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => maps_equal(a, b),
            _ => false,
        }
    }
}

/// Compares two maps as sets of pairs.
fn maps_equal(a: &[(Value, Value)], b: &[(Value, Value)]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if a.iter().zip(b).all(|(x, y)| x == y) {
        return true;
    }

    sorted_pairs(a)
        .into_iter()
        .zip(sorted_pairs(b))
        .all(|(x, y)| x == y)
}

fn sorted_pairs(pairs: &[(Value, Value)]) -> Vec<&(Value, Value)> {
    let mut refs: Vec<&(Value, Value)> = pairs.iter().collect();
    refs.sort_by_cached_key(|(k, _)| sort_key(k));
    refs
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}
