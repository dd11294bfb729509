use std::cmp::Ordering;
use std::fmt;

use crate::db::error::StoreError;

/// A single column value.
///
/// The same tagged sum serves row fields, condition operands and index keys.
/// On disk each variant carries a one-byte tag (see `index::write_key`).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i32),
    Float(f32),
    Text(String),
}

impl Value {
    /// Total order used by the B+-tree. Null sorts below everything;
    /// within a variant the natural order applies. Values of different
    /// variants are ranked Null < Int < Float < Text so that a mistyped
    /// key can never wedge the tree, even though columns are expected to
    /// carry a single type.
    pub fn key_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Int(_) => 1,
                Value::Float(_) => 2,
                Value::Text(_) => 3,
            }
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }

    /// Comparison with the semantics of condition evaluation: Int and Float
    /// compare numerically with each other, Text with Text, Null with Null.
    /// Anything else is incomparable (satisfies only `<>`).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Numeric coercion applied to string operands when the row side of a
    /// condition is numeric: decimal if the text contains a '.', else
    /// integer. Unparseable text is returned unchanged.
    pub fn coerced_against(&self, row_value: &Value) -> Value {
        if let (Value::Int(_) | Value::Float(_), Value::Text(s)) = (row_value, self) {
            let s = s.trim();
            if s.contains('.') {
                if let Ok(f) = s.parse::<f32>() {
                    return Value::Float(f);
                }
            } else if let Ok(i) = s.parse::<i32>() {
                return Value::Int(i);
            }
        }
        self.clone()
    }

    pub fn as_i32(&self) -> Result<i32, StoreError> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Float(v) => Ok(*v as i32),
            Value::Text(s) => s
                .trim()
                .parse::<i32>()
                .map_err(|_| StoreError::BadValue(format!("'{s}' is not an integer"))),
            Value::Null => Err(StoreError::BadValue("NULL where an integer is required".into())),
        }
    }

    pub fn as_f32(&self) -> Result<f32, StoreError> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f32),
            Value::Text(s) => s
                .trim()
                .parse::<f32>()
                .map_err(|_| StoreError::BadValue(format!("'{s}' is not a number"))),
            Value::Null => Err(StoreError::BadValue("NULL where a number is required".into())),
        }
    }
}

/// The stringified form feeds hash bucketing and distinct-value counting,
/// so it must stay stable: floats always render a fractional part.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}
