//! Scalar values and dtype coercion.
//!
//! Every cell in a table is a [`Value`]: null or one of three scalar
//! variants. Validation happens at the schema boundary — insert, update,
//! the right-hand side of a comparison, and the JSON load path all coerce
//! through [`coerce`] / [`Value::from_json`], so the rest of the engine can
//! assume cells already match their column's [`DataType`].

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TabletError};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Column data type. Serialized into schema documents with the SQL
/// spellings (`INT`, `FLOAT`, `STRING`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "INT")]
    Int,
    #[serde(rename = "FLOAT")]
    Float,
    #[serde(rename = "STRING")]
    Str,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::Str => "STRING",
        }
    }

    /// Parse an SQL dtype spelling (case-insensitive). Anything outside the
    /// supported set is a schema error.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INT" => Ok(Self::Int),
            "FLOAT" => Ok(Self::Float),
            "STRING" => Ok(Self::Str),
            _ => Err(TabletError::Schema(format!("unsupported type: {s}"))),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A scalar cell value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert a JSON scalar from a row document into a typed cell.
    ///
    /// Row documents may legally carry any JSON scalar, so this is the one
    /// place a boolean can enter the engine: it renders to `"true"`/`"false"`
    /// for STRING columns and is rejected for the numeric ones, matching the
    /// coercion table. Arrays and objects are never valid cells.
    pub fn from_json(json: &serde_json::Value, dtype: DataType) -> Result<Self> {
        match json {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => match dtype {
                DataType::Str => Ok(Self::Str(if *b { "true" } else { "false" }.to_string())),
                DataType::Int => Err(TabletError::Schema("invalid INT value: boolean".into())),
                DataType::Float => Err(TabletError::Schema("invalid FLOAT value: boolean".into())),
            },
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    coerce(&Self::Int(i), dtype)
                } else if let Some(f) = n.as_f64() {
                    coerce(&Self::Float(f), dtype)
                } else {
                    Err(TabletError::Schema(format!("unrepresentable number: {n}")))
                }
            }
            serde_json::Value::String(s) => coerce(&Self::Str(s.clone()), dtype),
            _ => Err(TabletError::Schema("row values must be scalars".into())),
        }
    }

    /// Render this cell as a JSON scalar for the row document.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Str(s) => serde_json::Value::from(s.clone()),
        }
    }
}

// Equality and hashing key the unique indexes, so they must agree with each
// other and never collide across variants (integer 1 vs string "1").
// Floats compare by bit pattern with -0.0 normalized to 0.0.

fn float_bits(f: f64) -> u64 {
    if f == 0.0 { 0.0f64.to_bits() } else { f.to_bits() }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => float_bits(*a) == float_bits(*b),
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Int(i) => i.hash(state),
            Self::Float(f) => float_bits(*f).hash(state),
            Self::Str(s) => s.hash(state),
        }
    }
}

// ---------------------------------------------------------------------------
// Coercion & comparison
// ---------------------------------------------------------------------------

/// Coerce a value into a column's dtype.
///
/// Nulls pass through untouched. Numeric strings parse (trimmed, non-empty);
/// an exactly-integral float narrows to INT; everything renders to STRING.
/// Anything else is a schema error.
pub fn coerce(value: &Value, dtype: DataType) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match dtype {
        DataType::Int => match value {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 => {
                Ok(Value::Int(*f as i64))
            }
            Value::Str(s) if !s.trim().is_empty() => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| TabletError::Schema(format!("invalid INT value: {s}"))),
            other => Err(TabletError::Schema(format!("invalid INT value: {other:?}"))),
        },
        DataType::Float => match value {
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Str(s) if !s.trim().is_empty() => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| TabletError::Schema(format!("invalid FLOAT value: {s}"))),
            other => Err(TabletError::Schema(format!("invalid FLOAT value: {other:?}"))),
        },
        DataType::Str => match value {
            Value::Str(s) => Ok(Value::Str(s.clone())),
            Value::Int(i) => Ok(Value::Str(i.to_string())),
            Value::Float(f) => Ok(Value::Str(f.to_string())),
            Value::Null => Ok(Value::Null),
        },
    }
}

/// Natural order between two non-null cells of the same column: integers and
/// strings by their own ordering, anything involving a float numerically.
pub(crate) fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (a, b) => match (a.as_numeric(), b.as_numeric()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}
