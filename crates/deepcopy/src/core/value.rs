//! Row values and object identities.
//!
//! The copy engine never interprets data columns; it only needs to compare
//! identity and link values, so the value model is deliberately small.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Integer value (ids and link columns are always integers).
    Int(i64),

    /// Floating point value.
    Float(f64),

    /// Text value.
    Text(String),
}

/// A row keyed by column name.
pub type Row = BTreeMap<String, Value>;

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interpret the value as an integer id.
    ///
    /// Text values are accepted when they parse as integers, since link
    /// columns are occasionally stored as strings.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Whether the value points at something.
    ///
    /// NULL and zero (numeric or textual) mean "not linked".
    #[must_use]
    pub fn is_link(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(v) => *v != 0,
            Value::Text(s) => {
                let s = s.trim();
                !s.is_empty() && s != "0"
            }
            Value::Float(v) => *v != 0.0,
            Value::Bool(_) => false,
        }
    }

    /// Loose equality used by filters: integers compare numerically even
    /// when one side is stored as text.
    #[must_use]
    pub fn matches(&self, other: &Value) -> bool {
        match (self.as_i64(), other.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Convert a YAML scalar into a value. Sequences and mappings yield `None`.
    pub fn from_yaml(value: &serde_yaml::Value) -> Option<Value> {
        match value {
            serde_yaml::Value::Null => Some(Value::Null),
            serde_yaml::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_yaml::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float)),
            serde_yaml::Value::String(s) => Some(Value::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
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

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Build a row from `(column, value)` pairs.
///
/// ```rust
/// use deepcopy::core::{row, Value};
///
/// let r = row([("id", Value::from(1)), ("name", "home".into())]);
/// assert_eq!(r["id"], Value::Int(1));
/// ```
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Identity of a row: a single integer id for normal tables, the ordered
/// values of all identity columns for cross tables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectId {
    Single(i64),
    Composite(Vec<i64>),
}

impl ObjectId {
    /// Read the identity of `row` from the given id columns.
    ///
    /// Returns `None` if any id column is missing or not an integer.
    pub fn from_row(row: &Row, id_columns: &[String]) -> Option<ObjectId> {
        match id_columns {
            [single] => row.get(single).and_then(Value::as_i64).map(ObjectId::Single),
            many => many
                .iter()
                .map(|c| row.get(c).and_then(Value::as_i64))
                .collect::<Option<Vec<_>>>()
                .map(ObjectId::Composite),
        }
    }

    /// Interpret a link value as a single id.
    pub fn from_value(value: &Value) -> Option<ObjectId> {
        if !value.is_link() {
            return None;
        }
        value.as_i64().map(ObjectId::Single)
    }

    /// The single id, if this is not a composite identity.
    pub fn as_single(&self) -> Option<i64> {
        match self {
            ObjectId::Single(v) => Some(*v),
            ObjectId::Composite(_) => None,
        }
    }

    /// Values of this identity in id-column order.
    pub fn parts(&self) -> Vec<i64> {
        match self {
            ObjectId::Single(v) => vec![*v],
            ObjectId::Composite(v) => v.clone(),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Single(v) => write!(f, "{}", v),
            ObjectId::Composite(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

impl From<i64> for ObjectId {
    fn from(v: i64) -> Self {
        ObjectId::Single(v)
    }
}

impl From<i32> for ObjectId {
    fn from(v: i32) -> Self {
        ObjectId::Single(i64::from(v))
    }
}

impl From<Vec<i64>> for ObjectId {
    fn from(v: Vec<i64>) -> Self {
        ObjectId::Composite(v)
    }
}
