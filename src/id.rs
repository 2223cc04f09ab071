//! Store-assigned entity identifiers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque identifier assigned by the backing store. Integer for PostgreSQL
/// `BIGSERIAL` keys, text for peers that hand out string ids.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(untagged)]
pub enum Id {
    Int(i64),
    Text(String),
}

impl Id {
    /// Read an id out of a row cell. Numeric strings stay text.
    pub fn from_value(v: &Value) -> Option<Id> {
        match v {
            Value::Number(n) => n.as_i64().map(Id::Int),
            Value::String(s) => Some(Id::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Id::Int(n) => Value::Number((*n).into()),
            Id::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Int(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Text(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::Text(s)
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Id::Int(n) => write!(f, "{}", n),
            Id::Text(s) => f.write_str(s),
        }
    }
}
