use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute bag attached to spans and logs, stored as JSON.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// One OTLP `AnyValue`, flattened to its JSON representation.
///
/// Bytes are carried as lowercase hex; a decoded bag therefore never
/// contains the `Bytes` variant, only the string it serialized to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(String),
    Array(Vec<AttrValue>),
    KvList(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) | AttrValue::Bytes(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

/// Serializes an attribute bag for the schemaless JSONB column.
pub fn attrs_to_json(attrs: &AttrMap) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(attrs)
}

/// Parses a JSONB column back into the attribute bag. An empty or null
/// column yields an empty bag.
pub fn attrs_from_json(value: Option<serde_json::Value>) -> AttrMap {
    match value {
        Some(v) if !v.is_null() => serde_json::from_value(v).unwrap_or_default(),
        _ => AttrMap::new(),
    }
}
