use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub mod writer;

/// Scalar kinds allowed in record metadata. Serialized untagged so the log
/// lines read as plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<&Path> for MetaValue {
    fn from(value: &Path) -> Self {
        MetaValue::Text(value.display().to_string())
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Integer(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Flag(value)
    }
}

pub type Metadata = BTreeMap<String, MetaValue>;

/// Build a metadata map from key/value pairs.
pub fn metadata<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Metadata
where
    K: Into<String>,
    V: Into<MetaValue>,
{
    entries
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// One user-like interaction performed against the target site. Created once
/// per logged action and never mutated; the log preserves creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: String,
    pub url: String,
    pub metadata: Metadata,
    pub timestamp: String,
}

impl ActionRecord {
    pub fn new(action: &str, url: &str, metadata: Metadata) -> Self {
        ActionRecord {
            action: action.to_string(),
            url: url.to_string(),
            metadata,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_values_serialize_as_plain_scalars() {
        let meta = metadata([
            ("text", MetaValue::from("hello")),
            ("count", MetaValue::from(3i64)),
            ("ratio", MetaValue::from(0.5)),
            ("done", MetaValue::from(true)),
        ]);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "text": "hello",
                "count": 3,
                "ratio": 0.5,
                "done": true,
            })
        );
    }

    #[test]
    fn record_carries_an_iso8601_timestamp() {
        let record =
            ActionRecord::new("navigate", "http://x/", metadata([("target", "home")]));
        assert!(
            chrono::DateTime::parse_from_rfc3339(&record.timestamp).is_ok(),
            "timestamp {:?} should parse as RFC 3339",
            record.timestamp
        );
        assert_eq!(record.action, "navigate");
        assert_eq!(record.url, "http://x/");
    }
}
