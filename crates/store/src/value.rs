//! Owned value handles and the serialization boundary.
//!
//! `load_value` hands out a [`StoreValue`]; callers edit it and pass it back
//! to `save`. Nothing writes through to disk behind the caller's back.

use cybermem_core::{ContentType, StoreError};
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// A value read from or written to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Text(String),
    Bytes(Vec<u8>),
    /// Parsed JSON or YAML.
    Structured(serde_json::Value),
}

impl StoreValue {
    /// An empty structured object.
    pub fn empty_object() -> Self {
        Self::Structured(serde_json::Value::Object(Default::default()))
    }

    /// Convert any serializable value.
    ///
    /// A value serde cannot represent as JSON is coerced to its debug string.
    pub fn serialized<T: Serialize + fmt::Debug>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => Self::Structured(json),
            Err(e) => {
                warn!(error = %e, "Value is not JSON-serializable, storing it as a string");
                Self::Structured(serde_json::Value::String(format!("{value:?}")))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Structured(serde_json::Value::Object(_)) => "object",
            Self::Structured(serde_json::Value::Array(_)) => "array",
            Self::Structured(_) => "scalar",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Structured(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured(v) => Some(v),
            _ => None,
        }
    }

    /// A top-level field of a structured object.
    pub fn get_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.as_structured()?.get(key)
    }

    /// Set a top-level field. Only structured objects have fields.
    pub fn set_field(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        let key = key.into();
        match self {
            Self::Structured(serde_json::Value::Object(map)) => {
                map.insert(key, value);
                Ok(())
            }
            other => Err(StoreError::TypeMismatch {
                path: key,
                expected: "object".into(),
                found: other.kind().into(),
            }),
        }
    }
}

impl From<String> for StoreValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for StoreValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<u8>> for StoreValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<serde_json::Value> for StoreValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }
}

// ── Serialization boundary ────────────────────────────────────────────────

/// On-disk syntax chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Json,
    Yaml,
    Text,
}

impl Syntax {
    pub fn for_path(relative: &str) -> Self {
        let lower = relative.to_ascii_lowercase();
        if lower.ends_with(".json") {
            Self::Json
        } else if lower.ends_with(".yaml") || lower.ends_with(".yml") {
            Self::Yaml
        } else {
            Self::Text
        }
    }
}

/// Serialize a value for `relative`.
///
/// YAML that fails to serialize falls back to JSON text.
pub fn encode(relative: &str, value: &StoreValue) -> Vec<u8> {
    let json = match value {
        StoreValue::Text(s) => return s.clone().into_bytes(),
        StoreValue::Bytes(b) => return b.clone(),
        StoreValue::Structured(json) => json,
    };

    match Syntax::for_path(relative) {
        Syntax::Yaml => match serde_yaml::to_string(json) {
            Ok(yaml) => yaml.into_bytes(),
            Err(e) => {
                warn!(path = relative, error = %e, "YAML serialization failed, writing JSON instead");
                json_text(json).into_bytes()
            }
        },
        Syntax::Text => match json {
            serde_json::Value::String(s) => s.clone().into_bytes(),
            other => json_text(other).into_bytes(),
        },
        Syntax::Json => json_text(json).into_bytes(),
    }
}

fn json_text(json: &serde_json::Value) -> String {
    let mut text = serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string());
    text.push('\n');
    text
}

/// Parse raw bytes of `relative` into a value.
///
/// Structured files that fail to parse are recovered to an empty object.
pub fn decode(relative: &str, content_type: ContentType, bytes: &[u8]) -> StoreValue {
    if content_type == ContentType::OctetStream {
        return StoreValue::Bytes(bytes.to_vec());
    }
    let text = String::from_utf8_lossy(bytes);
    let structured = matches!(
        content_type,
        ContentType::Json | ContentType::Yaml | ContentType::Knowledge | ContentType::Message
    );
    if !structured {
        return StoreValue::Text(text.into_owned());
    }
    if text.trim().is_empty() {
        return StoreValue::empty_object();
    }

    let parsed = match Syntax::for_path(relative) {
        Syntax::Yaml => serde_yaml::from_str::<serde_json::Value>(&text).map_err(|e| e.to_string()),
        _ => serde_json::from_str::<serde_json::Value>(&text).map_err(|e| e.to_string()),
    };
    match parsed {
        Ok(value) => StoreValue::Structured(value),
        Err(reason) => {
            let err = StoreError::CorruptedContent {
                path: relative.to_string(),
                reason,
            };
            warn!(path = relative, error = %err, "Recovering corrupted content as an empty object");
            StoreValue::empty_object()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn set_field_on_object() {
        let mut value = StoreValue::empty_object();
        value.set_field("status", json!("done")).unwrap();
        assert_eq!(value.get_field("status"), Some(&json!("done")));
    }

    #[test]
    fn set_field_on_text_is_type_mismatch() {
        let mut value = StoreValue::from("plain");
        let err = value.set_field("k", json!(1)).unwrap_err();
        assert_eq!(
            err,
            StoreError::TypeMismatch {
                path: "k".into(),
                expected: "object".into(),
                found: "text".into(),
            }
        );
    }

    #[test]
    fn encode_by_extension() {
        let value = StoreValue::from(json!({"a": 1}));
        let yaml = String::from_utf8(encode("personal/x.yaml", &value)).unwrap();
        assert_eq!(yaml.trim(), "a: 1");
        let js = String::from_utf8(encode("personal/x.json", &value)).unwrap();
        assert_eq!(serde_json::from_str::<serde_json::Value>(&js).unwrap(), json!({"a": 1}));
        assert_eq!(encode("personal/x.txt", &StoreValue::from(json!("raw"))), b"raw");
    }

    #[test]
    fn unserializable_value_is_coerced_to_string() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        let value = StoreValue::serialized(&map);
        assert!(matches!(value, StoreValue::Structured(serde_json::Value::String(_))));
    }

    #[test]
    fn decode_structured_and_text() {
        let yaml = decode("grid/k.yaml", ContentType::Knowledge, b"title: t\ntags: [a]\n");
        assert_eq!(yaml.get_field("title"), Some(&json!("t")));

        let text = decode("grid/n.md", ContentType::Markdown, b"# hi");
        assert_eq!(text.as_text(), Some("# hi"));

        let bytes = decode("grid/b.bin", ContentType::OctetStream, b"\0\x01");
        assert_eq!(bytes, StoreValue::Bytes(vec![0, 1]));
    }

    #[test]
    fn corrupted_structured_content_recovers_empty() {
        assert_eq!(
            decode("grid/bad.json", ContentType::Json, b"{ nope"),
            StoreValue::empty_object()
        );
        assert_eq!(
            decode("grid/empty.yaml", ContentType::Yaml, b"  \n"),
            StoreValue::empty_object()
        );
    }
}
