//! Response body extraction with automatic JSON parsing.

use crate::transport::{ResponseType, TransportRef};
use bytes::Bytes;
use serde_json::Value;

/// A completed stage's result, handed to success/error listeners and to
/// queued continuations.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl ResponseData {
    /// Reads the handle's response according to its response type. For the
    /// default and text types the body text is parsed as JSON when it
    /// parses, otherwise delivered as raw text.
    pub fn from_handle(handle: &TransportRef) -> Self {
        match handle.response_type() {
            ResponseType::Default | ResponseType::Text => {
                let text = handle.response_text().unwrap_or_default();
                match serde_json::from_str::<Value>(&text) {
                    Ok(value) => ResponseData::Json(value),
                    Err(_) => ResponseData::Text(text),
                }
            }
            ResponseType::Bytes => ResponseData::Bytes(handle.response_bytes().unwrap_or_default()),
        }
    }

    /// The parsed JSON value, when this is one.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseData::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<Value> for ResponseData {
    fn from(value: Value) -> Self {
        ResponseData::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_trip() {
        let data = ResponseData::Json(json!({"ok": true}));
        assert_eq!(data.as_json(), Some(&json!({"ok": true})));
        assert_eq!(data.as_text(), None);
    }

    #[test]
    fn test_text_accessor() {
        let data = ResponseData::Text("not json".to_owned());
        assert_eq!(data.as_text(), Some("not json"));
        assert_eq!(data.as_json(), None);
    }
}
