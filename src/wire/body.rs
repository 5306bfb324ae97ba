//! Request body for operations that send data.

use bytes::Bytes;
use serde_json::Value;

/// Request payload. Binary data passes through untouched, JSON values are
/// stringified, text is sent as-is and form pairs are urlencoded.
#[derive(Debug, Clone)]
pub enum Payload {
    Bytes(Bytes),
    Text(String),
    Json(Value),
    Form(Vec<(String, String)>),
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Bytes(b)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(v))
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_owned())
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Json(v)
    }
}

impl Payload {
    /// Encodes the payload into the bytes that go on the wire.
    pub fn encode(&self) -> Bytes {
        match self {
            Payload::Bytes(b) => b.clone(),
            Payload::Text(s) => Bytes::from(s.clone()),
            Payload::Json(v) => Bytes::from(v.to_string()),
            Payload::Form(pairs) => {
                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (name, value) in pairs {
                    serializer.append_pair(name, value);
                }
                Bytes::from(serializer.finish())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bytes_pass_through() {
        let payload: Payload = Bytes::from_static(b"\x00\x01\x02").into();
        assert_eq!(payload.encode().as_ref(), b"\x00\x01\x02");
    }

    #[test]
    fn test_json_is_stringified() {
        let payload: Payload = json!({"a": 1}).into();
        assert_eq!(payload.encode().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn test_text_sent_as_is() {
        let payload: Payload = "plain".into();
        assert_eq!(payload.encode().as_ref(), b"plain");
    }

    #[test]
    fn test_form_pairs_are_urlencoded() {
        let payload = Payload::Form(vec![
            ("a".to_owned(), "1 2".to_owned()),
            ("b".to_owned(), "x&y".to_owned()),
        ]);
        assert_eq!(payload.encode().as_ref(), b"a=1+2&b=x%26y");
    }
}
