//! Query-string serialization.

use serde_json::Value;

/// A query parameter value. Lists repeat the key once per element; object
/// values travel JSON-encoded.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Value(String),
    List(Vec<String>),
    Object(Value),
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Value(s)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Value(s.to_owned())
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Value(n.to_string())
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Value(b.to_string())
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        let mut list = Vec::with_capacity(values.len());
        for value in values {
            match value.into() {
                ParamValue::Value(s) => list.push(s),
                ParamValue::List(inner) => list.extend(inner),
                ParamValue::Object(v) => list.push(v.to_string()),
            }
        }
        ParamValue::List(list)
    }
}

/// Appends the serialized parameters to `url`. Returns the URL unchanged
/// when there is nothing to append.
pub fn append_query(url: &str, params: &[(String, ParamValue)]) -> String {
    if params.is_empty() {
        return url.to_owned();
    }
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in params {
        match value {
            ParamValue::Value(v) => {
                serializer.append_pair(name, v);
            }
            ParamValue::List(values) => {
                for v in values {
                    serializer.append_pair(name, v);
                }
            }
            ParamValue::Object(v) => {
                serializer.append_pair(name, &v.to_string());
            }
        }
    }
    let query = serializer.finish();
    if query.is_empty() {
        url.to_owned()
    } else {
        format!("{url}?{query}")
    }
}
