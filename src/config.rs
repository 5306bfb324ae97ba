//! Request configuration and client-wide defaults.
//!
//! There is no process-global mutable state: defaults and global
//! interceptors are assembled once at the composition root (see
//! [`crate::client::Client`]) and read at request-issue time.

use crate::transport::ResponseType;
use crate::wire::{ParamValue, Payload};
use http::Method;
use std::time::Duration;

/// Attributes applied onto the underlying transport handle before the
/// request is opened.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    pub response_type: Option<ResponseType>,
    pub timeout: Option<Duration>,
}

impl Attributes {
    /// Field-wise override of `defaults` by `self`.
    pub fn merged_over(&self, defaults: &Attributes) -> Attributes {
        Attributes {
            response_type: self.response_type.or(defaults.response_type),
            timeout: self.timeout.or(defaults.timeout),
        }
    }
}

/// Client-wide defaults, consulted for every request that does not supply
/// its own value.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub attributes: Attributes,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            attributes: Attributes::default(),
        }
    }
}

impl Defaults {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.attributes.response_type = Some(response_type);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.attributes.timeout = Some(timeout);
        self
    }
}

/// Configuration of a single request.
///
/// ```rust,ignore
/// let config = RequestConfig::new("/api/items")
///     .method(Method::POST)
///     .param("page", 2)
///     .header("x-trace", "abc")
///     .data(serde_json::json!({"name": "pin"}));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub url: String,
    pub method: Option<Method>,
    pub headers: Vec<(String, Option<String>)>,
    pub params: Vec<(String, ParamValue)>,
    pub data: Option<Payload>,
    pub attributes: Attributes,
}

impl RequestConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), Some(value.into())));
        self
    }

    /// Masks a default header so it is not sent with this request.
    pub fn without_header(mut self, name: impl Into<String>) -> Self {
        self.headers.push((name.into(), None));
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn data(mut self, data: impl Into<Payload>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.attributes.response_type = Some(response_type);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.attributes.timeout = Some(timeout);
        self
    }
}
