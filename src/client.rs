//! Client: the composition root.
//!
//! Assembles defaults, global interceptors and a transport into the
//! context every pipeline reads at request-issue time. There is no hidden
//! global state; applications build one `Client` where they would have
//! mutated library-wide singletons.
//!
//! # Example
//!
//! ```rust,ignore
//! use pipenet::{Client, RequestConfig};
//!
//! let client = Client::new();
//! client
//!     .request(RequestConfig::new("http://example.com/api/items"))?
//!     .success(|event| println!("loaded: {:?}", event.data))
//!     .error(|event| eprintln!("failed: {:?}", event.data));
//! ```

use crate::config::{Defaults, RequestConfig};
use crate::error::PipelineError;
use crate::pipeline::interceptors::Interceptors;
use crate::pipeline::{job, RequestActions};
use crate::transport::http::HttpTransport;
use crate::transport::Transport;
use std::sync::Arc;

/// Shared configuration read by every pipeline issued from one client.
pub struct ClientContext {
    pub defaults: Defaults,
    pub interceptors: Interceptors,
    pub transport: Arc<dyn Transport>,
}

/// Entry point for issuing chainable requests.
#[derive(Clone)]
pub struct Client {
    ctx: Arc<ClientContext>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// A client with default settings and the hyper-backed transport.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Issues a request and returns its fluent handle.
    ///
    /// Fails synchronously only on usage errors (an empty URL); every
    /// other failure is delivered through the handle's events. Must be
    /// called inside a tokio runtime.
    pub fn request(&self, config: RequestConfig) -> Result<RequestActions, PipelineError> {
        job::issue(self.ctx.clone(), config, None)
    }
}

/// Builder for a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    defaults: Defaults,
    interceptors: Interceptors,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn interceptors(mut self, interceptors: Interceptors) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Client {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new()));
        Client {
            ctx: Arc::new(ClientContext {
                defaults: self.defaults,
                interceptors: self.interceptors,
                transport,
            }),
        }
    }
}
