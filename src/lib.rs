//! # pipenet
//!
//! A fluent, chainable HTTP request pipeline library.
//!
//! `pipenet` wraps an asynchronous network transport with an event-driven,
//! promise-like interface: chained request queues, per-stage interceptors,
//! automatic JSON response parsing and whole-chain cancellation.
//!
//! ## Features
//!
//! - **Request chaining**: queue continuations with `then`; each receives
//!   the previous stage's result and decides the next step
//! - **Interceptors**: client-wide gates and per-pipeline transforms, with
//!   deferred (async) answers
//! - **One terminal outcome**: a whole chain shares one pipeline and fires
//!   exactly one of success, error, abort or timeout
//! - **Pluggable transports**: hyper-backed HTTP, an in-memory test
//!   double, and a typed-channel relay for off-task execution
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipenet::{Client, NextStep, RequestConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let client = Client::new();
//!     client
//!         .request(RequestConfig::new("http://localhost:8081/session"))
//!         .unwrap()
//!         .then(|session| NextStep::Request(RequestConfig::new(
//!             "http://localhost:8081/profile",
//!         )))
//!         .success(|event| println!("profile: {:?}", event.data))
//!         .error(|event| eprintln!("failed: {:?}", event.data));
//! }
//! ```
//!
//! ## Execution model
//!
//! The library is single-threaded and cooperative: all asynchronous work
//! is deferred callbacks interleaved by the tokio event loop, and it is
//! designed for current-thread runtimes. Register callbacks on the handle
//! synchronously after issuing a request: the underlying open is deferred
//! by one scheduling turn exactly so the fluent chain can finish first.
//!
//! ## Modules
//!
//! - [`client`] - Composition root: defaults, interceptors, transport
//! - [`config`] - Request configuration and client-wide defaults
//! - [`error`] - Synchronous usage errors
//! - [`events`] - Event kinds, payloads and the emitter utility
//! - [`pipeline`] - Pipeline state, actions handle, collection, job
//! - [`transport`] - Transport contract, hyper transport, fake transport
//! - [`wire`] - Header merging, query, body and response serialization
//! - [`worker`] - Typed-channel relay execution

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod transport;
pub mod wire;
pub mod worker;

pub use client::{Client, ClientBuilder};
pub use config::{Attributes, Defaults, RequestConfig};
pub use error::PipelineError;
pub use events::{EventData, EventKind, PipelineEvent};
pub use pipeline::{
    Interceptors, NextStep, OwnInterceptors, Rejected, RequestActions, RequestCollection,
    Transform, Verdict,
};
pub use transport::ResponseType;
pub use wire::{ParamValue, Payload, ResponseData};
