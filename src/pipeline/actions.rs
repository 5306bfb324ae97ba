//! The fluent handle returned to callers.

use crate::events::{EventData, EventKind, PipelineEvent};
use crate::pipeline::interceptors::OwnInterceptors;
use crate::pipeline::state::Pipeline;
use crate::pipeline::{Continuation, NextStep, RequestCollection};
use std::sync::Arc;

/// Public chainable surface of one pipeline. Every registration method
/// subscribes a listener (or queues a continuation) and returns the same
/// handle, so calls chain:
///
/// ```rust,ignore
/// client
///     .request(RequestConfig::new("/session"))?
///     .then(|session| NextStep::Request(RequestConfig::new("/profile")))
///     .success(|event| println!("profile loaded"))
///     .error(|event| eprintln!("failed"));
/// ```
#[derive(Clone)]
pub struct RequestActions {
    pipeline: Arc<Pipeline>,
}

impl RequestActions {
    pub(crate) fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    pub(crate) fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    fn on<F>(self, kind: EventKind, listener: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.pipeline.emitter().on(kind, listener);
        self
    }

    pub fn success<F>(self, listener: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::Success, listener)
    }

    pub fn error<F>(self, listener: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::Error, listener)
    }

    pub fn abort<F>(self, listener: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::Abort, listener)
    }

    pub fn timeout<F>(self, listener: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::Timeout, listener)
    }

    pub fn load<F>(self, listener: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::Load, listener)
    }

    pub fn load_start<F>(self, listener: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::LoadStart, listener)
    }

    pub fn load_end<F>(self, listener: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::LoadEnd, listener)
    }

    pub fn progress<F>(self, listener: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::Progress, listener)
    }

    pub fn ready_state_change<F>(self, listener: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::ReadyStateChange, listener)
    }

    /// Observes the pipeline's destruction, including the silent
    /// destruction caused by an interceptor veto.
    pub fn destroy<F>(self, listener: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::Destroy, listener)
    }

    /// Replaces the pipeline's own interceptor map.
    pub fn interceptors(self, interceptors: OwnInterceptors) -> Self {
        self.pipeline.set_interceptors(interceptors);
        self
    }

    /// Suppresses global-interceptor vetoes for this pipeline.
    pub fn silent(self) -> Self {
        self.pipeline.set_silent();
        self
    }

    /// Queues a continuation: once the current request succeeds, it
    /// receives the result and decides the next step. This is what builds
    /// multi-request chains.
    pub fn then<F, S>(self, continuation: F) -> Self
    where
        F: FnOnce(EventData) -> S + Send + 'static,
        S: Into<NextStep>,
    {
        let boxed: Continuation = Box::new(move |data| continuation(data).into());
        self.pipeline.enqueue(boxed);
        self
    }

    /// The collection of handles issued under this pipeline; aborting it
    /// cancels the whole chain.
    pub fn collection(&self) -> Arc<RequestCollection> {
        self.pipeline.collection()
    }

    pub fn is_in_progress(&self) -> bool {
        self.pipeline.is_in_progress()
    }
}
