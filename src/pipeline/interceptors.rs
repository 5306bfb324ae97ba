//! Global and per-pipeline interceptors.
//!
//! A global interceptor gates whether an event of its category is
//! delivered at all; an own interceptor transforms the payload on the way
//! to the listeners. Both may answer immediately or with a deferred
//! result, in which case the pipeline suspends the current stage until it
//! settles.

use crate::events::{EventData, InterceptorKind};
use crate::transport::TransportRef;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Answer of a global interceptor. A veto (or a deferred `false`) destroys
/// the pipeline without firing the gated event.
pub enum Verdict {
    Allow,
    Veto,
    Deferred(BoxFuture<'static, bool>),
}

impl Verdict {
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = bool> + Send + 'static,
    {
        Verdict::Deferred(Box::pin(future))
    }

    pub(crate) async fn resolve(self) -> bool {
        match self {
            Verdict::Allow => true,
            Verdict::Veto => false,
            Verdict::Deferred(future) => future.await,
        }
    }
}

impl From<bool> for Verdict {
    fn from(allowed: bool) -> Self {
        if allowed {
            Verdict::Allow
        } else {
            Verdict::Veto
        }
    }
}

pub type GlobalInterceptor = Arc<dyn Fn(Option<&TransportRef>) -> Verdict + Send + Sync>;

/// Client-wide interceptor set, one optional gate per category.
#[derive(Clone, Default)]
pub struct Interceptors {
    request: Option<GlobalInterceptor>,
    response: Option<GlobalInterceptor>,
    response_error: Option<GlobalInterceptor>,
    abort: Option<GlobalInterceptor>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(Option<&TransportRef>) -> Verdict + Send + Sync + 'static,
    {
        self.request = Some(Arc::new(interceptor));
        self
    }

    pub fn response<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(Option<&TransportRef>) -> Verdict + Send + Sync + 'static,
    {
        self.response = Some(Arc::new(interceptor));
        self
    }

    pub fn response_error<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(Option<&TransportRef>) -> Verdict + Send + Sync + 'static,
    {
        self.response_error = Some(Arc::new(interceptor));
        self
    }

    pub fn abort<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(Option<&TransportRef>) -> Verdict + Send + Sync + 'static,
    {
        self.abort = Some(Arc::new(interceptor));
        self
    }

    pub(crate) fn get(&self, kind: InterceptorKind) -> Option<&GlobalInterceptor> {
        match kind {
            InterceptorKind::Request => self.request.as_ref(),
            InterceptorKind::Response => self.response.as_ref(),
            InterceptorKind::ResponseError => self.response_error.as_ref(),
            InterceptorKind::Abort => self.abort.as_ref(),
        }
    }
}

/// Marker for a deferred own-interceptor rejection; rejecting destroys the
/// pipeline without delivering the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected;

/// Answer of an own interceptor.
pub enum Transform {
    Value(EventData),
    Deferred(BoxFuture<'static, Result<EventData, Rejected>>),
}

impl Transform {
    pub fn value(data: impl Into<EventData>) -> Self {
        Transform::Value(data.into())
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<EventData, Rejected>> + Send + 'static,
    {
        Transform::Deferred(Box::pin(future))
    }
}

impl From<EventData> for Transform {
    fn from(data: EventData) -> Self {
        Transform::Value(data)
    }
}

pub type OwnInterceptor = Box<dyn FnMut(EventData) -> Transform + Send>;

/// Per-pipeline interceptor set, replaced wholesale by
/// [`crate::pipeline::RequestActions::interceptors`].
#[derive(Default)]
pub struct OwnInterceptors {
    request: Option<OwnInterceptor>,
    response: Option<OwnInterceptor>,
    response_error: Option<OwnInterceptor>,
    abort: Option<OwnInterceptor>,
}

impl OwnInterceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request<F>(mut self, interceptor: F) -> Self
    where
        F: FnMut(EventData) -> Transform + Send + 'static,
    {
        self.request = Some(Box::new(interceptor));
        self
    }

    pub fn response<F>(mut self, interceptor: F) -> Self
    where
        F: FnMut(EventData) -> Transform + Send + 'static,
    {
        self.response = Some(Box::new(interceptor));
        self
    }

    pub fn response_error<F>(mut self, interceptor: F) -> Self
    where
        F: FnMut(EventData) -> Transform + Send + 'static,
    {
        self.response_error = Some(Box::new(interceptor));
        self
    }

    pub fn abort<F>(mut self, interceptor: F) -> Self
    where
        F: FnMut(EventData) -> Transform + Send + 'static,
    {
        self.abort = Some(Box::new(interceptor));
        self
    }

    pub(crate) fn take(&mut self, kind: InterceptorKind) -> Option<OwnInterceptor> {
        match kind {
            InterceptorKind::Request => self.request.take(),
            InterceptorKind::Response => self.response.take(),
            InterceptorKind::ResponseError => self.response_error.take(),
            InterceptorKind::Abort => self.abort.take(),
        }
    }

    pub(crate) fn restore(&mut self, kind: InterceptorKind, interceptor: OwnInterceptor) {
        let slot = match kind {
            InterceptorKind::Request => &mut self.request,
            InterceptorKind::Response => &mut self.response,
            InterceptorKind::ResponseError => &mut self.response_error,
            InterceptorKind::Abort => &mut self.abort,
        };
        // A replacement installed while the interceptor was running wins.
        if slot.is_none() {
            *slot = Some(interceptor);
        }
    }
}

impl std::fmt::Debug for OwnInterceptors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnInterceptors")
            .field("request", &self.request.is_some())
            .field("response", &self.response.is_some())
            .field("response_error", &self.response_error.is_some())
            .field("abort", &self.abort.is_some())
            .finish()
    }
}
