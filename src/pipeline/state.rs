//! Pipeline state: the single source of truth for one logical, possibly
//! multi-hop request chain.

use crate::client::ClientContext;
use crate::events::{EventData, EventEmitter, EventKind, InterceptorKind, PipelineEvent};
use crate::pipeline::collection::RequestCollection;
use crate::pipeline::interceptors::{OwnInterceptors, Rejected, Transform};
use crate::pipeline::Continuation;
use crate::transport::TransportRef;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// One instance per top-level request; every chained sub-request reuses
/// it, so the chain shares one collection, one listener set and exactly
/// one terminal outcome.
pub struct Pipeline {
    ctx: Arc<ClientContext>,
    emitter: EventEmitter,
    collection: Arc<RequestCollection>,
    queue: Mutex<VecDeque<Continuation>>,
    own: Mutex<OwnInterceptors>,
    silent: AtomicBool,
    in_progress: AtomicBool,
    destroyed: AtomicBool,
    done: watch::Sender<bool>,
}

impl Pipeline {
    pub(crate) fn new(ctx: Arc<ClientContext>) -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            ctx,
            emitter: EventEmitter::new(),
            collection: Arc::new(RequestCollection::new()),
            queue: Mutex::new(VecDeque::new()),
            own: Mutex::new(OwnInterceptors::default()),
            silent: AtomicBool::new(false),
            in_progress: AtomicBool::new(true),
            destroyed: AtomicBool::new(false),
            done,
        })
    }

    /// A receiver that resolves once the pipeline is destroyed; job tasks
    /// watch it so they never outlive their pipeline.
    pub(crate) fn done_signal(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }

    pub(crate) fn ctx(&self) -> &Arc<ClientContext> {
        &self.ctx
    }

    pub(crate) fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn collection(&self) -> Arc<RequestCollection> {
        self.collection.clone()
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub(crate) fn set_silent(&self) {
        self.silent.store(true, Ordering::SeqCst);
    }

    fn is_silent(&self) -> bool {
        self.silent.load(Ordering::SeqCst)
    }

    pub(crate) fn set_interceptors(&self, interceptors: OwnInterceptors) {
        if let Ok(mut own) = self.own.lock() {
            *own = interceptors;
        }
    }

    pub(crate) fn enqueue(&self, continuation: Continuation) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(continuation);
        }
    }

    /// Pops the oldest queued continuation.
    pub(crate) fn next_continuation(&self) -> Option<Continuation> {
        self.queue
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
    }

    /// Evaluates the global interceptor for `kind`. The silent flag
    /// bypasses the gate entirely; a deferred verdict suspends the stage
    /// until it settles.
    pub(crate) async fn check_global(
        &self,
        kind: Option<InterceptorKind>,
        handle: Option<&TransportRef>,
    ) -> bool {
        let Some(kind) = kind else {
            return true;
        };
        let Some(interceptor) = self.ctx.interceptors.get(kind) else {
            return true;
        };
        if self.is_silent() {
            return true;
        }
        interceptor(handle).resolve().await
    }

    async fn apply_own(
        &self,
        kind: Option<InterceptorKind>,
        data: EventData,
    ) -> Result<EventData, Rejected> {
        let Some(kind) = kind else {
            return Ok(data);
        };
        let Some(mut interceptor) = self
            .own
            .lock()
            .ok()
            .and_then(|mut own| own.take(kind))
        else {
            return Ok(data);
        };
        let transform = interceptor(data);
        if let Ok(mut own) = self.own.lock() {
            own.restore(kind, interceptor);
        }
        match transform {
            Transform::Value(data) => Ok(data),
            Transform::Deferred(future) => future.await,
        }
    }

    /// Central dispatch: global gate, own transform, listener dispatch,
    /// then destruction when `kind` is terminal. A vetoed gate or a
    /// rejected own transform destroys the pipeline without firing the
    /// event; that soft-cancel is only observable through `Destroy`.
    pub(crate) async fn apply_callback(
        &self,
        kind: EventKind,
        data: EventData,
        handle: Option<TransportRef>,
    ) {
        let category = kind.interceptor_kind();
        if !self.check_global(category, handle.as_ref()).await {
            tracing::debug!(?kind, "global interceptor vetoed event");
            self.destroy();
            return;
        }
        let data = match self.apply_own(category, data).await {
            Ok(data) => data,
            Err(Rejected) => {
                tracing::debug!(?kind, "own interceptor rejected event");
                self.destroy();
                return;
            }
        };
        self.emitter.emit(&PipelineEvent { kind, data, handle });
        if kind.is_terminal() {
            tracing::debug!(?kind, "pipeline reached terminal outcome");
            self.destroy();
        }
    }

    /// Fires `Destroy`, clears the in-progress flag and detaches every
    /// listener. Calling it again is a no-op.
    pub(crate) fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emitter.emit(&PipelineEvent {
            kind: EventKind::Destroy,
            data: EventData::None,
            handle: None,
        });
        self.in_progress.store(false, Ordering::SeqCst);
        self.emitter.remove_all();
        let _ = self.done.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Defaults;
    use crate::pipeline::interceptors::{Interceptors, OwnInterceptors, Verdict};
    use crate::transport::fake::FakeTransport;
    use crate::wire::response::ResponseData;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn pipeline_with(interceptors: Interceptors) -> Arc<Pipeline> {
        let ctx = Arc::new(ClientContext {
            defaults: Defaults::default(),
            interceptors,
            transport: Arc::new(FakeTransport::new()),
        });
        Pipeline::new(ctx)
    }

    fn pipeline() -> Arc<Pipeline> {
        pipeline_with(Interceptors::new())
    }

    #[tokio::test]
    async fn test_apply_callback_reaches_listener() {
        let pipeline = pipeline();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        pipeline.emitter().on(EventKind::Success, move |event| {
            assert!(matches!(event.data, EventData::Body(_)));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        pipeline
            .apply_callback(
                EventKind::Success,
                EventData::Body(ResponseData::Json(json!({"foo": "bar"}))),
                None,
            )
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!pipeline.is_in_progress());
    }

    #[tokio::test]
    async fn test_own_interceptor_transforms_payload() {
        let pipeline = pipeline();
        pipeline.set_interceptors(OwnInterceptors::new().response(|_| {
            Transform::value(EventData::Body(ResponseData::Json(json!("swapped"))))
        }));
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        pipeline.emitter().on(EventKind::Success, move |event| {
            if let EventData::Body(ResponseData::Json(value)) = &event.data {
                if let Ok(mut guard) = slot.lock() {
                    *guard = Some(value.clone());
                }
            }
        });
        pipeline
            .apply_callback(
                EventKind::Success,
                EventData::Body(ResponseData::Json(json!("original"))),
                None,
            )
            .await;
        assert_eq!(
            seen.lock().ok().and_then(|guard| guard.clone()),
            Some(json!("swapped"))
        );
    }

    #[tokio::test]
    async fn test_deferred_own_interceptor_rejection_destroys() {
        let pipeline = pipeline();
        pipeline.set_interceptors(
            OwnInterceptors::new()
                .response(|_| Transform::deferred(async { Err(Rejected) })),
        );
        let successes = Arc::new(AtomicUsize::new(0));
        let destroys = Arc::new(AtomicUsize::new(0));
        let success_counter = successes.clone();
        let destroy_counter = destroys.clone();
        pipeline.emitter().on(EventKind::Success, move |_| {
            success_counter.fetch_add(1, Ordering::SeqCst);
        });
        pipeline.emitter().on(EventKind::Destroy, move |_| {
            destroy_counter.fetch_add(1, Ordering::SeqCst);
        });
        pipeline
            .apply_callback(EventKind::Success, EventData::None, None)
            .await;
        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert_eq!(destroys.load(Ordering::SeqCst), 1);
        assert!(!pipeline.is_in_progress());
    }

    #[tokio::test]
    async fn test_global_veto_suppresses_delivery() {
        let pipeline = pipeline_with(Interceptors::new().response(|_| Verdict::Veto));
        let successes = Arc::new(AtomicUsize::new(0));
        let counter = successes.clone();
        pipeline.emitter().on(EventKind::Success, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        pipeline
            .apply_callback(EventKind::Success, EventData::None, None)
            .await;
        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert!(!pipeline.is_in_progress());
    }

    #[tokio::test]
    async fn test_silent_flag_bypasses_global_gate() {
        let pipeline = pipeline_with(Interceptors::new().response(|_| Verdict::Veto));
        pipeline.set_silent();
        let successes = Arc::new(AtomicUsize::new(0));
        let counter = successes.clone();
        pipeline.emitter().on(EventKind::Success, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        pipeline
            .apply_callback(EventKind::Success, EventData::None, None)
            .await;
        assert_eq!(successes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deferred_global_verdict_is_awaited() {
        let pipeline =
            pipeline_with(Interceptors::new().response(|_| Verdict::deferred(async { true })));
        let successes = Arc::new(AtomicUsize::new(0));
        let counter = successes.clone();
        pipeline.emitter().on(EventKind::Success, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        pipeline
            .apply_callback(EventKind::Success, EventData::None, None)
            .await;
        assert_eq!(successes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let pipeline = pipeline();
        let destroys = Arc::new(AtomicUsize::new(0));
        let counter = destroys.clone();
        pipeline.emitter().on(EventKind::Destroy, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        pipeline.destroy();
        pipeline.destroy();
        assert_eq!(destroys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_terminal_event_keeps_pipeline_alive() {
        let pipeline = pipeline();
        pipeline
            .apply_callback(EventKind::Progress, EventData::None, None)
            .await;
        assert!(pipeline.is_in_progress());
    }
}
