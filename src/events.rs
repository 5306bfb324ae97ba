//! Minimal per-instance event emitter backing the pipeline lifecycle.
//!
//! Stateful entities that need events own an [`EventEmitter`] instance and
//! delegate to it; there is no inheritance or global listener registry.

use crate::transport::{ReadyState, TransportRef};
use crate::wire::response::ResponseData;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Every event a pipeline can dispatch to its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EventKind {
    Request,
    Success,
    Error,
    Abort,
    Timeout,
    Load,
    LoadStart,
    LoadEnd,
    Progress,
    ReadyStateChange,
    Destroy,
}

/// Interceptor categories. Each [`EventKind`] maps to at most one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptorKind {
    Request,
    Response,
    ResponseError,
    Abort,
}

impl EventKind {
    /// Static event-to-interceptor table. Events without a category are
    /// dispatched without any interceptor involvement; note that `Timeout`
    /// deliberately has none.
    pub const fn interceptor_kind(self) -> Option<InterceptorKind> {
        match self {
            EventKind::Request => Some(InterceptorKind::Request),
            EventKind::Success => Some(InterceptorKind::Response),
            EventKind::Error => Some(InterceptorKind::ResponseError),
            EventKind::Abort => Some(InterceptorKind::Abort),
            _ => None,
        }
    }

    /// Terminal kinds destroy the pipeline after dispatch; exactly one of
    /// them fires per pipeline.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            EventKind::Success | EventKind::Error | EventKind::Abort | EventKind::Timeout
        )
    }

    /// The kinds a relay bridge forwards across the channel boundary.
    pub(crate) const RELAYED: [EventKind; 10] = [
        EventKind::Request,
        EventKind::Success,
        EventKind::Error,
        EventKind::Abort,
        EventKind::Timeout,
        EventKind::Load,
        EventKind::LoadStart,
        EventKind::LoadEnd,
        EventKind::Progress,
        EventKind::ReadyStateChange,
    ];
}

/// Payload attached to a dispatched event.
#[derive(Debug, Clone, Default)]
pub enum EventData {
    #[default]
    None,
    /// Response body (success/error outcomes), possibly transformed by an
    /// own interceptor.
    Body(ResponseData),
    /// The encoded request body, carried by the `Request` event.
    Sent(Option<Bytes>),
    /// Transfer progress (`LoadStart`, `Progress`, `Load`, `LoadEnd`).
    Progress { loaded: u64, total: Option<u64> },
    /// Readiness transition (`ReadyStateChange`).
    State(ReadyState),
    /// A synchronous failure redirected into the `Error` event, e.g. a
    /// continuation producing an unusable next configuration.
    Fault(String),
}

/// What listeners receive: the kind, its payload and the transport handle
/// the event originated from (absent for synthesized outcomes such as an
/// abort of a never-opened request).
#[derive(Clone)]
pub struct PipelineEvent {
    pub kind: EventKind,
    pub data: EventData,
    pub handle: Option<TransportRef>,
}

pub type Listener = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Identifies one registration so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to `kind` and returns its registration id.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners
                .entry(kind)
                .or_default()
                .push((id, Arc::new(listener)));
        }
        id
    }

    /// Removes one registration. Returns whether anything was removed.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let Ok(mut listeners) = self.listeners.lock() else {
            return false;
        };
        match listeners.get_mut(&kind) {
            Some(registered) => {
                let before = registered.len();
                registered.retain(|(registered_id, _)| *registered_id != id);
                registered.len() != before
            }
            None => false,
        }
    }

    /// Dispatches `event` to every listener registered for its kind. The
    /// listener list is snapshotted first, so listeners may subscribe or
    /// unsubscribe while the dispatch is running.
    pub fn emit(&self, event: &PipelineEvent) {
        let snapshot: Vec<Listener> = match self.listeners.lock() {
            Ok(listeners) => listeners
                .get(&event.kind)
                .map(|registered| registered.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        for listener in snapshot {
            listener(event);
        }
    }

    /// Drops every listener for one kind.
    pub fn remove_kind(&self, kind: EventKind) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.remove(&kind);
        }
    }

    /// Drops every listener of every kind.
    pub fn remove_all(&self) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.clear();
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .listeners
            .lock()
            .map(|l| l.values().map(Vec::len).sum::<usize>())
            .unwrap_or(0);
        f.debug_struct("EventEmitter")
            .field("listeners", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(kind: EventKind) -> PipelineEvent {
        PipelineEvent {
            kind,
            data: EventData::None,
            handle: None,
        }
    }

    #[test]
    fn test_dispatches_to_registered_listener() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        emitter.on(EventKind::Success, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        emitter.emit(&event(EventKind::Success));
        emitter.emit(&event(EventKind::Success));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_other_kinds_do_not_fire() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        emitter.on(EventKind::Success, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        emitter.emit(&event(EventKind::Error));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_off_removes_single_registration() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let first = hits.clone();
        let second = hits.clone();
        let id = emitter.on(EventKind::Progress, move |_| {
            first.fetch_add(1, Ordering::SeqCst);
        });
        emitter.on(EventKind::Progress, move |_| {
            second.fetch_add(10, Ordering::SeqCst);
        });
        assert!(emitter.off(EventKind::Progress, id));
        assert!(!emitter.off(EventKind::Progress, id));
        emitter.emit(&event(EventKind::Progress));
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_remove_all_detaches_everything() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for kind in [EventKind::Success, EventKind::Error, EventKind::Destroy] {
            let counter = hits.clone();
            emitter.on(kind, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        emitter.remove_all();
        emitter.emit(&event(EventKind::Success));
        emitter.emit(&event(EventKind::Error));
        emitter.emit(&event(EventKind::Destroy));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_may_unsubscribe_during_dispatch() {
        let emitter = Arc::new(EventEmitter::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let inner = emitter.clone();
        let id_slot = Arc::new(Mutex::new(None));
        let slot = id_slot.clone();
        let id = emitter.on(EventKind::LoadEnd, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Ok(guard) = slot.lock() {
                if let Some(id) = *guard {
                    inner.off(EventKind::LoadEnd, id);
                }
            }
        });
        if let Ok(mut guard) = id_slot.lock() {
            *guard = Some(id);
        }
        emitter.emit(&event(EventKind::LoadEnd));
        emitter.emit(&event(EventKind::LoadEnd));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_terminal_kind_table() {
        assert!(EventKind::Success.is_terminal());
        assert!(EventKind::Error.is_terminal());
        assert!(EventKind::Abort.is_terminal());
        assert!(EventKind::Timeout.is_terminal());
        assert!(!EventKind::Load.is_terminal());
        assert!(!EventKind::LoadEnd.is_terminal());
        assert!(!EventKind::Destroy.is_terminal());
    }

    #[test]
    fn test_interceptor_kind_table() {
        assert_eq!(
            EventKind::Request.interceptor_kind(),
            Some(InterceptorKind::Request)
        );
        assert_eq!(
            EventKind::Success.interceptor_kind(),
            Some(InterceptorKind::Response)
        );
        assert_eq!(
            EventKind::Error.interceptor_kind(),
            Some(InterceptorKind::ResponseError)
        );
        assert_eq!(
            EventKind::Abort.interceptor_kind(),
            Some(InterceptorKind::Abort)
        );
        assert_eq!(EventKind::Timeout.interceptor_kind(), None);
        assert_eq!(EventKind::Progress.interceptor_kind(), None);
    }
}
