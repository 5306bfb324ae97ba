//! Relay execution: run pipelines on a separate task ("worker side") and
//! drive them from the issuing side over typed channels.
//!
//! Messages are tagged unions keyed by a per-request correlation id. The
//! worker side is [`WorkerBridge`]; the issuing side plugs
//! [`RelayTransport`] into a [`Client`], so the whole pipeline surface
//! (chaining, interceptors, abort) works unchanged across the boundary.
//!
//! ```rust,ignore
//! let worker_client = Client::builder().transport(fake).build();
//! let (requests, replies) = WorkerBridge::spawn(worker_client);
//! let client = Client::builder()
//!     .transport(Arc::new(RelayTransport::new(requests, replies)))
//!     .build();
//! ```

use crate::client::Client;
use crate::config::{Attributes, RequestConfig};
use crate::events::{EventData, EventKind};
use crate::pipeline::RequestCollection;
use crate::transport::{
    HandleSnapshot, ReadyState, ResponseType, Transport, TransportEvent, TransportHandle,
    TransportRef,
};
use crate::wire::Payload;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// Issuing side → worker side.
#[derive(Debug)]
pub enum RelayRequest {
    Issue { id: Uuid, config: RequestConfig },
    Abort { id: Uuid },
}

/// Worker side → issuing side.
#[derive(Debug)]
pub enum RelayReply {
    Event {
        id: Uuid,
        kind: EventKind,
        data: EventData,
        snapshot: Option<HandleSnapshot>,
    },
    /// The worker-side pipeline was destroyed; no further events follow.
    Closed { id: Uuid },
}

/// Worker side of the relay: owns a client, runs relayed requests on it
/// and forwards every pipeline event back, tagged with the request's
/// correlation id.
pub struct WorkerBridge;

impl WorkerBridge {
    /// Spawns the bridge task. The returned sender/receiver pair is
    /// usually handed straight to [`RelayTransport::new`].
    pub fn spawn(client: Client) -> (UnboundedSender<RelayRequest>, UnboundedReceiver<RelayReply>) {
        let (request_tx, mut request_rx) = unbounded_channel();
        let (reply_tx, reply_rx) = unbounded_channel::<RelayReply>();
        tokio::spawn(async move {
            let active: Arc<DashMap<Uuid, Arc<RequestCollection>>> = Arc::new(DashMap::new());
            while let Some(message) = request_rx.recv().await {
                match message {
                    RelayRequest::Issue { id, config } => {
                        tracing::trace!(%id, url = %config.url, "relay issue");
                        match client.request(config) {
                            Ok(actions) => {
                                active.insert(id, actions.collection());
                                let pipeline = actions.pipeline().clone();
                                for kind in EventKind::RELAYED {
                                    let tx = reply_tx.clone();
                                    pipeline.emitter().on(kind, move |event| {
                                        let snapshot =
                                            event.handle.as_ref().map(HandleSnapshot::capture);
                                        let _ = tx.send(RelayReply::Event {
                                            id,
                                            kind: event.kind,
                                            data: event.data.clone(),
                                            snapshot,
                                        });
                                    });
                                }
                                let tx = reply_tx.clone();
                                let registry = active.clone();
                                pipeline.emitter().on(EventKind::Destroy, move |_| {
                                    registry.remove(&id);
                                    let _ = tx.send(RelayReply::Closed { id });
                                });
                            }
                            Err(error) => {
                                let _ = reply_tx.send(RelayReply::Event {
                                    id,
                                    kind: EventKind::Error,
                                    data: EventData::Fault(error.to_string()),
                                    snapshot: None,
                                });
                                let _ = reply_tx.send(RelayReply::Closed { id });
                            }
                        }
                    }
                    RelayRequest::Abort { id } => {
                        tracing::trace!(%id, "relay abort");
                        let collection = active.get(&id).map(|entry| entry.clone());
                        if let Some(collection) = collection {
                            collection.abort();
                        }
                    }
                }
            }
        });
        (request_tx, reply_rx)
    }
}

#[derive(Default)]
struct RelayState {
    config: RequestConfig,
    snapshot: HandleSnapshot,
}

struct RelayRoute {
    events: UnboundedSender<TransportEvent>,
    state: Arc<Mutex<RelayState>>,
}

/// Issuing side of the relay: a [`Transport`] whose handles buffer the
/// request configuration locally and ship it across the channel on send.
pub struct RelayTransport {
    requests: UnboundedSender<RelayRequest>,
    routes: Arc<DashMap<Uuid, RelayRoute>>,
}

impl RelayTransport {
    pub fn new(
        requests: UnboundedSender<RelayRequest>,
        mut replies: UnboundedReceiver<RelayReply>,
    ) -> Self {
        let routes: Arc<DashMap<Uuid, RelayRoute>> = Arc::new(DashMap::new());
        let router = routes.clone();
        tokio::spawn(async move {
            while let Some(reply) = replies.recv().await {
                match reply {
                    RelayReply::Event {
                        id,
                        kind,
                        data,
                        snapshot,
                    } => {
                        if let Some(route) = router.get(&id) {
                            if let Some(snapshot) = snapshot {
                                if let Ok(mut state) = route.state.lock() {
                                    state.snapshot = snapshot;
                                }
                            }
                            let _ = route.events.send(TransportEvent::Relayed { kind, data });
                        }
                    }
                    RelayReply::Closed { id } => {
                        router.remove(&id);
                    }
                }
            }
        });
        Self { requests, routes }
    }
}

impl Transport for RelayTransport {
    fn create_handle(&self) -> TransportRef {
        let id = Uuid::new_v4();
        let (tx, rx) = unbounded_channel();
        let state = Arc::new(Mutex::new(RelayState::default()));
        self.routes.insert(
            id,
            RelayRoute {
                events: tx.clone(),
                state: state.clone(),
            },
        );
        Arc::new(RelayHandle {
            id,
            requests: self.requests.clone(),
            routes: self.routes.clone(),
            sent: AtomicBool::new(false),
            state,
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }
}

/// Stand-in for a remote network operation. `open`, `set_request_header`
/// and `apply_attributes` accumulate into a request configuration; `send`
/// ships it; incoming replies update the snapshot the accessors serve.
pub struct RelayHandle {
    id: Uuid,
    requests: UnboundedSender<RelayRequest>,
    routes: Arc<DashMap<Uuid, RelayRoute>>,
    sent: AtomicBool,
    state: Arc<Mutex<RelayState>>,
    tx: UnboundedSender<TransportEvent>,
    rx: Mutex<Option<UnboundedReceiver<TransportEvent>>>,
}

impl TransportHandle for RelayHandle {
    fn subscribe(&self) -> Option<UnboundedReceiver<TransportEvent>> {
        self.rx.lock().ok().and_then(|mut rx| rx.take())
    }

    fn apply_attributes(&self, attributes: &Attributes) {
        if let Ok(mut state) = self.state.lock() {
            state.config.attributes = attributes.merged_over(&state.config.attributes);
        }
    }

    fn open(&self, method: &http::Method, url: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.config.method = Some(method.clone());
            state.config.url = url.to_owned();
            state.snapshot.ready_state = ReadyState::Opened;
        }
        let _ = self.tx.send(TransportEvent::ReadyStateChange);
    }

    fn set_request_header(&self, name: &str, value: &str) {
        if let Ok(mut state) = self.state.lock() {
            state
                .config
                .headers
                .push((name.to_owned(), Some(value.to_owned())));
        }
    }

    fn send(&self, body: Option<Bytes>) {
        self.sent.store(true, Ordering::SeqCst);
        let config = match self.state.lock() {
            Ok(mut state) => {
                state.config.data = body.map(Payload::Bytes);
                state.config.clone()
            }
            Err(_) => return,
        };
        if self
            .requests
            .send(RelayRequest::Issue {
                id: self.id,
                config,
            })
            .is_err()
        {
            tracing::debug!(id = %self.id, "relay channel closed");
            let _ = self.tx.send(TransportEvent::Error);
        }
    }

    fn abort(&self) {
        // Not shipped yet: the worker never saw this request, so there is
        // nothing to abort there. Just retire the route.
        if !self.sent.load(Ordering::SeqCst) {
            self.routes.remove(&self.id);
            return;
        }
        let _ = self.requests.send(RelayRequest::Abort { id: self.id });
    }

    fn ready_state(&self) -> ReadyState {
        self.state
            .lock()
            .map(|state| state.snapshot.ready_state)
            .unwrap_or_default()
    }

    fn status(&self) -> u16 {
        self.state
            .lock()
            .map(|state| state.snapshot.status)
            .unwrap_or(0)
    }

    fn status_text(&self) -> Option<String> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.snapshot.status_text.clone())
    }

    fn response_text(&self) -> Option<String> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.snapshot.response_text.clone())
    }

    fn response_bytes(&self) -> Option<Bytes> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.snapshot.response_bytes.clone())
    }

    fn response_header(&self, _name: &str) -> Option<String> {
        // Response headers are not part of the relayed snapshot.
        None
    }

    fn response_type(&self) -> ResponseType {
        self.state
            .lock()
            .map(|state| state.snapshot.response_type)
            .unwrap_or_default()
    }
}
