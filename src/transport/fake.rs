//! In-memory transport for tests.
//!
//! Responses are programmed up front, keyed by a fingerprint of the
//! request (method, URL as opened, canonicalized body). Replay is
//! asynchronous: events flow through the same channel contract as the
//! real transport, after an optional artificial delay.

use crate::config::Attributes;
use crate::transport::{
    ReadyState, ResponseType, Transport, TransportEvent, TransportHandle, TransportRef,
};
use bytes::Bytes;
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// What a programmed request must look like to match.
#[derive(Debug, Clone)]
pub struct ExpectedRequest {
    pub url: String,
    pub method: http::Method,
    pub data: Option<Value>,
    /// Request headers that must be present; a mismatch replays a 400.
    pub headers: HashMap<String, String>,
    /// Artificial time before the response is delivered.
    pub delay: Duration,
}

impl ExpectedRequest {
    /// Expects a GET of `url` (including any query string) with no body.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: http::Method::GET,
            data: None,
            headers: HashMap::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn method(mut self, method: http::Method) -> Self {
        self.method = method;
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// The reply to play back.
#[derive(Debug, Clone)]
pub struct ProgrammedResponse {
    pub status: u16,
    pub status_text: Option<String>,
    pub data: Value,
    pub response_type: ResponseType,
    pub headers: HashMap<String, String>,
    /// How many times this entry may match before it is consumed.
    pub times: u32,
}

impl Default for ProgrammedResponse {
    fn default() -> Self {
        Self {
            status: 200,
            status_text: None,
            data: Value::Null,
            response_type: ResponseType::Default,
            headers: HashMap::new(),
            times: 1,
        }
    }
}

impl ProgrammedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn times(mut self, times: u32) -> Self {
        self.times = times.max(1);
        self
    }
}

#[derive(Clone)]
struct Programmed {
    required_headers: HashMap<String, String>,
    delay: Duration,
    response: ProgrammedResponse,
    remaining: u32,
}

struct FakeShared {
    responses: DashMap<String, Programmed>,
    opens: AtomicUsize,
    sends: AtomicUsize,
}

/// The transport test double. Clone-cheap via an internal `Arc`.
#[derive(Clone)]
pub struct FakeTransport {
    shared: Arc<FakeShared>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(FakeShared {
                responses: DashMap::new(),
                opens: AtomicUsize::new(0),
                sends: AtomicUsize::new(0),
            }),
        }
    }

    /// Programs a response and returns the fingerprint it is stored under.
    pub fn expect(&self, request: ExpectedRequest, response: ProgrammedResponse) -> String {
        let canonical = request.data.as_ref().map(Value::to_string);
        let key = fingerprint(request.method.as_str(), &request.url, canonical.as_deref());
        self.shared.responses.insert(
            key.clone(),
            Programmed {
                required_headers: request.headers,
                delay: request.delay,
                remaining: response.times,
                response,
            },
        );
        key
    }

    /// How many handles have been opened. Useful for asserting that an
    /// abort suppressed an open entirely.
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.shared.sends.load(Ordering::SeqCst)
    }
}

impl Transport for FakeTransport {
    fn create_handle(&self) -> TransportRef {
        let (tx, rx) = unbounded_channel();
        Arc::new(FakeHandle {
            shared: self.shared.clone(),
            state: Arc::new(Mutex::new(FakeState::default())),
            aborted: Arc::new(AtomicBool::new(false)),
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }
}

impl FakeShared {
    /// Pops one use of the programmed response for `key`.
    fn take(&self, key: &str) -> Option<Programmed> {
        let programmed = {
            let mut entry = self.responses.get_mut(key)?;
            entry.remaining = entry.remaining.saturating_sub(1);
            entry.clone()
        };
        if programmed.remaining == 0 {
            self.responses.remove(key);
        }
        Some(programmed)
    }
}

#[derive(Debug)]
struct FakeState {
    ready_state: ReadyState,
    method: http::Method,
    url: String,
    request_headers: HashMap<String, String>,
    response_headers: HashMap<String, String>,
    status: u16,
    status_text: Option<String>,
    response_text: Option<String>,
    response_bytes: Option<Bytes>,
    response_type: Option<ResponseType>,
    timeout: Option<Duration>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            ready_state: ReadyState::Unsent,
            method: http::Method::GET,
            url: String::new(),
            request_headers: HashMap::new(),
            response_headers: HashMap::new(),
            status: 0,
            status_text: None,
            response_text: None,
            response_bytes: None,
            response_type: None,
            timeout: None,
        }
    }
}

pub struct FakeHandle {
    shared: Arc<FakeShared>,
    state: Arc<Mutex<FakeState>>,
    aborted: Arc<AtomicBool>,
    tx: UnboundedSender<TransportEvent>,
    rx: Mutex<Option<UnboundedReceiver<TransportEvent>>>,
}

fn set_ready(
    state: &Arc<Mutex<FakeState>>,
    tx: &UnboundedSender<TransportEvent>,
    ready_state: ReadyState,
) {
    if let Ok(mut guard) = state.lock() {
        guard.ready_state = ready_state;
    }
    let _ = tx.send(TransportEvent::ReadyStateChange);
}

fn headers_match(required: &HashMap<String, String>, sent: &HashMap<String, String>) -> bool {
    required
        .iter()
        .all(|(name, value)| sent.get(name).is_some_and(|sent_value| sent_value == value))
}

impl TransportHandle for FakeHandle {
    fn subscribe(&self) -> Option<UnboundedReceiver<TransportEvent>> {
        self.rx.lock().ok().and_then(|mut rx| rx.take())
    }

    fn apply_attributes(&self, attributes: &Attributes) {
        if let Ok(mut state) = self.state.lock() {
            if attributes.response_type.is_some() {
                state.response_type = attributes.response_type;
            }
            if attributes.timeout.is_some() {
                state.timeout = attributes.timeout;
            }
        }
    }

    fn open(&self, method: &http::Method, url: &str) {
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut state) = self.state.lock() {
            state.method = method.clone();
            state.url = url.to_owned();
        }
        set_ready(&self.state, &self.tx, ReadyState::Opened);
    }

    fn set_request_header(&self, name: &str, value: &str) {
        if let Ok(mut state) = self.state.lock() {
            state
                .request_headers
                .insert(name.to_lowercase(), value.to_owned());
        }
    }

    fn send(&self, body: Option<Bytes>) {
        self.shared.sends.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(TransportEvent::LoadStart {
            loaded: 0,
            total: None,
        });
        let (key, timeout) = match self.state.lock() {
            Ok(state) => {
                let text = body
                    .as_ref()
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
                (
                    fingerprint(state.method.as_str(), &state.url, text.as_deref()),
                    state.timeout,
                )
            }
            Err(_) => return,
        };
        match self.shared.take(&key) {
            None => {
                set_ready(&self.state, &self.tx, ReadyState::HeadersReceived);
                if let Ok(mut state) = self.state.lock() {
                    state.status = 404;
                    state.status_text = Some("Not Found".to_owned());
                    state.response_text = Some("data not found".to_owned());
                    state.response_bytes = Some(Bytes::from_static(b"data not found"));
                }
                set_ready(&self.state, &self.tx, ReadyState::Done);
                let _ = self.tx.send(TransportEvent::Load {
                    loaded: 0,
                    total: Some(0),
                });
                let _ = self.tx.send(TransportEvent::LoadEnd {
                    loaded: 0,
                    total: Some(0),
                });
            }
            Some(programmed) => {
                if !headers_match(&programmed.required_headers, &self.request_headers()) {
                    set_ready(&self.state, &self.tx, ReadyState::HeadersReceived);
                    if let Ok(mut state) = self.state.lock() {
                        state.status = 400;
                        state.status_text = Some("Bad Request".to_owned());
                        state.response_text = Some("headers not the same".to_owned());
                        state.response_bytes = Some(Bytes::from_static(b"headers not the same"));
                    }
                    set_ready(&self.state, &self.tx, ReadyState::Done);
                    let _ = self.tx.send(TransportEvent::Error);
                    let _ = self.tx.send(TransportEvent::LoadEnd {
                        loaded: 0,
                        total: None,
                    });
                    return;
                }
                if let Ok(mut state) = self.state.lock() {
                    state.response_headers = programmed.response.headers.clone();
                }
                set_ready(&self.state, &self.tx, ReadyState::HeadersReceived);
                set_ready(&self.state, &self.tx, ReadyState::Loading);
                let state = self.state.clone();
                let tx = self.tx.clone();
                let aborted = self.aborted.clone();
                tokio::spawn(async move {
                    if let Some(timeout) = timeout {
                        if timeout <= programmed.delay {
                            tokio::time::sleep(timeout).await;
                            if !aborted.load(Ordering::SeqCst) {
                                let _ = tx.send(TransportEvent::Timeout);
                                let _ = tx.send(TransportEvent::LoadEnd {
                                    loaded: 0,
                                    total: None,
                                });
                            }
                            return;
                        }
                    }
                    tokio::time::sleep(programmed.delay).await;
                    if aborted.load(Ordering::SeqCst) {
                        return;
                    }
                    let text = programmed.response.data.to_string();
                    let total = text.len() as u64;
                    if let Ok(mut guard) = state.lock() {
                        let effective = guard
                            .response_type
                            .unwrap_or(programmed.response.response_type);
                        guard.response_type = Some(effective);
                        guard.response_bytes = Some(Bytes::from(text.clone()));
                        guard.response_text = Some(text);
                        guard.status = programmed.response.status;
                        guard.status_text = programmed.response.status_text.clone().or_else(|| {
                            http::StatusCode::from_u16(programmed.response.status)
                                .ok()
                                .and_then(|code| code.canonical_reason())
                                .map(str::to_owned)
                        });
                    }
                    let _ = tx.send(TransportEvent::Progress {
                        loaded: total,
                        total: Some(total),
                    });
                    set_ready(&state, &tx, ReadyState::Done);
                    let _ = tx.send(TransportEvent::Load {
                        loaded: total,
                        total: Some(total),
                    });
                    let _ = tx.send(TransportEvent::LoadEnd {
                        loaded: total,
                        total: Some(total),
                    });
                });
            }
        }
    }

    fn abort(&self) {
        let was_sent = self
            .state
            .lock()
            .map(|state| state.ready_state != ReadyState::Unsent)
            .unwrap_or(false);
        if !was_sent {
            return;
        }
        self.aborted.store(true, Ordering::SeqCst);
        if let Ok(mut state) = self.state.lock() {
            state.ready_state = ReadyState::Unsent;
        }
        let _ = self.tx.send(TransportEvent::Abort);
        let _ = self.tx.send(TransportEvent::LoadEnd {
            loaded: 0,
            total: None,
        });
    }

    fn ready_state(&self) -> ReadyState {
        self.state
            .lock()
            .map(|state| state.ready_state)
            .unwrap_or(ReadyState::Unsent)
    }

    fn status(&self) -> u16 {
        self.state.lock().map(|state| state.status).unwrap_or(0)
    }

    fn status_text(&self) -> Option<String> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.status_text.clone())
    }

    fn response_text(&self) -> Option<String> {
        self.state.lock().ok().and_then(|state| {
            if state.response_type == Some(ResponseType::Bytes) {
                None
            } else {
                state.response_text.clone()
            }
        })
    }

    fn response_bytes(&self) -> Option<Bytes> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.response_bytes.clone())
    }

    fn response_header(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.response_headers.get(&name.to_lowercase()).cloned())
    }

    fn response_type(&self) -> ResponseType {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.response_type)
            .unwrap_or_default()
    }
}

impl FakeHandle {
    fn request_headers(&self) -> HashMap<String, String> {
        self.state
            .lock()
            .map(|state| state.request_headers.clone())
            .unwrap_or_default()
    }
}

/// Canonical request fingerprint. Bodies that parse as JSON are
/// re-serialized (serde_json orders object keys), so key order in the
/// caller's payload does not matter; array order stays significant.
fn fingerprint(method: &str, url: &str, body: Option<&str>) -> String {
    let canonical = body
        .map(|text| match serde_json::from_str::<Value>(text) {
            Ok(value) => value.to_string(),
            Err(_) => text.to_owned(),
        })
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(url.as_bytes());
    hasher.update(canonical.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
