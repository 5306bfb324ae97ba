//! Hyper-backed transport.
//!
//! Drives one plain-HTTP request per handle through the hyper legacy
//! client and translates its progress into the transport event contract.
//! URLs must be absolute; a URL that does not parse surfaces as an
//! asynchronous `Error` event, like any other transport failure.

use crate::config::Attributes;
use crate::transport::{
    ReadyState, ResponseType, Transport, TransportEvent, TransportHandle, TransportRef,
};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

pub struct HttpTransport {
    client: HyperClient<HttpConnector, Full<Bytes>>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: HyperClient::builder(TokioExecutor::new()).build_http(),
        }
    }
}

impl Transport for HttpTransport {
    fn create_handle(&self) -> TransportRef {
        let (tx, rx) = unbounded_channel();
        Arc::new(HttpHandle {
            client: self.client.clone(),
            state: Arc::new(Mutex::new(HttpState::default())),
            tx,
            rx: Mutex::new(Some(rx)),
            abort_gate: Arc::new(Notify::new()),
            aborted: Arc::new(AtomicBool::new(false)),
            sending: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[derive(Debug)]
struct HttpState {
    ready_state: ReadyState,
    method: http::Method,
    url: String,
    request_headers: Vec<(String, String)>,
    response_headers: HashMap<String, String>,
    status: u16,
    status_text: Option<String>,
    response_text: Option<String>,
    response_bytes: Option<Bytes>,
    response_type: Option<ResponseType>,
    timeout: Option<Duration>,
}

impl Default for HttpState {
    fn default() -> Self {
        Self {
            ready_state: ReadyState::Unsent,
            method: http::Method::GET,
            url: String::new(),
            request_headers: Vec::new(),
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

pub struct HttpHandle {
    client: HyperClient<HttpConnector, Full<Bytes>>,
    state: Arc<Mutex<HttpState>>,
    tx: UnboundedSender<TransportEvent>,
    rx: Mutex<Option<UnboundedReceiver<TransportEvent>>>,
    abort_gate: Arc<Notify>,
    aborted: Arc<AtomicBool>,
    sending: Arc<AtomicBool>,
}

fn set_ready(
    state: &Arc<Mutex<HttpState>>,
    tx: &UnboundedSender<TransportEvent>,
    ready_state: ReadyState,
) {
    if let Ok(mut guard) = state.lock() {
        guard.ready_state = ready_state;
    }
    let _ = tx.send(TransportEvent::ReadyStateChange);
}

fn emit_failure(tx: &UnboundedSender<TransportEvent>) {
    let _ = tx.send(TransportEvent::Error);
    let _ = tx.send(TransportEvent::LoadEnd {
        loaded: 0,
        total: None,
    });
}

fn emit_abort(state: &Arc<Mutex<HttpState>>, tx: &UnboundedSender<TransportEvent>) {
    if let Ok(mut guard) = state.lock() {
        guard.ready_state = ReadyState::Unsent;
    }
    let _ = tx.send(TransportEvent::Abort);
    let _ = tx.send(TransportEvent::LoadEnd {
        loaded: 0,
        total: None,
    });
}

/// Sleeps until `deadline`, or forever when there is none. Used as a
/// select branch so the timeout covers both headers and body.
async fn deadline_elapsed(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}

impl TransportHandle for HttpHandle {
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
                .push((name.to_lowercase(), value.to_owned()));
        }
    }

    fn send(&self, body: Option<Bytes>) {
        self.sending.store(true, Ordering::SeqCst);
        let client = self.client.clone();
        let state = self.state.clone();
        let tx = self.tx.clone();
        let abort_gate = self.abort_gate.clone();
        tokio::spawn(async move {
            let _ = tx.send(TransportEvent::LoadStart {
                loaded: 0,
                total: None,
            });
            let (method, url, headers, timeout) = match state.lock() {
                Ok(guard) => (
                    guard.method.clone(),
                    guard.url.clone(),
                    guard.request_headers.clone(),
                    guard.timeout,
                ),
                Err(_) => return,
            };
            let uri: http::Uri = match url.parse() {
                Ok(uri) => uri,
                Err(error) => {
                    tracing::debug!(url = %url, error = %error, "unusable request URL");
                    emit_failure(&tx);
                    return;
                }
            };
            let mut builder = http::Request::builder().method(method).uri(uri);
            for (name, value) in &headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            let request = match builder.body(Full::new(body.unwrap_or_default())) {
                Ok(request) => request,
                Err(error) => {
                    tracing::debug!(error = %error, "failed to build request");
                    emit_failure(&tx);
                    return;
                }
            };

            let deadline = timeout.map(|limit| tokio::time::Instant::now() + limit);
            let response = tokio::select! {
                _ = abort_gate.notified() => {
                    emit_abort(&state, &tx);
                    return;
                }
                _ = deadline_elapsed(deadline) => {
                    let _ = tx.send(TransportEvent::Timeout);
                    let _ = tx.send(TransportEvent::LoadEnd { loaded: 0, total: None });
                    return;
                }
                result = client.request(request) => match result {
                    Ok(response) => response,
                    Err(error) => {
                        tracing::debug!(error = %error, "request failed");
                        emit_failure(&tx);
                        return;
                    }
                }
            };

            let status = response.status();
            let total = response
                .headers()
                .get(http::header::CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            if let Ok(mut guard) = state.lock() {
                guard.status = status.as_u16();
                guard.status_text = status.canonical_reason().map(str::to_owned);
                guard.response_headers = response
                    .headers()
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .to_str()
                            .ok()
                            .map(|value| (name.as_str().to_lowercase(), value.to_owned()))
                    })
                    .collect();
            }
            set_ready(&state, &tx, ReadyState::HeadersReceived);
            set_ready(&state, &tx, ReadyState::Loading);

            let mut body_stream = response.into_body();
            let mut collected: Vec<u8> = Vec::new();
            loop {
                let frame = tokio::select! {
                    _ = abort_gate.notified() => {
                        emit_abort(&state, &tx);
                        return;
                    }
                    _ = deadline_elapsed(deadline) => {
                        let _ = tx.send(TransportEvent::Timeout);
                        let _ = tx.send(TransportEvent::LoadEnd { loaded: 0, total: None });
                        return;
                    }
                    frame = body_stream.frame() => frame,
                };
                match frame {
                    None => break,
                    Some(Ok(frame)) => {
                        if let Some(data) = frame.data_ref() {
                            collected.extend_from_slice(data);
                            let _ = tx.send(TransportEvent::Progress {
                                loaded: collected.len() as u64,
                                total,
                            });
                        }
                    }
                    Some(Err(error)) => {
                        tracing::debug!(error = %error, "response body failed");
                        emit_failure(&tx);
                        return;
                    }
                }
            }

            let loaded = collected.len() as u64;
            let bytes = Bytes::from(collected);
            if let Ok(mut guard) = state.lock() {
                if guard.response_type.unwrap_or_default() != ResponseType::Bytes {
                    guard.response_text = Some(String::from_utf8_lossy(&bytes).into_owned());
                }
                guard.response_bytes = Some(bytes);
            }
            set_ready(&state, &tx, ReadyState::Done);
            let _ = tx.send(TransportEvent::Load { loaded, total });
            let _ = tx.send(TransportEvent::LoadEnd { loaded, total });
        });
    }

    fn abort(&self) {
        if self.ready_state() == ReadyState::Unsent {
            return;
        }
        if self.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.sending.load(Ordering::SeqCst) {
            self.abort_gate.notify_one();
        } else {
            emit_abort(&self.state, &self.tx);
        }
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
        self.state
            .lock()
            .ok()
            .and_then(|state| state.response_text.clone())
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
