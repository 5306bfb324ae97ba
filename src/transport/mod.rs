//! Host network transport contract.
//!
//! The pipeline core never talks to a network directly; it drives anything
//! that satisfies [`Transport`]/[`TransportHandle`]: a readiness state
//! machine plus a stream of lifecycle events. [`http::HttpTransport`] is
//! the hyper-backed implementation, [`fake::FakeTransport`] the in-memory
//! test double, and [`crate::worker::RelayTransport`] forwards the same
//! contract across a channel boundary.

use crate::config::Attributes;
use crate::events::{EventData, EventKind};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

pub mod fake;
pub mod http;

/// Request readiness machine, in transition order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize,
)]
pub enum ReadyState {
    #[default]
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
}

/// How the response body should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum ResponseType {
    /// Text that is auto-parsed as JSON when possible.
    #[default]
    Default,
    /// Raw text, never parsed.
    Text,
    /// Opaque bytes, never decoded as text.
    Bytes,
}

/// Lifecycle notifications emitted by a handle, consumed by the job task.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    ReadyStateChange,
    LoadStart { loaded: u64, total: Option<u64> },
    Progress { loaded: u64, total: Option<u64> },
    Load { loaded: u64, total: Option<u64> },
    LoadEnd { loaded: u64, total: Option<u64> },
    Error,
    Timeout,
    Abort,
    /// An already-classified pipeline event forwarded by a relay handle.
    /// Relay handles emit these instead of the raw lifecycle events above.
    Relayed { kind: EventKind, data: EventData },
}

/// Creates fresh handles; one handle serves exactly one request.
pub trait Transport: Send + Sync {
    fn create_handle(&self) -> TransportRef;
}

/// One in-flight (or not-yet-opened) network operation.
pub trait TransportHandle: Send + Sync {
    /// Takes the event stream. Yields `None` once taken before.
    fn subscribe(&self) -> Option<UnboundedReceiver<TransportEvent>>;

    /// Applies merged attributes (response type, timeout) before opening.
    fn apply_attributes(&self, attributes: &Attributes);

    fn open(&self, method: &::http::Method, url: &str);

    fn set_request_header(&self, name: &str, value: &str);

    fn send(&self, body: Option<Bytes>);

    /// Aborts the operation. A no-op before `open`.
    fn abort(&self);

    fn ready_state(&self) -> ReadyState;

    /// HTTP status, `0` until headers arrive.
    fn status(&self) -> u16;

    fn status_text(&self) -> Option<String>;

    /// Response text; `None` for the `Bytes` response type.
    fn response_text(&self) -> Option<String>;

    fn response_bytes(&self) -> Option<Bytes>;

    fn response_header(&self, name: &str) -> Option<String>;

    fn response_type(&self) -> ResponseType;
}

pub type TransportRef = Arc<dyn TransportHandle>;

/// Point-in-time copy of a handle's observable surface, used when relaying
/// events across a channel boundary.
#[derive(Debug, Clone, Default)]
pub struct HandleSnapshot {
    pub ready_state: ReadyState,
    pub status: u16,
    pub status_text: Option<String>,
    pub response_text: Option<String>,
    pub response_bytes: Option<Bytes>,
    pub response_type: ResponseType,
}

impl HandleSnapshot {
    pub fn capture(handle: &TransportRef) -> Self {
        Self {
            ready_state: handle.ready_state(),
            status: handle.status(),
            status_text: handle.status_text(),
            response_text: handle.response_text(),
            response_bytes: handle.response_bytes(),
            response_type: handle.response_type(),
        }
    }
}
