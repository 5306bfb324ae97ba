//! Ordered set of in-flight handles belonging to one pipeline.

use crate::transport::TransportRef;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Clone)]
enum Entry {
    /// A live network operation.
    Handle(TransportRef),
    /// A pending pre-open gate; waking it lets the job task observe the
    /// aborted flag and synthesize the abort outcome, since a request that
    /// never opens fires no native abort event.
    Gate(u64, Arc<Notify>),
}

/// All handles issued under one pipeline, in issue order, with bulk abort.
#[derive(Default)]
pub struct RequestCollection {
    entries: Mutex<Vec<Entry>>,
    aborted: AtomicBool,
    next_gate: AtomicU64,
}

impl RequestCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_handle(&self, handle: TransportRef) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Entry::Handle(handle));
        }
    }

    pub(crate) fn push_gate(&self, gate: Arc<Notify>) -> u64 {
        let id = self.next_gate.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Entry::Gate(id, gate));
        }
        id
    }

    /// Removes a gate once the open went through; the live handle entry
    /// stays behind.
    pub(crate) fn clear_gate(&self, id: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|entry| !matches!(entry, Entry::Gate(gate_id, _) if *gate_id == id));
        }
    }

    /// Splices another collection's entries onto this one, preserving
    /// order. Used when one pipeline is merged into another.
    pub fn merge(&self, other: &RequestCollection) {
        let spliced = match other.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(_) => return,
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.extend(spliced);
        }
    }

    /// Aborts every handle currently in the collection and wakes every
    /// pending gate. Idempotent: the second and later calls do nothing.
    /// The flag is permanent.
    pub fn abort(&self) {
        if self.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        let snapshot = match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(_) => return,
        };
        for entry in snapshot {
            match entry {
                Entry::Handle(handle) => handle.abort(),
                Entry::Gate(_, gate) => gate.notify_one(),
            }
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Number of live handles (pending gates excluded).
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| matches!(entry, Entry::Handle(_)))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
