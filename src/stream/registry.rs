//! Registry of live event-stream clients, keyed by session id.

use super::StreamEvent;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub type SinkSender = mpsc::UnboundedSender<StreamEvent>;

#[derive(Debug)]
struct StreamSink {
    registration: u64,
    tx: SinkSender,
    registered_at: DateTime<Utc>,
}

/// Process-wide map of session id to the client currently listening on it.
/// A session has at most one sink; a later `register` replaces the earlier one.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    sinks: DashMap<String, StreamSink>,
    next_registration: AtomicU64,
    registered: AtomicU64,
    released: AtomicU64,
}

/// Registration/release counters, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub registered: u64,
    pub released: u64,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tx` as the sink for `session_id`. The returned guard
    /// releases the registration when dropped.
    pub fn register(self: &Arc<Self>, session_id: impl Into<String>, tx: SinkSender) -> SinkGuard {
        let session_id = session_id.into();
        let registration = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let sink = StreamSink {
            registration,
            tx,
            registered_at: Utc::now(),
        };

        if self.sinks.insert(session_id.clone(), sink).is_some() {
            info!("Replaced existing stream client for session {}", session_id);
        } else {
            debug!("Registered stream client for session {}", session_id);
        }
        self.registered.fetch_add(1, Ordering::Relaxed);

        SinkGuard {
            registry: Arc::clone(self),
            session_id,
            registration,
        }
    }

    /// Sends `event` to the session's sink. Returns whether it was delivered;
    /// a missing or disconnected client is not an error.
    pub fn emit(&self, session_id: &str, event: StreamEvent) -> bool {
        let Some(sink) = self.sinks.get(session_id) else {
            debug!("No stream client for session {}, dropping {} event", session_id, event.name());
            return false;
        };

        let name = event.name();
        match sink.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                debug!("Stream client for session {} is gone, dropping {} event", session_id, name);
                false
            }
        }
    }

    pub fn emit_metadata(&self, session_id: &str, payload: Value) -> bool {
        self.emit(session_id, StreamEvent::Metadata(payload))
    }

    pub fn emit_error(&self, session_id: &str, message: impl Into<String>) -> bool {
        self.emit(session_id, StreamEvent::Error(message.into()))
    }

    /// Removes whatever sink is registered for `session_id`. Idempotent.
    pub fn remove(&self, session_id: &str) {
        if let Some((_, sink)) = self.sinks.remove(session_id) {
            log_removal(session_id, &sink);
        }
    }

    pub fn is_registered(&self, session_id: &str) -> bool {
        self.sinks.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            registered: self.registered.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }

    /// Removes the sink only if it is still the one from `registration`.
    fn release(&self, session_id: &str, registration: u64) {
        if let Some((_, sink)) = self
            .sinks
            .remove_if(session_id, |_, sink| sink.registration == registration)
        {
            log_removal(session_id, &sink);
        }
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

fn log_removal(session_id: &str, sink: &StreamSink) {
    let held_ms = (Utc::now() - sink.registered_at).num_milliseconds();
    debug!("Removed stream client for session {} after {}ms", session_id, held_ms);
}

/// Owns one registration in a [`StreamRegistry`].
#[derive(Debug)]
pub struct SinkGuard {
    registry: Arc<StreamRegistry>,
    session_id: String,
    registration: u64,
}

impl SinkGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        self.registry.release(&self.session_id, self.registration);
    }
}
