//! Push channel for phase-change notifications.
//!
//! The transport that fans these out to connected clients (websocket,
//! long-poll, whatever) subscribes here; the scheduler publishes exactly
//! one event per phase entry. The channel is lossy for receivers that
//! stop draining; a client that missed an event re-reads the current
//! phase from the round anyway.

use mixpool_core::Phase;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct PhaseEvent {
    pub new_phase: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct PhaseBroadcaster {
    tx: broadcast::Sender<PhaseEvent>,
}

impl PhaseBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PhaseEvent> {
        self.tx.subscribe()
    }

    /// Publish a phase entry. A send error only means nobody is
    /// subscribed, which is fine.
    pub fn publish(&self, phase: Phase, message: impl Into<String>) {
        let event = PhaseEvent {
            new_phase: phase.as_str().to_string(),
            message: message.into(),
        };
        debug!(phase = %event.new_phase, "publishing phase change");
        let _ = self.tx.send(event);
    }
}

impl Default for PhaseBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}
