use crate::{Fields, GraphId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type RunId = Uuid;

/// Events emitted during a run. Collaborators (server WebSocket, CLI
/// progress output) subscribe to drive per-node display state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    RunStarted {
        run_id: RunId,
        graph_id: GraphId,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        run_id: RunId,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        run_id: RunId,
        node_id: String,
        title: String,
        action: Option<String>,
        timestamp: DateTime<Utc>,
    },
    NodeSucceeded {
        run_id: RunId,
        node_id: String,
        title: String,
        outputs: Fields,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        run_id: RunId,
        node_id: String,
        title: String,
        error: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeSkipped {
        run_id: RunId,
        node_id: String,
        title: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for run events. Lossy: a slow subscriber never blocks
/// the executor.
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
