use crate::{AlgorithmId, RequestKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type UpdateId = Uuid;

/// Events emitted while a pipeline update runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    UpdateStarted {
        update_id: UpdateId,
        algorithm: AlgorithmId,
        timestamp: DateTime<Utc>,
    },
    UpdateCompleted {
        update_id: UpdateId,
        algorithm: AlgorithmId,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    AlgorithmExecuted {
        update_id: UpdateId,
        algorithm: AlgorithmId,
        algorithm_type: String,
        request: RequestKind,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    RequestFailed {
        update_id: UpdateId,
        algorithm: AlgorithmId,
        request: RequestKind,
        error: String,
        timestamp: DateTime<Utc>,
    },
    AlgorithmEvent {
        update_id: UpdateId,
        algorithm: AlgorithmId,
        event: AlgorithmEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events an algorithm reports about itself
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum AlgorithmEvent {
    Info { message: String },
    Warning { message: String },
    Progress { amount: f64, text: Option<String> },
}

/// Event emitter handed to algorithms through their context
#[derive(Clone)]
pub struct EventEmitter {
    update_id: UpdateId,
    algorithm: AlgorithmId,
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    pub fn new(
        update_id: UpdateId,
        algorithm: AlgorithmId,
        sender: broadcast::Sender<PipelineEvent>,
    ) -> Self {
        Self {
            update_id,
            algorithm,
            sender,
        }
    }

    pub fn update_id(&self) -> UpdateId {
        self.update_id
    }

    /// Emit an algorithm-specific event
    pub fn emit(&self, event: AlgorithmEvent) {
        let _ = self.sender.send(PipelineEvent::AlgorithmEvent {
            update_id: self.update_id,
            algorithm: self.algorithm,
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(AlgorithmEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(AlgorithmEvent::Warning {
            message: message.into(),
        });
    }

    pub fn progress(&self, amount: f64, text: Option<String>) {
        self.emit(AlgorithmEvent::Progress { amount, text });
    }
}

/// Broadcast bus shared by every executive of one pipeline
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, update_id: UpdateId, algorithm: AlgorithmId) -> EventEmitter {
        EventEmitter::new(update_id, algorithm, self.sender.clone())
    }
}
