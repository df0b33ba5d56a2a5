//! Domain event system: progress notifications for pipeline runs.
//!
//! Events are published as a run moves through its stages. Subscribers
//! (the CLI progress log, tests) react without coupling to the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A stage began running its tools
    StageStarted {
        run_id: String,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed for a stage
    ToolExecuted {
        run_id: String,
        stage: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// One reasoning attempt finished (accepted or not)
    ReasoningAttempted {
        run_id: String,
        stage: String,
        attempt: u32,
        outcome: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A stage produced a validated result
    StageAccepted {
        run_id: String,
        stage: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// A stage terminated the run
    StageFailed {
        run_id: String,
        stage: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The run finished, successfully or not
    RunFinished {
        run_id: String,
        subject_id: String,
        succeeded: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn run_id(&self) -> &str {
        match self {
            DomainEvent::StageStarted { run_id, .. }
            | DomainEvent::ToolExecuted { run_id, .. }
            | DomainEvent::ReasoningAttempted { run_id, .. }
            | DomainEvent::StageAccepted { run_id, .. }
            | DomainEvent::StageFailed { run_id, .. }
            | DomainEvent::RunFinished { run_id, .. } => run_id,
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            run_id: "run-1".into(),
            stage: "billing".into(),
            tool_name: "charge_statistics".into(),
            success: true,
            duration_ms: 3,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.run_id(), "run-1");
        match event.as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "charge_statistics");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::StageFailed {
            run_id: "run-2".into(),
            stage: "identity".into(),
            reason: "tool_failure".into(),
            timestamp: Utc::now(),
        });
    }
}
