//! Event system for competency operations
//!
//! Services emit a [`CompetencyEvent`] after every persisted state change.
//! Listeners are an audit/notification hook; dashboards never depend on them.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Competency events emitted by services
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompetencyEvent {
    // Enrollment events
    Enrolled {
        learner_id: String,
        competency_id: String,
        enrolled_by: String,
    },
    BulkEnrolled {
        learner_id: String,
        competency_ids: Vec<String>,
        enrolled_by: String,
    },

    // Progress events
    AnswerRecorded {
        learner_id: String,
        question_id: String,
        is_correct: bool,
    },
    CompetencyApproved {
        learner_id: String,
        competency_id: String,
        approved_by: String,
    },

    // Committee events
    ProposalSubmitted {
        id: String,
        name: String,
        proposed_by: String,
    },
    VoteCast {
        proposal_id: String,
        voter_id: String,
        approve: bool,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &CompetencyEvent);
}

/// Event bus for broadcasting competency events
pub struct EventBus {
    sender: broadcast::Sender<CompetencyEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: CompetencyEvent) {
        trace!(event = ?event, "Emitting competency event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<CompetencyEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &CompetencyEvent) {
        match event {
            CompetencyEvent::Enrolled {
                learner_id,
                competency_id,
                enrolled_by,
            } => {
                info!(
                    learner = %learner_id,
                    competency = %competency_id,
                    by = %enrolled_by,
                    "Enrolled"
                );
            }
            CompetencyEvent::BulkEnrolled {
                learner_id,
                competency_ids,
                enrolled_by,
            } => {
                info!(
                    learner = %learner_id,
                    count = competency_ids.len(),
                    by = %enrolled_by,
                    "Bulk enrolled"
                );
            }
            CompetencyEvent::CompetencyApproved {
                learner_id,
                competency_id,
                approved_by,
            } => {
                info!(
                    learner = %learner_id,
                    competency = %competency_id,
                    by = %approved_by,
                    "Competency approved"
                );
            }
            CompetencyEvent::VoteCast {
                proposal_id,
                voter_id,
                approve,
            } => {
                info!(proposal = %proposal_id, voter = %voter_id, approve = approve, "Vote cast");
            }
            _ => {
                debug!(event = ?event, "Competency event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(CompetencyEvent::Enrolled {
            learner_id: "ada".into(),
            competency_id: "ecg-basics".into(),
            enrolled_by: "ada".into(),
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            CompetencyEvent::Enrolled { learner_id, competency_id, .. } => {
                assert_eq!(learner_id, "ada");
                assert_eq!(competency_id, "ecg-basics");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::with_capacity(0);
        bus.emit(CompetencyEvent::AnswerRecorded {
            learner_id: "ada".into(),
            question_id: "q1".into(),
            is_correct: false,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
