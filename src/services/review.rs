//! Supervisor review
//!
//! Approving a competency pins a learner's progress to 100% through the
//! store's atomic `instructor_mark_competency_complete`. The override is
//! terminal: later question additions never pull it back down.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::CompetencyError;
use crate::gate::{AuthorizationGate, Surface};
use crate::optimistic::{Settled, ViewState};
use crate::records::ProgressOverride;
use crate::store::CompetencyStore;

use super::events::{CompetencyEvent, EventBus};
use super::progress::ProgressBoard;

/// ReviewWorkflow: supervisor force-completion of enrolled competencies
pub struct ReviewWorkflow {
    store: Arc<dyn CompetencyStore>,
    gate: Arc<AuthorizationGate>,
    events: Arc<EventBus>,
}

impl ReviewWorkflow {
    pub fn new(
        store: Arc<dyn CompetencyStore>,
        gate: Arc<AuthorizationGate>,
        events: Arc<EventBus>,
    ) -> Self {
        Self { store, gate, events }
    }

    /// Mark a learner's competency complete. Idempotent; NotFound when the
    /// learner is not enrolled.
    pub async fn approve_competency(
        &self,
        view: &ViewState<ProgressBoard>,
        identity: Option<&str>,
        learner_id: &str,
        competency_id: &str,
    ) -> Result<Settled<ProgressOverride>, CompetencyError> {
        if learner_id.trim().is_empty() || competency_id.trim().is_empty() {
            return Err(CompetencyError::Validation(
                "learner and competency are required".into(),
            ));
        }
        let caller = self.gate.authorize(identity, Surface::Supervisor).await?;

        let txn = view.begin("approve competency", |board| {
            let previous = board.get(learner_id, competency_id).cloned();
            if !board.mark_completed(learner_id, competency_id) {
                warn!(
                    learner = %learner_id,
                    competency = %competency_id,
                    "Approving a pair that is not on the board"
                );
            }
            move |board: &mut ProgressBoard| {
                if let Some(record) = previous {
                    board.insert(record);
                }
            }
        });

        let result = self
            .store
            .mark_competency_complete(learner_id, competency_id, &caller.id)
            .await;

        if let Ok(applied) = &result {
            info!(
                learner = %learner_id,
                competency = %competency_id,
                approver = applied.approved_by.as_deref().unwrap_or(caller.id.as_str()),
                override_admin = caller.is_override_admin,
                "Competency approved"
            );
            self.events.emit(CompetencyEvent::CompetencyApproved {
                learner_id: learner_id.to_string(),
                competency_id: competency_id.to_string(),
                approved_by: caller.id.clone(),
            });
        }

        txn.settle_with(result, |board, applied| {
            board.mark_completed(&applied.learner_id, &applied.competency_id);
        })
    }
}
