//! Service layer for lamad-competency
//!
//! Services hold the competency rules between dashboards and the store:
//! - Authorization through the one gate
//! - Optimistic view updates with rollback
//! - Event emission for audit
//! - Retry of idempotent reads
//!
//! ## Architecture
//!
//! ```text
//! Dashboards (thin)
//!     ↓
//! Service Layer (rules, gate, optimistic views)
//!     ↓
//! CompetencyStore (records)
//!     ↓
//! Repository Layer (db/*.rs) → SQLite
//! ```

pub mod enrollment;
pub mod events;
pub mod progress;
pub mod review;
pub mod voting;

pub use enrollment::{BulkEnrollOutcome, CompetencyFilter, EnrollmentManager, Membership};
pub use events::{spawn_logging_listener, CompetencyEvent, EventBus, EventListener};
pub use progress::{CohortProgress, LearnerProgress, ProgressAggregator, ProgressBoard};
pub use review::ReviewWorkflow;
pub use voting::{
    CastVote, ProposalDraft, ProposalWithTally, VoteCache, VoteTransition, VotingTally,
};

use std::sync::Arc;

use crate::config::Config;
use crate::gate::AuthorizationGate;
use crate::store::CompetencyStore;

/// Service container for dependency injection
///
/// Holds all services over one shared store, gate and event bus.
pub struct Services {
    pub store: Arc<dyn CompetencyStore>,
    pub gate: Arc<AuthorizationGate>,
    pub enrollment: Arc<EnrollmentManager>,
    pub progress: Arc<ProgressAggregator>,
    pub voting: Arc<VotingTally>,
    pub review: Arc<ReviewWorkflow>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services over a shared store
    pub fn new(store: Arc<dyn CompetencyStore>, config: &Config) -> Self {
        let events = Arc::new(EventBus::with_capacity(config.event_bus_capacity));
        let gate = Arc::new(AuthorizationGate::new(store.clone()));
        let retry = config.read_retry;

        Self {
            enrollment: Arc::new(EnrollmentManager::new(
                store.clone(),
                gate.clone(),
                events.clone(),
                retry,
            )),
            progress: Arc::new(ProgressAggregator::new(
                store.clone(),
                gate.clone(),
                events.clone(),
                retry,
            )),
            voting: Arc::new(VotingTally::new(store.clone(), gate.clone(), events.clone(), retry)),
            review: Arc::new(ReviewWorkflow::new(store.clone(), gate.clone(), events.clone())),
            store,
            gate,
            events,
        }
    }
}
