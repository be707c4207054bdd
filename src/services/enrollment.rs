//! Enrollment management
//!
//! Enrollments are upserts keyed by (learner, competency): enrolling twice
//! refreshes the timestamp and never duplicates. The owning dashboard's
//! membership set moves first and is restored if the store call fails.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::CompetencyError;
use crate::gate::{AuthorizationGate, Caller, Surface};
use crate::optimistic::{Settled, ViewState};
use crate::records::{Competency, Difficulty, Enrollment};
use crate::retry::RetryPolicy;
use crate::store::CompetencyStore;

use super::events::{CompetencyEvent, EventBus};

/// Competency ids a learner is enrolled in, as held by a dashboard
pub type Membership = BTreeSet<String>;

/// Selects catalog entries for bulk enrollment
#[derive(Clone)]
pub enum CompetencyFilter {
    All,
    Difficulty(Difficulty),
    Tag(String),
    Custom(Arc<dyn Fn(&Competency) -> bool + Send + Sync>),
}

impl CompetencyFilter {
    pub fn custom(predicate: impl Fn(&Competency) -> bool + Send + Sync + 'static) -> Self {
        CompetencyFilter::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, competency: &Competency) -> bool {
        match self {
            CompetencyFilter::All => true,
            CompetencyFilter::Difficulty(difficulty) => competency.difficulty == *difficulty,
            CompetencyFilter::Tag(tag) => competency.has_tag(tag),
            CompetencyFilter::Custom(predicate) => predicate(competency),
        }
    }
}

impl fmt::Debug for CompetencyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompetencyFilter::All => write!(f, "All"),
            CompetencyFilter::Difficulty(d) => write!(f, "Difficulty({})", d),
            CompetencyFilter::Tag(t) => write!(f, "Tag({:?})", t),
            CompetencyFilter::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Result of a bulk enrollment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkEnrollOutcome {
    Enrolled(Vec<Enrollment>),
    /// Every matching competency was already enrolled (or none matched)
    NothingToEnroll,
}

impl BulkEnrollOutcome {
    pub fn enrolled_count(&self) -> usize {
        match self {
            BulkEnrollOutcome::Enrolled(rows) => rows.len(),
            BulkEnrollOutcome::NothingToEnroll => 0,
        }
    }

    /// Notice for the dashboard
    pub fn notice(&self) -> String {
        match self {
            BulkEnrollOutcome::Enrolled(rows) if rows.len() == 1 => {
                "Enrolled in 1 competency".into()
            }
            BulkEnrollOutcome::Enrolled(rows) => format!("Enrolled in {} competencies", rows.len()),
            BulkEnrollOutcome::NothingToEnroll => "Nothing new to enroll in".into(),
        }
    }
}

/// Competencies matching `filter` that are not in `enrolled`, in catalog order
pub fn enrollment_targets(
    catalog: &[Competency],
    enrolled: &Membership,
    filter: &CompetencyFilter,
) -> Vec<String> {
    catalog
        .iter()
        .filter(|c| filter.matches(c) && !enrolled.contains(&c.id))
        .map(|c| c.id.clone())
        .collect()
}

/// EnrollmentManager: single and bulk enrollment with optimistic membership
pub struct EnrollmentManager {
    store: Arc<dyn CompetencyStore>,
    gate: Arc<AuthorizationGate>,
    events: Arc<EventBus>,
    retry: RetryPolicy,
}

impl EnrollmentManager {
    pub fn new(
        store: Arc<dyn CompetencyStore>,
        gate: Arc<AuthorizationGate>,
        events: Arc<EventBus>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            gate,
            events,
            retry,
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Membership set for a learner, from the store
    pub async fn load_membership(&self, learner_id: &str) -> Result<Membership, CompetencyError> {
        let enrollments = self.enrollments(learner_id).await?;
        Ok(enrollments.into_iter().map(|e| e.competency_id).collect())
    }

    pub async fn enrollments(&self, learner_id: &str) -> Result<Vec<Enrollment>, CompetencyError> {
        let store = &self.store;
        self.retry
            .run("enrollments", || async move { store.enrollments(learner_id).await })
            .await
    }

    pub async fn catalog(&self) -> Result<Vec<Competency>, CompetencyError> {
        let store = &self.store;
        self.retry.run("catalog", || async move { store.catalog().await }).await
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Enroll a learner in one competency
    pub async fn enroll(
        &self,
        view: &ViewState<Membership>,
        identity: Option<&str>,
        learner_id: &str,
        competency_id: &str,
    ) -> Result<Settled<Enrollment>, CompetencyError> {
        let caller = self.authorize_for(identity, learner_id).await?;

        let store = &self.store;
        let known = self
            .retry
            .run("competency", || async move { store.competency(competency_id).await })
            .await?;
        if known.is_none() {
            return Err(CompetencyError::NotFound(format!("competency {}", competency_id)));
        }

        let txn = view.begin("enroll", |membership| {
            let inserted = membership.insert(competency_id.to_string());
            move |membership: &mut Membership| {
                if inserted {
                    membership.remove(competency_id);
                }
            }
        });

        let result = self.store.upsert_enrollment(learner_id, competency_id).await;
        if result.is_ok() {
            info!(learner = %learner_id, competency = %competency_id, by = %caller.id, "Enrolled");
            self.events.emit(CompetencyEvent::Enrolled {
                learner_id: learner_id.to_string(),
                competency_id: competency_id.to_string(),
                enrolled_by: caller.id.clone(),
            });
        }

        txn.settle(result)
    }

    /// Enroll a learner in every matching competency not already enrolled.
    ///
    /// The batch is one store transaction and one local change: it lands or
    /// rolls back as a whole.
    pub async fn bulk_enroll(
        &self,
        view: &ViewState<Membership>,
        identity: Option<&str>,
        learner_id: &str,
        filter: &CompetencyFilter,
    ) -> Result<Settled<BulkEnrollOutcome>, CompetencyError> {
        let caller = self.authorize_for(identity, learner_id).await?;

        let catalog = self.catalog().await?;
        let enrolled = self.load_membership(learner_id).await?;
        let targets = enrollment_targets(&catalog, &enrolled, filter);

        if targets.is_empty() {
            debug!(learner = %learner_id, filter = ?filter, "Bulk enroll found nothing new");
            return Ok(Settled::Committed(BulkEnrollOutcome::NothingToEnroll));
        }

        let txn = view.begin("bulk enroll", |membership| {
            let mut added = Vec::new();
            for id in &targets {
                if membership.insert(id.clone()) {
                    added.push(id.clone());
                }
            }
            move |membership: &mut Membership| {
                for id in &added {
                    membership.remove(id);
                }
            }
        });

        let result = self.store.upsert_enrollments(learner_id, &targets).await;
        if result.is_ok() {
            info!(
                learner = %learner_id,
                count = targets.len(),
                filter = ?filter,
                by = %caller.id,
                "Bulk enrolled"
            );
            self.events.emit(CompetencyEvent::BulkEnrolled {
                learner_id: learner_id.to_string(),
                competency_ids: targets.clone(),
                enrolled_by: caller.id.clone(),
            });
        }

        Ok(match txn.settle(result)? {
            Settled::Committed(rows) => Settled::Committed(BulkEnrollOutcome::Enrolled(rows)),
            Settled::Discarded => Settled::Discarded,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Learners enroll themselves; anyone else needs the Supervisor surface
    async fn authorize_for(
        &self,
        identity: Option<&str>,
        learner_id: &str,
    ) -> Result<Caller, CompetencyError> {
        if learner_id.trim().is_empty() {
            return Err(CompetencyError::Validation("learner id is required".into()));
        }

        let is_self = identity.map(str::trim) == Some(learner_id);
        if is_self {
            return self.gate.authorize(identity, Surface::Learner).await;
        }

        let caller = self.gate.authorize(identity, Surface::Supervisor).await?;
        match self.store.profile(learner_id).await? {
            Some(_) => Ok(caller),
            None => Err(CompetencyError::NotFound(format!("learner {}", learner_id))),
        }
    }
}
