//! Role-scoped dashboards
//!
//! Each dashboard is entered through the gate. A denied entry is a
//! [`DashboardEntry::Redirect`], never a rendered error. Once inside, panels
//! load concurrently and independently: one failed panel shows its own
//! message and leaves the others intact.
//!
//! Dashboards own the [`ViewState`]s their mutations update optimistically.
//! Closing a dashboard tears them down so late results are discarded.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::CompetencyError;
use crate::gate::{Caller, Redirect, Surface};
use crate::optimistic::{Settled, ViewState};
use crate::records::{
    Competency, Enrollment, Identity, ProgressOverride, ProgressRecord, ProposedCompetency,
};
use crate::services::progress::average_percent;
use crate::services::{
    BulkEnrollOutcome, CastVote, CohortProgress, CompetencyFilter, LearnerProgress, Membership,
    ProgressBoard, ProposalDraft, ProposalWithTally, Services, VoteCache,
};
use crate::views::ProposalView;

/// One independently loaded section of a dashboard
#[derive(Debug, Clone, PartialEq)]
pub enum Panel<T> {
    Ready(T),
    Empty,
    Failed(String),
}

impl<T> Panel<T> {
    /// NotFound renders as empty; other failures carry a user message
    pub fn from_result(result: Result<T, CompetencyError>) -> Self {
        match result {
            Ok(value) => Panel::Ready(value),
            Err(CompetencyError::NotFound(_)) => Panel::Empty,
            Err(e) => Panel::Failed(e.user_message()),
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Panel::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Panel::Failed(_))
    }
}

impl<T> Panel<Vec<T>> {
    pub fn from_list(result: Result<Vec<T>, CompetencyError>) -> Self {
        match Panel::from_result(result) {
            Panel::Ready(items) if items.is_empty() => Panel::Empty,
            panel => panel,
        }
    }
}

/// Result of entering a dashboard
#[derive(Debug)]
pub enum DashboardEntry<D> {
    Ready(D),
    Redirect(Redirect),
}

impl<D> DashboardEntry<D> {
    pub fn ready(self) -> Option<D> {
        match self {
            DashboardEntry::Ready(dashboard) => Some(dashboard),
            DashboardEntry::Redirect(_) => None,
        }
    }

    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            DashboardEntry::Redirect(redirect) => Some(*redirect),
            DashboardEntry::Ready(_) => None,
        }
    }
}

async fn enter(
    services: &Services,
    identity: Option<&str>,
    surface: Surface,
) -> Result<Caller, Redirect> {
    match services.gate.authorize(identity, surface).await {
        Ok(caller) => Ok(caller),
        Err(CompetencyError::AuthzDenied { redirect }) => Err(redirect),
        Err(_) => Err(Redirect::Forbidden),
    }
}

// ============================================================================
// Learner Dashboard
// ============================================================================

/// Catalog, own enrollments and own progress
pub struct LearnerDashboard {
    services: Arc<Services>,
    caller: Caller,
    pub catalog: Panel<Vec<Competency>>,
    pub progress: Panel<Vec<ProgressRecord>>,
    membership: ViewState<Membership>,
    membership_error: Option<String>,
}

impl LearnerDashboard {
    pub async fn open(services: Arc<Services>, identity: Option<&str>) -> DashboardEntry<Self> {
        let caller = match enter(&services, identity, Surface::Learner).await {
            Ok(caller) => caller,
            Err(redirect) => return DashboardEntry::Redirect(redirect),
        };

        let (catalog, membership, progress) = tokio::join!(
            services.enrollment.catalog(),
            services.enrollment.load_membership(&caller.id),
            services.progress.compute_for_learner(&caller.id),
        );

        let (membership, membership_error) = match membership {
            Ok(set) => (ViewState::new(set), None),
            Err(e) => (ViewState::new(Membership::new()), Some(e.user_message())),
        };

        debug!(learner = %caller.id, "Learner dashboard opened");
        DashboardEntry::Ready(Self {
            catalog: Panel::from_list(catalog),
            progress: Panel::from_list(progress),
            membership,
            membership_error,
            services,
            caller,
        })
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    /// Enrollment panel, read from the optimistic membership set
    pub fn enrollments(&self) -> Panel<Membership> {
        if let Some(message) = &self.membership_error {
            return Panel::Failed(message.clone());
        }
        let membership = self.membership.snapshot();
        if membership.is_empty() {
            Panel::Empty
        } else {
            Panel::Ready(membership)
        }
    }

    pub fn is_enrolled(&self, competency_id: &str) -> bool {
        self.membership.read(|m| m.contains(competency_id))
    }

    /// Mean percent across the learner's enrollments
    pub fn average(&self) -> f64 {
        self.progress.ready().map(|r| average_percent(r)).unwrap_or(0.0)
    }

    pub async fn enroll(
        &mut self,
        competency_id: &str,
    ) -> Result<Settled<Enrollment>, CompetencyError> {
        let caller = self.caller.id.as_str();
        let settled = self
            .services
            .enrollment
            .enroll(&self.membership, Some(caller), caller, competency_id)
            .await?;
        if !settled.is_discarded() {
            self.refresh_progress().await;
        }
        Ok(settled)
    }

    pub async fn bulk_enroll(
        &mut self,
        filter: &CompetencyFilter,
    ) -> Result<Settled<BulkEnrollOutcome>, CompetencyError> {
        let caller = self.caller.id.as_str();
        let settled = self
            .services
            .enrollment
            .bulk_enroll(&self.membership, Some(caller), caller, filter)
            .await?;
        if let Settled::Committed(BulkEnrollOutcome::Enrolled(_)) = &settled {
            self.refresh_progress().await;
        }
        Ok(settled)
    }

    pub async fn record_answer(
        &mut self,
        question_id: &str,
        is_correct: bool,
    ) -> Result<(), CompetencyError> {
        self.services
            .progress
            .record_answer(Some(self.caller.id.as_str()), question_id, is_correct)
            .await?;
        self.refresh_progress().await;
        Ok(())
    }

    pub async fn refresh_progress(&mut self) {
        if self.membership.is_live() {
            let records = self.services.progress.compute_for_learner(&self.caller.id).await;
            self.progress = Panel::from_list(records);
        }
    }

    /// Tear down; in-flight mutations will discard their results
    pub fn close(&self) {
        self.membership.tear_down();
    }
}

// ============================================================================
// Supervisor Dashboard
// ============================================================================

/// Learner roster, per-learner progress and the cohort average
pub struct SupervisorDashboard {
    services: Arc<Services>,
    caller: Caller,
    pub roster: Panel<Vec<Identity>>,
    board: ViewState<ProgressBoard>,
    cohort_ids: Vec<String>,
    progress_error: Option<String>,
    learner_errors: BTreeMap<String, String>,
}

impl SupervisorDashboard {
    pub async fn open(services: Arc<Services>, identity: Option<&str>) -> DashboardEntry<Self> {
        let caller = match enter(&services, identity, Surface::Supervisor).await {
            Ok(caller) => caller,
            Err(redirect) => return DashboardEntry::Redirect(redirect),
        };

        let (roster, cohort) = tokio::join!(
            services.progress.learners(),
            services.progress.compute_roster(),
        );

        let mut dashboard = Self {
            roster: Panel::from_list(roster),
            board: ViewState::new(ProgressBoard::default()),
            cohort_ids: Vec::new(),
            progress_error: None,
            learner_errors: BTreeMap::new(),
            services,
            caller,
        };
        dashboard.load_cohort(cohort);

        debug!(supervisor = %dashboard.caller.id, "Supervisor dashboard opened");
        DashboardEntry::Ready(dashboard)
    }

    fn load_cohort(&mut self, cohort: Result<CohortProgress, CompetencyError>) {
        match cohort {
            Ok(cohort) => {
                self.cohort_ids = cohort.learners.iter().map(|l| l.learner_id.clone()).collect();
                self.board.replace(ProgressBoard::from_records(
                    cohort.learners.into_iter().flat_map(|l| l.records),
                ));
                self.progress_error = None;
                self.learner_errors.clear();
            }
            Err(e) => self.progress_error = Some(e.user_message()),
        }
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    /// Per-learner progress, read from the optimistic board
    pub fn progress(&self) -> Panel<CohortProgress> {
        if let Some(message) = &self.progress_error {
            return Panel::Failed(message.clone());
        }
        if self.cohort_ids.is_empty() {
            return Panel::Empty;
        }

        let board = self.board.snapshot();
        Panel::Ready(CohortProgress::from_learners(
            self.cohort_ids
                .iter()
                .map(|id| {
                    let records = board.for_learner(id);
                    LearnerProgress {
                        learner_id: id.clone(),
                        average: average_percent(&records),
                        records,
                    }
                })
                .collect(),
        ))
    }

    pub fn cohort_average(&self) -> f64 {
        self.progress().ready().map(|c| c.cohort_average).unwrap_or(0.0)
    }

    /// Force-complete a learner's competency
    pub async fn approve(
        &mut self,
        learner_id: &str,
        competency_id: &str,
    ) -> Result<Settled<ProgressOverride>, CompetencyError> {
        self.services
            .review
            .approve_competency(
                &self.board,
                Some(self.caller.id.as_str()),
                learner_id,
                competency_id,
            )
            .await
    }

    /// Enroll a learner on their behalf
    pub async fn enroll_learner(
        &mut self,
        learner_id: &str,
        competency_id: &str,
    ) -> Result<Settled<Enrollment>, CompetencyError> {
        // The supervisor's board tracks progress, not membership
        let membership = ViewState::new(Membership::new());
        let settled = self
            .services
            .enrollment
            .enroll(&membership, Some(self.caller.id.as_str()), learner_id, competency_id)
            .await?;
        if !settled.is_discarded() {
            // The enrollment is saved; a failed reload shows on learner_error
            let _ = self.refresh_learner(learner_id).await;
        }
        Ok(settled)
    }

    /// Reload one learner's rows. A failure is kept against that learner
    /// only; the rest of the board stays as it was.
    pub async fn refresh_learner(&mut self, learner_id: &str) -> Result<(), CompetencyError> {
        match self.services.progress.compute_for_learner(learner_id).await {
            Ok(records) => {
                let mut board = self.board.snapshot();
                board.replace_learner(learner_id, records);
                self.board.replace(board);
                if !self.cohort_ids.iter().any(|id| id == learner_id) {
                    self.cohort_ids.push(learner_id.to_string());
                }
                self.learner_errors.remove(learner_id);
                Ok(())
            }
            Err(e) => {
                warn!(learner = %learner_id, error = %e, "Learner progress refresh failed");
                self.learner_errors.insert(learner_id.to_string(), e.user_message());
                Err(e)
            }
        }
    }

    /// Message from the last failed refresh of this learner, if any
    pub fn learner_error(&self, learner_id: &str) -> Option<&str> {
        self.learner_errors.get(learner_id).map(String::as_str)
    }

    pub async fn refresh(&mut self) {
        if !self.board.is_live() {
            return;
        }
        let (roster, cohort) = tokio::join!(
            self.services.progress.learners(),
            self.services.progress.compute_roster(),
        );
        self.roster = Panel::from_list(roster);
        self.load_cohort(cohort);
    }

    pub fn board(&self) -> ViewState<ProgressBoard> {
        self.board.clone()
    }

    pub fn close(&self) {
        self.board.tear_down();
    }
}

// ============================================================================
// Governance Dashboard
// ============================================================================

/// Staged proposals with live tallies and the caller's own votes
pub struct GovernanceDashboard {
    services: Arc<Services>,
    caller: Caller,
    pub proposals: Panel<Vec<ProposalWithTally>>,
    votes: ViewState<VoteCache>,
    votes_error: Option<String>,
}

impl GovernanceDashboard {
    pub async fn open(services: Arc<Services>, identity: Option<&str>) -> DashboardEntry<Self> {
        let caller = match enter(&services, identity, Surface::Governance).await {
            Ok(caller) => caller,
            Err(redirect) => return DashboardEntry::Redirect(redirect),
        };

        let (proposals, votes) = tokio::join!(
            services.voting.list_proposals(),
            services.voting.load_my_votes(&caller.id),
        );

        let (votes, votes_error) = match votes {
            Ok(cache) => (ViewState::new(cache), None),
            Err(e) => (ViewState::new(VoteCache::new()), Some(e.user_message())),
        };

        debug!(member = %caller.id, "Governance dashboard opened");
        DashboardEntry::Ready(Self {
            proposals: Panel::from_list(proposals),
            votes,
            votes_error,
            services,
            caller,
        })
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    /// The caller's vote on a proposal, from the optimistic cache
    pub fn my_vote(&self, proposal_id: &str) -> Option<bool> {
        self.votes.read(|cache| cache.get(proposal_id).copied())
    }

    pub fn votes_error(&self) -> Option<&str> {
        self.votes_error.as_deref()
    }

    /// Proposals joined with the caller's votes, for rendering
    pub fn proposal_views(&self) -> Vec<ProposalView> {
        let cache = self.votes.snapshot();
        self.proposals
            .ready()
            .map(|listed| {
                listed
                    .iter()
                    .map(|p| {
                        ProposalView::new(
                            p.proposal.clone(),
                            p.tally.clone(),
                            cache.get(&p.proposal.id).copied(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn cast_vote(
        &mut self,
        proposal_id: &str,
        approve: bool,
    ) -> Result<Settled<CastVote>, CompetencyError> {
        let settled = self
            .services
            .voting
            .cast_vote(&self.votes, Some(self.caller.id.as_str()), proposal_id, approve)
            .await?;

        // Without a fresh recount the displayed tally stays as last loaded
        if let Settled::Committed(CastVote { tally: Some(tally), .. }) = &settled {
            if let Panel::Ready(listed) = &mut self.proposals {
                for entry in listed.iter_mut().filter(|p| p.proposal.id == proposal_id) {
                    entry.tally = tally.clone();
                }
            }
        }
        Ok(settled)
    }

    pub async fn submit_proposal(
        &mut self,
        draft: ProposalDraft,
    ) -> Result<ProposedCompetency, CompetencyError> {
        let proposal = self
            .services
            .voting
            .submit_proposal(Some(self.caller.id.as_str()), draft)
            .await?;
        self.refresh_proposals().await;
        Ok(proposal)
    }

    pub async fn refresh_proposals(&mut self) {
        if self.votes.is_live() {
            self.proposals = Panel::from_list(self.services.voting.list_proposals().await);
        }
    }

    /// Tallies by proposal id, as currently displayed
    pub fn tallies(&self) -> BTreeMap<String, (u64, u64)> {
        self.proposals
            .ready()
            .map(|listed| {
                listed
                    .iter()
                    .map(|p| {
                        let counts = (p.tally.approve_count, p.tally.reject_count);
                        (p.proposal.id.clone(), counts)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn close(&self) {
        self.votes.tear_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_from_result() {
        let ready: Panel<u32> = Panel::from_result(Ok(3));
        assert_eq!(ready.ready(), Some(&3));

        let empty: Panel<u32> = Panel::from_result(Err(CompetencyError::NotFound("x".into())));
        assert_eq!(empty, Panel::Empty);

        let failed: Panel<u32> = Panel::from_result(Err(CompetencyError::Remote(String::new())));
        assert_eq!(
            failed,
            Panel::Failed(crate::error::GENERIC_FAILURE_MESSAGE.to_string())
        );
    }

    #[test]
    fn test_empty_list_is_empty_panel() {
        let panel: Panel<Vec<u32>> = Panel::from_list(Ok(vec![]));
        assert_eq!(panel, Panel::Empty);
    }
}
