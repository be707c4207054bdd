//! Governance voting
//!
//! Each governance member holds at most one live vote per proposal; casting
//! again overwrites it. Tallies are always recounted from the vote rows, so
//! repeats and flips can never double count.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::CompetencyError;
use crate::gate::{AuthorizationGate, Surface};
use crate::optimistic::{Settled, ViewState};
use crate::records::{Difficulty, ProposedCompetency, Tally, Vote};
use crate::retry::RetryPolicy;
use crate::store::{CompetencyStore, NewProposal};

use super::events::{CompetencyEvent, EventBus};

/// The caller's own votes by proposal id (true = approve)
pub type VoteCache = HashMap<String, bool>;

/// How a cast changed the caller's vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTransition {
    First,
    Unchanged,
    Flipped,
}

impl VoteTransition {
    pub fn from_prior(prior: Option<bool>, approve: bool) -> Self {
        match prior {
            None => VoteTransition::First,
            Some(previous) if previous == approve => VoteTransition::Unchanged,
            Some(_) => VoteTransition::Flipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastVote {
    pub vote: Vote,
    pub transition: VoteTransition,
    /// Recount after the write; `None` when it could not be read
    pub tally: Option<Tally>,
}

impl CastVote {
    /// (approve, reject) counts, when the recount succeeded
    pub fn counts(&self) -> Option<(u64, u64)> {
        self.tally.as_ref().map(|t| (t.approve_count, t.reject_count))
    }
}

/// Proposal as submitted by a governance member
#[derive(Debug, Clone)]
pub struct ProposalDraft {
    pub name: String,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub justification: String,
}

impl ProposalDraft {
    pub fn validate(&self) -> Result<(), CompetencyError> {
        if self.name.trim().is_empty() {
            return Err(CompetencyError::Validation("Competency name is required".into()));
        }
        if self.justification.trim().is_empty() {
            return Err(CompetencyError::Validation("A justification is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalWithTally {
    pub proposal: ProposedCompetency,
    pub tally: Tally,
}

/// VotingTally: proposals, votes and recounted tallies
pub struct VotingTally {
    store: Arc<dyn CompetencyStore>,
    gate: Arc<AuthorizationGate>,
    events: Arc<EventBus>,
    retry: RetryPolicy,
}

impl VotingTally {
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

    /// Approve/reject counts recomputed from the vote rows
    pub async fn tally(&self, proposal_id: &str) -> Result<Tally, CompetencyError> {
        let store = &self.store;
        self.retry
            .run("tally", || async move { store.tally(proposal_id).await })
            .await
    }

    /// A voter's live votes as a cache
    pub async fn load_my_votes(&self, voter_id: &str) -> Result<VoteCache, CompetencyError> {
        let store = &self.store;
        let votes = self
            .retry
            .run("votes_by", || async move { store.votes_by(voter_id).await })
            .await?;
        Ok(votes.into_iter().map(|v| (v.proposal_id, v.approve)).collect())
    }

    /// Staged proposals, newest first, each with its current tally
    pub async fn list_proposals(&self) -> Result<Vec<ProposalWithTally>, CompetencyError> {
        let store = &self.store;
        let proposals = self
            .retry
            .run("proposals", || async move { store.proposals().await })
            .await?;

        let mut listed = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            let tally = self.tally(&proposal.id).await?;
            listed.push(ProposalWithTally { proposal, tally });
        }
        Ok(listed)
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Cast or overwrite the caller's vote on a proposal
    pub async fn cast_vote(
        &self,
        view: &ViewState<VoteCache>,
        identity: Option<&str>,
        proposal_id: &str,
        approve: bool,
    ) -> Result<Settled<CastVote>, CompetencyError> {
        let caller = self.gate.authorize(identity, Surface::Governance).await?;

        let store = &self.store;
        let proposal = self
            .retry
            .run("proposal", || async move { store.proposal(proposal_id).await })
            .await?;
        if proposal.is_none() {
            return Err(CompetencyError::NotFound(format!("proposal {}", proposal_id)));
        }

        let mut prior = None;
        let txn = view.begin("cast vote", |cache| {
            prior = cache.insert(proposal_id.to_string(), approve);
            let previous = prior;
            move |cache: &mut VoteCache| match previous {
                Some(previous) => {
                    cache.insert(proposal_id.to_string(), previous);
                }
                None => {
                    cache.remove(proposal_id);
                }
            }
        });
        let transition = VoteTransition::from_prior(prior, approve);

        let result = self.store.upsert_vote(&caller.id, proposal_id, approve).await;
        if result.is_ok() {
            info!(
                proposal = %proposal_id,
                voter = %caller.id,
                approve = approve,
                transition = ?transition,
                "Vote cast"
            );
            self.events.emit(CompetencyEvent::VoteCast {
                proposal_id: proposal_id.to_string(),
                voter_id: caller.id.clone(),
                approve,
            });
        }

        let vote = match txn.settle(result)? {
            Settled::Committed(vote) => vote,
            Settled::Discarded => return Ok(Settled::Discarded),
        };

        // The vote persisted; a failed recount leaves the tally unknown
        let tally = match self.tally(proposal_id).await {
            Ok(tally) => {
                debug!(
                    proposal = %proposal_id,
                    approvals = tally.approve_count,
                    rejections = tally.reject_count,
                    "Tally recomputed"
                );
                Some(tally)
            }
            Err(e) => {
                warn!(proposal = %proposal_id, error = %e, "Vote saved but tally unavailable");
                None
            }
        };

        Ok(Settled::Committed(CastVote {
            vote,
            transition,
            tally,
        }))
    }

    /// Stage a new competency proposal. Validation runs before any store call.
    pub async fn submit_proposal(
        &self,
        identity: Option<&str>,
        draft: ProposalDraft,
    ) -> Result<ProposedCompetency, CompetencyError> {
        draft.validate()?;
        let caller = self.gate.authorize(identity, Surface::Governance).await?;

        let proposal = self
            .store
            .create_proposal(NewProposal {
                name: draft.name.trim().to_string(),
                difficulty: draft.difficulty,
                tags: draft.tags,
                justification: draft.justification.trim().to_string(),
                proposed_by: caller.id.clone(),
            })
            .await?;

        info!(id = %proposal.id, name = %proposal.name, by = %caller.id, "Proposal submitted");
        self.events.emit(CompetencyEvent::ProposalSubmitted {
            id: proposal.id.clone(),
            name: proposal.name.clone(),
            proposed_by: caller.id,
        });

        Ok(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_from_prior() {
        assert_eq!(VoteTransition::from_prior(None, true), VoteTransition::First);
        assert_eq!(VoteTransition::from_prior(Some(true), true), VoteTransition::Unchanged);
        assert_eq!(VoteTransition::from_prior(Some(true), false), VoteTransition::Flipped);
    }

    #[test]
    fn test_draft_validation() {
        let mut draft = ProposalDraft {
            name: "  ".into(),
            difficulty: Difficulty::Intermediate,
            tags: vec![],
            justification: "Needed for triage".into(),
        };
        assert!(matches!(draft.validate(), Err(CompetencyError::Validation(_))));

        draft.name = "Triage".into();
        assert!(draft.validate().is_ok());

        draft.justification = "\n".into();
        assert!(matches!(draft.validate(), Err(CompetencyError::Validation(_))));
    }
}
