//! View types for client boundaries
//!
//! These types use camelCase serialization for TypeScript clients and
//! the operator binary's JSON output. Services return records; conversion
//! to views happens here.
//!
//! - Timestamps are RFC 3339 strings
//! - Enums are exposed as their lowercase storage strings
//! - Counts are `u32` so generated TypeScript uses `number`

use serde::Serialize;
use ts_rs::TS;

use crate::records::{Competency, Identity, ProgressRecord, ProposedCompetency, Tally};
use crate::services::{CohortProgress, LearnerProgress, ProposalWithTally};

fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

// ============================================================================
// Identity View
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct IdentityView {
    pub id: String,
    pub role: String,
    pub display_name: Option<String>,
}

impl From<Identity> for IdentityView {
    fn from(i: Identity) -> Self {
        Self {
            id: i.id,
            role: i.role.to_string(),
            display_name: i.display_name,
        }
    }
}

// ============================================================================
// Catalog View
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct CompetencyView {
    pub id: String,
    pub name: String,
    pub difficulty: String,
    pub tags: Vec<String>,
    pub created_at: String,
}

impl From<Competency> for CompetencyView {
    fn from(c: Competency) -> Self {
        Self {
            id: c.id,
            name: c.name,
            difficulty: c.difficulty.to_string(),
            tags: c.tags.into_iter().collect(),
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Progress Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ProgressView {
    pub learner_id: String,
    pub competency_id: String,
    pub total_questions: u32,
    pub answered_questions: u32,
    pub percent: u8,
    pub status: String,
    pub overridden: bool,
}

impl From<ProgressRecord> for ProgressView {
    fn from(r: ProgressRecord) -> Self {
        Self {
            learner_id: r.learner_id,
            competency_id: r.competency_id,
            total_questions: r.total_questions,
            answered_questions: r.answered_questions,
            percent: r.percent,
            status: r.status.as_str().to_string(),
            overridden: r.overridden,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct LearnerProgressView {
    pub learner_id: String,
    pub records: Vec<ProgressView>,
    pub average: f64,
}

impl From<LearnerProgress> for LearnerProgressView {
    fn from(l: LearnerProgress) -> Self {
        Self {
            learner_id: l.learner_id,
            records: l.records.into_iter().map(ProgressView::from).collect(),
            average: l.average,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct CohortView {
    pub learners: Vec<LearnerProgressView>,
    pub cohort_average: f64,
}

impl From<CohortProgress> for CohortView {
    fn from(c: CohortProgress) -> Self {
        Self {
            learners: c.learners.into_iter().map(LearnerProgressView::from).collect(),
            cohort_average: c.cohort_average,
        }
    }
}

// ============================================================================
// Governance Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct TallyView {
    pub proposal_id: String,
    pub approve_count: u32,
    pub reject_count: u32,
}

impl From<Tally> for TallyView {
    fn from(t: Tally) -> Self {
        Self {
            proposal_id: t.proposal_id,
            approve_count: saturating_u32(t.approve_count),
            reject_count: saturating_u32(t.reject_count),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ProposalView {
    pub id: String,
    pub name: String,
    pub difficulty: String,
    pub tags: Vec<String>,
    pub justification: String,
    pub proposed_by: Option<String>,
    pub created_at: String,
    pub tally: TallyView,
    /// The viewer's own vote, when known
    pub my_vote: Option<bool>,
}

impl ProposalView {
    pub fn new(proposal: ProposedCompetency, tally: Tally, my_vote: Option<bool>) -> Self {
        Self {
            id: proposal.id,
            name: proposal.name,
            difficulty: proposal.difficulty.to_string(),
            tags: proposal.tags.into_iter().collect(),
            justification: proposal.justification,
            proposed_by: proposal.proposed_by,
            created_at: proposal.created_at.to_rfc3339(),
            tally: tally.into(),
            my_vote,
        }
    }
}

impl From<ProposalWithTally> for ProposalView {
    fn from(p: ProposalWithTally) -> Self {
        Self::new(p.proposal, p.tally, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Difficulty, ProgressStatus};
    use chrono::Utc;

    #[test]
    fn test_progress_view_is_camel_case() {
        let view = ProgressView::from(ProgressRecord {
            learner_id: "ada".into(),
            competency_id: "ecg".into(),
            total_questions: 2,
            answered_questions: 1,
            percent: 50,
            status: ProgressStatus::InProgress,
            overridden: false,
        });

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["learnerId"], "ada");
        assert_eq!(json["answeredQuestions"], 1);
        assert_eq!(json["status"], "in_progress");
    }

    #[test]
    fn test_proposal_view_carries_tally() {
        let proposal = ProposedCompetency {
            id: "p1".into(),
            name: "Triage".into(),
            difficulty: Difficulty::Expert,
            tags: Default::default(),
            justification: "Needed".into(),
            proposed_by: Some("gov".into()),
            created_at: Utc::now(),
        };
        let tally = Tally {
            proposal_id: "p1".into(),
            approve_count: 2,
            reject_count: 1,
        };

        let json = serde_json::to_value(ProposalView::new(proposal, tally, Some(true))).unwrap();
        assert_eq!(json["tally"]["approveCount"], 2);
        assert_eq!(json["myVote"], true);
        assert_eq!(json["difficulty"], "expert");
    }
}
