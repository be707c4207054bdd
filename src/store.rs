//! Store seam between services and the relational store
//!
//! Services only ever talk to [`CompetencyStore`]. [`SqliteStore`] is the
//! Diesel/SQLite implementation: each call checks out a pooled connection on
//! the blocking pool, runs one repository function, and converts rows into
//! typed records. Store calls are the only suspension points in the core.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use diesel::SqliteConnection;

use crate::db::proposals::CreateProposalInput;
use crate::db::{answers, assignments, competencies, profiles, progress, proposals, votes, Database};
use crate::error::CompetencyError;
use crate::records::{
    ingest, Competency, Enrollment, Identity, ProgressOverride, ProposedCompetency, Question,
    QuestionCounts, Tally, Vote,
};

/// New proposal as accepted by the store (already validated)
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub name: String,
    pub difficulty: crate::records::Difficulty,
    pub tags: Vec<String>,
    pub justification: String,
    pub proposed_by: String,
}

#[async_trait]
pub trait CompetencyStore: Send + Sync {
    // Identity
    async fn profile(&self, id: &str) -> Result<Option<Identity>, CompetencyError>;
    async fn is_app_admin(&self, id: &str) -> Result<bool, CompetencyError>;
    async fn learners(&self) -> Result<Vec<Identity>, CompetencyError>;

    // Catalog (read-only)
    async fn catalog(&self) -> Result<Vec<Competency>, CompetencyError>;
    async fn competency(&self, id: &str) -> Result<Option<Competency>, CompetencyError>;
    async fn question(&self, id: &str) -> Result<Option<Question>, CompetencyError>;

    // Enrollment
    async fn enrollments(&self, learner_id: &str) -> Result<Vec<Enrollment>, CompetencyError>;
    async fn upsert_enrollment(
        &self,
        learner_id: &str,
        competency_id: &str,
    ) -> Result<Enrollment, CompetencyError>;
    /// One batched upsert; all rows land or none do
    async fn upsert_enrollments(
        &self,
        learner_id: &str,
        competency_ids: &[String],
    ) -> Result<Vec<Enrollment>, CompetencyError>;

    // Progress sources
    /// Current totals and distinct answered counts per competency id
    async fn question_counts(
        &self,
        learner_id: &str,
        competency_ids: &[String],
    ) -> Result<HashMap<String, QuestionCounts>, CompetencyError>;
    async fn progress_overrides(
        &self,
        learner_id: &str,
    ) -> Result<Vec<ProgressOverride>, CompetencyError>;
    async fn record_answer(
        &self,
        learner_id: &str,
        question_id: &str,
        is_correct: bool,
    ) -> Result<(), CompetencyError>;

    /// `instructor_mark_competency_complete`, atomic inside the store
    async fn mark_competency_complete(
        &self,
        learner_id: &str,
        competency_id: &str,
        approver_id: &str,
    ) -> Result<ProgressOverride, CompetencyError>;

    // Committee
    async fn proposals(&self) -> Result<Vec<ProposedCompetency>, CompetencyError>;
    async fn proposal(&self, id: &str) -> Result<Option<ProposedCompetency>, CompetencyError>;
    async fn create_proposal(
        &self,
        proposal: NewProposal,
    ) -> Result<ProposedCompetency, CompetencyError>;
    async fn upsert_vote(
        &self,
        voter_id: &str,
        proposal_id: &str,
        approve: bool,
    ) -> Result<Vote, CompetencyError>;
    async fn votes_by(&self, voter_id: &str) -> Result<Vec<Vote>, CompetencyError>;
    async fn tally(&self, proposal_id: &str) -> Result<Tally, CompetencyError>;
}

/// Diesel/SQLite store
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open (or create) the database file
    pub fn open(path: &Path, pool_size: u32) -> Result<Self, CompetencyError> {
        Ok(Self::new(Database::open(path, pool_size)?))
    }

    pub fn open_in_memory() -> Result<Self, CompetencyError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Underlying database, for seeding and question authoring
    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn run<F, T>(&self, f: F) -> Result<T, CompetencyError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, CompetencyError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f)).await?
    }
}

#[async_trait]
impl CompetencyStore for SqliteStore {
    async fn profile(&self, id: &str) -> Result<Option<Identity>, CompetencyError> {
        let id = id.to_string();
        self.run(move |conn| profiles::get_profile(conn, &id)?.map(Identity::try_from).transpose())
            .await
    }

    async fn is_app_admin(&self, id: &str) -> Result<bool, CompetencyError> {
        let id = id.to_string();
        self.run(move |conn| profiles::is_app_admin(conn, &id)).await
    }

    async fn learners(&self) -> Result<Vec<Identity>, CompetencyError> {
        self.run(|conn| ingest(profiles::list_by_role(conn, crate::db::models::roles::LEARNER)?))
            .await
    }

    async fn catalog(&self) -> Result<Vec<Competency>, CompetencyError> {
        self.run(|conn| ingest(competencies::list_competencies(conn)?)).await
    }

    async fn competency(&self, id: &str) -> Result<Option<Competency>, CompetencyError> {
        let id = id.to_string();
        self.run(move |conn| {
            competencies::get_competency(conn, &id)?
                .map(Competency::try_from)
                .transpose()
        })
        .await
    }

    async fn question(&self, id: &str) -> Result<Option<Question>, CompetencyError> {
        let id = id.to_string();
        self.run(move |conn| Ok(competencies::get_question(conn, &id)?.map(Question::from)))
            .await
    }

    async fn enrollments(&self, learner_id: &str) -> Result<Vec<Enrollment>, CompetencyError> {
        let learner_id = learner_id.to_string();
        self.run(move |conn| ingest(assignments::list_for_student(conn, &learner_id)?))
            .await
    }

    async fn upsert_enrollment(
        &self,
        learner_id: &str,
        competency_id: &str,
    ) -> Result<Enrollment, CompetencyError> {
        let learner_id = learner_id.to_string();
        let competency_id = competency_id.to_string();
        self.run(move |conn| {
            Enrollment::try_from(assignments::upsert_assignment(conn, &learner_id, &competency_id)?)
        })
        .await
    }

    async fn upsert_enrollments(
        &self,
        learner_id: &str,
        competency_ids: &[String],
    ) -> Result<Vec<Enrollment>, CompetencyError> {
        let learner_id = learner_id.to_string();
        let competency_ids = competency_ids.to_vec();
        self.run(move |conn| {
            ingest(assignments::bulk_upsert_assignments(conn, &learner_id, &competency_ids)?)
        })
        .await
    }

    async fn question_counts(
        &self,
        learner_id: &str,
        competency_ids: &[String],
    ) -> Result<HashMap<String, QuestionCounts>, CompetencyError> {
        let learner_id = learner_id.to_string();
        let competency_ids = competency_ids.to_vec();
        self.run(move |conn| {
            let totals = competencies::question_totals(conn, &competency_ids)?;
            let answered = answers::answered_counts(conn, &learner_id, &competency_ids)?;

            Ok(competency_ids
                .iter()
                .map(|id| {
                    let counts = QuestionCounts {
                        total_questions: totals.get(id).copied().unwrap_or(0).max(0) as u32,
                        answered_questions: answered.get(id).copied().unwrap_or(0).max(0) as u32,
                    };
                    (id.clone(), counts)
                })
                .collect())
        })
        .await
    }

    async fn progress_overrides(
        &self,
        learner_id: &str,
    ) -> Result<Vec<ProgressOverride>, CompetencyError> {
        let learner_id = learner_id.to_string();
        self.run(move |conn| ingest(progress::list_overrides_for_student(conn, &learner_id)?))
            .await
    }

    async fn record_answer(
        &self,
        learner_id: &str,
        question_id: &str,
        is_correct: bool,
    ) -> Result<(), CompetencyError> {
        let learner_id = learner_id.to_string();
        let question_id = question_id.to_string();
        self.run(move |conn| {
            answers::record_answer(conn, &learner_id, &question_id, is_correct).map(|_| ())
        })
        .await
    }

    async fn mark_competency_complete(
        &self,
        learner_id: &str,
        competency_id: &str,
        approver_id: &str,
    ) -> Result<ProgressOverride, CompetencyError> {
        let learner_id = learner_id.to_string();
        let competency_id = competency_id.to_string();
        let approver_id = approver_id.to_string();
        self.run(move |conn| {
            ProgressOverride::try_from(progress::mark_competency_complete(
                conn,
                &learner_id,
                &competency_id,
                &approver_id,
            )?)
        })
        .await
    }

    async fn proposals(&self) -> Result<Vec<ProposedCompetency>, CompetencyError> {
        self.run(|conn| ingest(proposals::list_proposals(conn)?)).await
    }

    async fn proposal(&self, id: &str) -> Result<Option<ProposedCompetency>, CompetencyError> {
        let id = id.to_string();
        self.run(move |conn| {
            proposals::get_proposal(conn, &id)?
                .map(ProposedCompetency::try_from)
                .transpose()
        })
        .await
    }

    async fn create_proposal(
        &self,
        proposal: NewProposal,
    ) -> Result<ProposedCompetency, CompetencyError> {
        self.run(move |conn| {
            ProposedCompetency::try_from(proposals::create_proposal(conn, &CreateProposalInput {
                id: None,
                name: proposal.name,
                difficulty: proposal.difficulty.as_str().to_string(),
                tags: proposal.tags,
                justification: proposal.justification,
                proposed_by: Some(proposal.proposed_by),
            })?)
        })
        .await
    }

    async fn upsert_vote(
        &self,
        voter_id: &str,
        proposal_id: &str,
        approve: bool,
    ) -> Result<Vote, CompetencyError> {
        let voter_id = voter_id.to_string();
        let proposal_id = proposal_id.to_string();
        self.run(move |conn| {
            let row = votes::upsert_vote(conn, &proposal_id, &voter_id, approve)?;
            Ok(Vote::from(row))
        })
        .await
    }

    async fn votes_by(&self, voter_id: &str) -> Result<Vec<Vote>, CompetencyError> {
        let voter_id = voter_id.to_string();
        self.run(move |conn| {
            Ok(votes::list_for_voter(conn, &voter_id)?
                .into_iter()
                .map(Vote::from)
                .collect())
        })
        .await
    }

    async fn tally(&self, proposal_id: &str) -> Result<Tally, CompetencyError> {
        let proposal_id = proposal_id.to_string();
        self.run(move |conn| {
            let (approve, reject) = votes::tally(conn, &proposal_id)?;
            Ok(Tally {
                proposal_id,
                approve_count: approve.max(0) as u64,
                reject_count: reject.max(0) as u64,
            })
        })
        .await
    }
}
