#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use lamad_competency::db::competencies::{self, CreateQuestionInput};
use lamad_competency::db::seed::{apply_seed, SeedFile};
use lamad_competency::db::answers;
use lamad_competency::records::{
    Competency, Enrollment, Identity, ProgressOverride, ProposedCompetency, Question,
    QuestionCounts, Tally, Vote,
};
use lamad_competency::store::NewProposal;
use lamad_competency::{
    CompetencyError, CompetencyStore, Config, RetryPolicy, Services, SqliteStore,
};

/// Profiles, one admin and a small clinical catalog
pub const SEED: &str = r#"{
    "profiles": [
        { "id": "ada", "role": "learner", "display_name": "Ada" },
        { "id": "bea", "role": "learner" },
        { "id": "sam", "role": "supervisor" },
        { "id": "gov-a", "role": "governance" },
        { "id": "gov-b", "role": "governance" },
        { "id": "root", "role": "learner" }
    ],
    "admins": ["root"],
    "competencies": [
        {
            "id": "ecg-basics", "name": "ECG Basics",
            "difficulty": "beginner", "tags": ["cardio"],
            "questions": [
                { "id": "ecg-q1", "prompt": "Normal PR interval?" },
                { "id": "ecg-q2", "prompt": "Identify atrial fibrillation" }
            ]
        },
        {
            "id": "cpr", "name": "CPR", "difficulty": "beginner", "tags": ["emergency"],
            "questions": [{ "id": "cpr-q1", "prompt": "Compression depth?" }]
        },
        {
            "id": "vent-mgmt", "name": "Ventilator Management",
            "difficulty": "expert", "tags": ["icu"],
            "questions": [{ "id": "vent-q1", "prompt": "Initial tidal volume?" }]
        },
        {
            "id": "cardiac-cath", "name": "Cardiac Catheterization",
            "difficulty": "expert", "tags": ["cardio"]
        },
        {
            "id": "neuro-crit", "name": "Neurocritical Care",
            "difficulty": "expert", "tags": ["icu"]
        }
    ]
}"#;

pub fn seeded_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    let seed = SeedFile::from_json(SEED).unwrap();
    store.database().with_conn(|conn| apply_seed(conn, &seed)).unwrap();
    store
}

pub fn test_config() -> Config {
    Config {
        read_retry: RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
        },
        ..Config::default()
    }
}

pub fn services(store: Arc<dyn CompetencyStore>) -> Arc<Services> {
    Arc::new(Services::new(store, &test_config()))
}

pub fn add_question(store: &SqliteStore, competency_id: &str, question_id: &str) {
    store
        .database()
        .with_conn(|conn| {
            competencies::add_question(conn, &CreateQuestionInput {
                id: Some(question_id.to_string()),
                competency_id: competency_id.to_string(),
                prompt: format!("Question {}", question_id),
            })
        })
        .unwrap();
}

pub fn answer(store: &SqliteStore, learner_id: &str, question_id: &str, is_correct: bool) {
    store
        .database()
        .with_conn(|conn| answers::record_answer(conn, learner_id, question_id, is_correct))
        .unwrap();
}

/// Store wrapper that can reject writes, fail reads, or hold writes in flight
pub struct FlakyStore {
    inner: SqliteStore,
    pub fail_writes: AtomicBool,
    pub fail_catalog: AtomicBool,
    /// Upcoming `enrollments` reads that fail with a transient error
    pub enrollment_read_failures: AtomicU32,
    pub fail_tally: AtomicBool,
    pub hold_writes: AtomicBool,
    /// Signalled when a held write starts
    pub write_entered: Notify,
    /// Releases a held write
    pub write_release: Notify,
}

impl FlakyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_catalog: AtomicBool::new(false),
            enrollment_read_failures: AtomicU32::new(0),
            fail_tally: AtomicBool::new(false),
            hold_writes: AtomicBool::new(false),
            write_entered: Notify::new(),
            write_release: Notify::new(),
        }
    }

    pub fn inner(&self) -> &SqliteStore {
        &self.inner
    }

    async fn before_write(&self, operation: &str) -> Result<(), CompetencyError> {
        if self.hold_writes.load(Ordering::SeqCst) {
            self.write_entered.notify_one();
            self.write_release.notified().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CompetencyError::Remote(format!("{} rejected by store", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl CompetencyStore for FlakyStore {
    async fn profile(&self, id: &str) -> Result<Option<Identity>, CompetencyError> {
        self.inner.profile(id).await
    }

    async fn is_app_admin(&self, id: &str) -> Result<bool, CompetencyError> {
        self.inner.is_app_admin(id).await
    }

    async fn learners(&self) -> Result<Vec<Identity>, CompetencyError> {
        self.inner.learners().await
    }

    async fn catalog(&self) -> Result<Vec<Competency>, CompetencyError> {
        if self.fail_catalog.load(Ordering::SeqCst) {
            return Err(CompetencyError::Remote("catalog unavailable".into()));
        }
        self.inner.catalog().await
    }

    async fn competency(&self, id: &str) -> Result<Option<Competency>, CompetencyError> {
        self.inner.competency(id).await
    }

    async fn question(&self, id: &str) -> Result<Option<Question>, CompetencyError> {
        self.inner.question(id).await
    }

    async fn enrollments(&self, learner_id: &str) -> Result<Vec<Enrollment>, CompetencyError> {
        let transient = self
            .enrollment_read_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(CompetencyError::Remote("connection reset".into()));
        }
        self.inner.enrollments(learner_id).await
    }

    async fn upsert_enrollment(
        &self,
        learner_id: &str,
        competency_id: &str,
    ) -> Result<Enrollment, CompetencyError> {
        self.before_write("upsert_enrollment").await?;
        self.inner.upsert_enrollment(learner_id, competency_id).await
    }

    async fn upsert_enrollments(
        &self,
        learner_id: &str,
        competency_ids: &[String],
    ) -> Result<Vec<Enrollment>, CompetencyError> {
        self.before_write("upsert_enrollments").await?;
        self.inner.upsert_enrollments(learner_id, competency_ids).await
    }

    async fn question_counts(
        &self,
        learner_id: &str,
        competency_ids: &[String],
    ) -> Result<HashMap<String, QuestionCounts>, CompetencyError> {
        self.inner.question_counts(learner_id, competency_ids).await
    }

    async fn progress_overrides(
        &self,
        learner_id: &str,
    ) -> Result<Vec<ProgressOverride>, CompetencyError> {
        self.inner.progress_overrides(learner_id).await
    }

    async fn record_answer(
        &self,
        learner_id: &str,
        question_id: &str,
        is_correct: bool,
    ) -> Result<(), CompetencyError> {
        self.before_write("record_answer").await?;
        self.inner.record_answer(learner_id, question_id, is_correct).await
    }

    async fn mark_competency_complete(
        &self,
        learner_id: &str,
        competency_id: &str,
        approver_id: &str,
    ) -> Result<ProgressOverride, CompetencyError> {
        self.before_write("mark_competency_complete").await?;
        self.inner
            .mark_competency_complete(learner_id, competency_id, approver_id)
            .await
    }

    async fn proposals(&self) -> Result<Vec<ProposedCompetency>, CompetencyError> {
        self.inner.proposals().await
    }

    async fn proposal(&self, id: &str) -> Result<Option<ProposedCompetency>, CompetencyError> {
        self.inner.proposal(id).await
    }

    async fn create_proposal(
        &self,
        proposal: NewProposal,
    ) -> Result<ProposedCompetency, CompetencyError> {
        self.before_write("create_proposal").await?;
        self.inner.create_proposal(proposal).await
    }

    async fn upsert_vote(
        &self,
        voter_id: &str,
        proposal_id: &str,
        approve: bool,
    ) -> Result<Vote, CompetencyError> {
        self.before_write("upsert_vote").await?;
        self.inner.upsert_vote(voter_id, proposal_id, approve).await
    }

    async fn votes_by(&self, voter_id: &str) -> Result<Vec<Vote>, CompetencyError> {
        self.inner.votes_by(voter_id).await
    }

    async fn tally(&self, proposal_id: &str) -> Result<Tally, CompetencyError> {
        if self.fail_tally.load(Ordering::SeqCst) {
            return Err(CompetencyError::Remote("tally unavailable".into()));
        }
        self.inner.tally(proposal_id).await
    }
}
