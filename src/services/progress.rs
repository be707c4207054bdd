//! Progress aggregation
//!
//! Progress is derived, never stored, except for supervisor overrides. For
//! each enrollment the percent is `round(100 * answered / total)` with both
//! counts read at query time, so adding questions to a competency lowers the
//! organic percent of everyone enrolled in it. An override pins the pair to
//! 100/Completed and wins over anything derived.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::error::CompetencyError;
use crate::gate::{AuthorizationGate, Surface};
use crate::records::{
    Enrollment, Identity, ProgressOverride, ProgressRecord, ProgressStatus, QuestionCounts,
};
use crate::retry::RetryPolicy;
use crate::store::CompetencyStore;

use super::events::{CompetencyEvent, EventBus};

/// Percent for `answered` of `total`, rounded half up and clamped to 0..=100.
/// A competency with no questions is 0%.
pub fn compute_percent(answered: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let answered = u64::from(answered.min(total));
    let total = u64::from(total);
    ((answered * 200 + total) / (2 * total)).min(100) as u8
}

pub fn classify(percent: u8) -> ProgressStatus {
    if percent >= 100 {
        ProgressStatus::Completed
    } else {
        ProgressStatus::InProgress
    }
}

/// Merge enrollments, current counts and overrides into progress records.
///
/// Only enrolled pairs produce records; an override for a pair that is not in
/// `enrollments` is ignored.
pub fn reconcile(
    enrollments: &[Enrollment],
    counts: &HashMap<String, QuestionCounts>,
    overrides: &[ProgressOverride],
) -> Vec<ProgressRecord> {
    let overridden: HashSet<&str> = overrides.iter().map(|o| o.competency_id.as_str()).collect();

    enrollments
        .iter()
        .map(|enrollment| {
            let counts = counts.get(&enrollment.competency_id).copied().unwrap_or_default();
            let (percent, overridden) = if overridden.contains(enrollment.competency_id.as_str()) {
                (100, true)
            } else {
                (compute_percent(counts.answered_questions, counts.total_questions), false)
            };

            ProgressRecord {
                learner_id: enrollment.learner_id.clone(),
                competency_id: enrollment.competency_id.clone(),
                total_questions: counts.total_questions,
                answered_questions: counts.answered_questions,
                percent,
                status: classify(percent),
                overridden,
            }
        })
        .collect()
}

/// Unweighted mean percent of a learner's records; 0 with no records
pub fn average_percent(records: &[ProgressRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| f64::from(r.percent)).sum::<f64>() / records.len() as f64
}

/// One learner's records and their own average
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerProgress {
    pub learner_id: String,
    pub records: Vec<ProgressRecord>,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortProgress {
    pub learners: Vec<LearnerProgress>,
    /// Mean of each learner's average; 0 for an empty cohort
    pub cohort_average: f64,
}

impl CohortProgress {
    pub fn from_learners(learners: Vec<LearnerProgress>) -> Self {
        let cohort_average = if learners.is_empty() {
            0.0
        } else {
            learners.iter().map(|l| l.average).sum::<f64>() / learners.len() as f64
        };
        Self {
            learners,
            cohort_average,
        }
    }
}

/// Local progress state held by a dashboard, keyed by (learner, competency)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressBoard {
    records: BTreeMap<(String, String), ProgressRecord>,
}

impl ProgressBoard {
    pub fn from_records(records: impl IntoIterator<Item = ProgressRecord>) -> Self {
        let mut board = Self::default();
        board.extend(records);
        board
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = ProgressRecord>) {
        for record in records {
            self.insert(record);
        }
    }

    /// Insert or replace the record for its pair
    pub fn insert(&mut self, record: ProgressRecord) {
        self.records
            .insert((record.learner_id.clone(), record.competency_id.clone()), record);
    }

    /// Replace one learner's records
    pub fn replace_learner(&mut self, learner_id: &str, records: Vec<ProgressRecord>) {
        self.records.retain(|(learner, _), _| learner != learner_id);
        self.extend(records);
    }

    pub fn get(&self, learner_id: &str, competency_id: &str) -> Option<&ProgressRecord> {
        self.records
            .get(&(learner_id.to_string(), competency_id.to_string()))
    }

    pub fn for_learner(&self, learner_id: &str) -> Vec<ProgressRecord> {
        self.records
            .values()
            .filter(|r| r.learner_id == learner_id)
            .cloned()
            .collect()
    }

    /// Pin a pair to 100/Completed. Returns false when the pair is not on the board.
    pub fn mark_completed(&mut self, learner_id: &str, competency_id: &str) -> bool {
        match self
            .records
            .get_mut(&(learner_id.to_string(), competency_id.to_string()))
        {
            Some(record) => {
                record.percent = 100;
                record.status = ProgressStatus::Completed;
                record.overridden = true;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// ProgressAggregator: derived progress for learners and cohorts
pub struct ProgressAggregator {
    store: Arc<dyn CompetencyStore>,
    gate: Arc<AuthorizationGate>,
    events: Arc<EventBus>,
    retry: RetryPolicy,
}

impl ProgressAggregator {
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

    /// Progress for every competency the learner is enrolled in
    pub async fn compute_for_learner(
        &self,
        learner_id: &str,
    ) -> Result<Vec<ProgressRecord>, CompetencyError> {
        let store = &self.store;

        let records = self
            .retry
            .run("compute_for_learner", || async move {
                let enrollments = store.enrollments(learner_id).await?;
                let competency_ids: Vec<String> =
                    enrollments.iter().map(|e| e.competency_id.clone()).collect();
                let counts = store.question_counts(learner_id, &competency_ids).await?;
                let overrides = store.progress_overrides(learner_id).await?;
                Ok::<_, CompetencyError>(reconcile(&enrollments, &counts, &overrides))
            })
            .await?;

        debug!(learner = %learner_id, records = records.len(), "Computed learner progress");
        Ok(records)
    }

    /// Progress for a single pair; NotFound when the learner is not enrolled
    pub async fn progress_for(
        &self,
        learner_id: &str,
        competency_id: &str,
    ) -> Result<ProgressRecord, CompetencyError> {
        self.compute_for_learner(learner_id)
            .await?
            .into_iter()
            .find(|r| r.competency_id == competency_id)
            .ok_or_else(|| {
                CompetencyError::NotFound(format!(
                    "{} is not enrolled in {}",
                    learner_id, competency_id
                ))
            })
    }

    pub async fn learner_average(&self, learner_id: &str) -> Result<f64, CompetencyError> {
        Ok(average_percent(&self.compute_for_learner(learner_id).await?))
    }

    /// Per-learner progress plus the unweighted cohort mean
    pub async fn compute_cohort(
        &self,
        learner_ids: &[String],
    ) -> Result<CohortProgress, CompetencyError> {
        let mut learners = Vec::with_capacity(learner_ids.len());
        for learner_id in learner_ids {
            let records = self.compute_for_learner(learner_id).await?;
            learners.push(LearnerProgress {
                learner_id: learner_id.clone(),
                average: average_percent(&records),
                records,
            });
        }
        Ok(CohortProgress::from_learners(learners))
    }

    /// Every identity with the learner role
    pub async fn learners(&self) -> Result<Vec<Identity>, CompetencyError> {
        let store = &self.store;
        self.retry.run("learners", || async move { store.learners().await }).await
    }

    /// Every learner on record, as a cohort
    pub async fn compute_roster(&self) -> Result<CohortProgress, CompetencyError> {
        let ids: Vec<String> = self.learners().await?.into_iter().map(|l| l.id).collect();
        self.compute_cohort(&ids).await
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Record the caller's answer to a question. Re-answering overwrites.
    pub async fn record_answer(
        &self,
        identity: Option<&str>,
        question_id: &str,
        is_correct: bool,
    ) -> Result<(), CompetencyError> {
        if question_id.trim().is_empty() {
            return Err(CompetencyError::Validation("question id is required".into()));
        }
        let caller = self.gate.authorize(identity, Surface::Learner).await?;

        let store = &self.store;
        let question = self
            .retry
            .run("question", || async move { store.question(question_id).await })
            .await?;
        if question.is_none() {
            return Err(CompetencyError::NotFound(format!("question {}", question_id)));
        }

        self.store.record_answer(&caller.id, question_id, is_correct).await?;

        self.events.emit(CompetencyEvent::AnswerRecorded {
            learner_id: caller.id,
            question_id: question_id.to_string(),
            is_correct,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn enrollment(competency_id: &str) -> Enrollment {
        Enrollment {
            learner_id: "ada".into(),
            competency_id: competency_id.into(),
            enrolled_at: Utc::now(),
        }
    }

    fn counts(total: u32, answered: u32) -> QuestionCounts {
        QuestionCounts {
            total_questions: total,
            answered_questions: answered,
        }
    }

    #[test]
    fn test_compute_percent() {
        assert_eq!(compute_percent(0, 0), 0);
        assert_eq!(compute_percent(3, 0), 0);
        assert_eq!(compute_percent(1, 2), 50);
        assert_eq!(compute_percent(1, 3), 33);
        assert_eq!(compute_percent(2, 3), 67);
        assert_eq!(compute_percent(5, 4), 100);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(99), ProgressStatus::InProgress);
        assert_eq!(classify(100), ProgressStatus::Completed);
    }

    #[test]
    fn test_reconcile_override_wins() {
        let enrollments = vec![enrollment("ecg"), enrollment("cpr")];
        let counts: HashMap<String, QuestionCounts> =
            [("ecg".to_string(), counts(3, 1)), ("cpr".to_string(), counts(2, 1))]
                .into_iter()
                .collect();
        let overrides = vec![ProgressOverride {
            learner_id: "ada".into(),
            competency_id: "ecg".into(),
            percent: 100,
            approved_by: Some("sam".into()),
            approved_at: Utc::now(),
        }];

        let records = reconcile(&enrollments, &counts, &overrides);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].percent, 100);
        assert_eq!(records[0].status, ProgressStatus::Completed);
        assert!(records[0].overridden);
        assert_eq!(records[0].total_questions, 3);

        assert_eq!(records[1].percent, 50);
        assert!(!records[1].overridden);
    }

    #[test]
    fn test_reconcile_missing_counts_is_zero() {
        let records = reconcile(&[enrollment("empty")], &HashMap::new(), &[]);
        assert_eq!(records[0].percent, 0);
        assert_eq!(records[0].status, ProgressStatus::InProgress);
    }

    #[test]
    fn test_cohort_average() {
        assert_eq!(CohortProgress::from_learners(vec![]).cohort_average, 0.0);

        let cohort = CohortProgress::from_learners(vec![
            LearnerProgress {
                learner_id: "ada".into(),
                records: vec![],
                average: 0.0,
            },
            LearnerProgress {
                learner_id: "bob".into(),
                records: vec![],
                average: 80.0,
            },
        ]);
        assert_eq!(cohort.cohort_average, 40.0);
    }

    #[test]
    fn test_board_mark_completed() {
        let records = reconcile(&[enrollment("ecg")], &HashMap::new(), &[]);
        let mut board = ProgressBoard::from_records(records);

        assert!(board.mark_completed("ada", "ecg"));
        assert!(!board.mark_completed("ada", "cpr"));

        let record = board.get("ada", "ecg").unwrap();
        assert_eq!(record.percent, 100);
        assert!(record.overridden);
    }
}
