//! Typed records
//!
//! Every row that leaves the store is converted here, once, into a strongly
//! typed record. Call sites past this boundary never re-check role strings,
//! difficulty strings, integer booleans or timestamp formats.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::competencies::CompetencyWithTags;
use crate::db::models::{
    self, difficulties, roles, Assignment, CommitteeVote, Profile, ProgressOverrideRow,
};
use crate::db::proposals::StagedWithTags;
use crate::error::CompetencyError;

// ============================================================================
// Enumerations
// ============================================================================

/// Primary role of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Learner,
    Supervisor,
    Governance,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => roles::LEARNER,
            Role::Supervisor => roles::SUPERVISOR,
            Role::Governance => roles::GOVERNANCE,
        }
    }
}

impl FromStr for Role {
    type Err = CompetencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            roles::LEARNER => Ok(Role::Learner),
            roles::SUPERVISOR => Ok(Role::Supervisor),
            roles::GOVERNANCE => Ok(Role::Governance),
            other => Err(CompetencyError::Malformed(format!("unknown role '{}'", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Competency difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Expert,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => difficulties::BEGINNER,
            Difficulty::Intermediate => difficulties::INTERMEDIATE,
            Difficulty::Expert => difficulties::EXPERT,
        }
    }
}

impl FromStr for Difficulty {
    type Err = CompetencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            difficulties::BEGINNER => Ok(Difficulty::Beginner),
            difficulties::INTERMEDIATE => Ok(Difficulty::Intermediate),
            difficulties::EXPERT => Ok(Difficulty::Expert),
            other => Err(CompetencyError::Malformed(format!("unknown difficulty '{}'", other))),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion classification of a progress record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Identity as resolved from `profiles`. The admin override flag is not part
/// of the identity; the gate looks it up separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub role: Role,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Competency {
    pub id: String,
    pub name: String,
    pub difficulty: Difficulty,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Competency {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag.trim().to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedCompetency {
    pub id: String,
    pub name: String,
    pub difficulty: Difficulty,
    pub tags: BTreeSet<String>,
    pub justification: String,
    pub proposed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub learner_id: String,
    pub competency_id: String,
    pub enrolled_at: DateTime<Utc>,
}

/// Materialized review override for a pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressOverride {
    pub learner_id: String,
    pub competency_id: String,
    pub percent: u8,
    pub approved_by: Option<String>,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub competency_id: String,
    pub prompt: String,
}

/// Raw per-competency counts for an enrolled learner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuestionCounts {
    pub total_questions: u32,
    pub answered_questions: u32,
}

/// Derived progress for a (learner, competency) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub learner_id: String,
    pub competency_id: String,
    pub total_questions: u32,
    pub answered_questions: u32,
    pub percent: u8,
    pub status: ProgressStatus,
    pub overridden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub voter_id: String,
    pub proposal_id: String,
    pub approve: bool,
}

/// Approve/reject counts for a proposal, recomputed from the vote rows
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Tally {
    pub proposal_id: String,
    pub approve_count: u64,
    pub reject_count: u64,
}

// ============================================================================
// Ingestion
// ============================================================================

/// Parse a stored TEXT timestamp (RFC 3339, or SQLite's `datetime('now')` form)
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, CompetencyError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| CompetencyError::Malformed(format!("bad timestamp '{}'", value)))
}

fn clamp_percent(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}

impl TryFrom<Profile> for Identity {
    type Error = CompetencyError;

    fn try_from(row: Profile) -> Result<Self, Self::Error> {
        Ok(Self {
            role: row.role.parse()?,
            id: row.id,
            display_name: row.display_name,
        })
    }
}

impl TryFrom<CompetencyWithTags> for Competency {
    type Error = CompetencyError;

    fn try_from(row: CompetencyWithTags) -> Result<Self, Self::Error> {
        Ok(Self {
            difficulty: row.competency.difficulty.parse()?,
            created_at: parse_timestamp(&row.competency.created_at)?,
            id: row.competency.id,
            name: row.competency.name,
            tags: row.tags.into_iter().collect(),
        })
    }
}

impl TryFrom<StagedWithTags> for ProposedCompetency {
    type Error = CompetencyError;

    fn try_from(row: StagedWithTags) -> Result<Self, Self::Error> {
        Ok(Self {
            difficulty: row.stage.difficulty.parse()?,
            created_at: parse_timestamp(&row.stage.created_at)?,
            id: row.stage.id,
            name: row.stage.name,
            tags: row.tags.into_iter().collect(),
            justification: row.stage.justification,
            proposed_by: row.stage.proposed_by,
        })
    }
}

impl TryFrom<Assignment> for Enrollment {
    type Error = CompetencyError;

    fn try_from(row: Assignment) -> Result<Self, Self::Error> {
        Ok(Self {
            enrolled_at: parse_timestamp(&row.assigned_at)?,
            learner_id: row.student_id,
            competency_id: row.competency_id,
        })
    }
}

impl TryFrom<ProgressOverrideRow> for ProgressOverride {
    type Error = CompetencyError;

    fn try_from(row: ProgressOverrideRow) -> Result<Self, Self::Error> {
        if row.pct != models::COMPLETED_PCT {
            return Err(CompetencyError::Malformed(format!(
                "override for {}/{} is {} rather than the completed sentinel",
                row.student_id, row.competency_id, row.pct
            )));
        }
        Ok(Self {
            approved_at: parse_timestamp(&row.approved_at)?,
            percent: clamp_percent(row.pct),
            learner_id: row.student_id,
            competency_id: row.competency_id,
            approved_by: row.approved_by,
        })
    }
}

impl From<models::Question> for Question {
    fn from(row: models::Question) -> Self {
        Self {
            id: row.id,
            competency_id: row.competency_id,
            prompt: row.prompt,
        }
    }
}

impl From<CommitteeVote> for Vote {
    fn from(row: CommitteeVote) -> Self {
        Self {
            voter_id: row.voter_id,
            proposal_id: row.stage_id,
            approve: row.vote != 0,
        }
    }
}

/// Convert a batch of rows, failing on the first malformed one
pub fn ingest<R, T>(rows: Vec<R>) -> Result<Vec<T>, CompetencyError>
where
    T: TryFrom<R, Error = CompetencyError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_and_unknown() {
        assert_eq!("governance".parse::<Role>().unwrap(), Role::Governance);
        assert_eq!(Role::Supervisor.to_string(), "supervisor");
        assert!(matches!("Admin".parse::<Role>(), Err(CompetencyError::Malformed(_))));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2026-03-01T10:00:00.250Z").unwrap();
        let sqlite = parse_timestamp("2026-03-01 10:00:00").unwrap();
        assert!(rfc > sqlite);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_override_must_be_sentinel() {
        let row = ProgressOverrideRow {
            student_id: "ada".into(),
            competency_id: "ecg".into(),
            total_questions: 2,
            answered_questions: 1,
            pct: 50,
            approved_by: None,
            approved_at: "2026-03-01T10:00:00Z".into(),
        };
        assert!(ProgressOverride::try_from(row).is_err());
    }

    #[test]
    fn test_competency_tag_lookup_is_normalized() {
        let competency = Competency {
            id: "ecg".into(),
            name: "ECG Basics".into(),
            difficulty: Difficulty::Beginner,
            tags: ["cardio".to_string()].into_iter().collect(),
            created_at: Utc::now(),
        };
        assert!(competency.has_tag(" Cardio "));
        assert!(!competency.has_tag("neuro"));
    }
}
