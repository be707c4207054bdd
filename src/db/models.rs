//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! Rows are plain storage shapes (TEXT roles, INTEGER booleans). They are
//! turned into typed records exactly once, in `crate::records`.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::*;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Get current UTC timestamp as RFC 3339 string (millisecond precision)
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

// ============================================================================
// Identity Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = profiles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Profile {
    pub id: String,
    pub role: String,
    pub display_name: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile<'a> {
    pub id: &'a str,
    pub role: &'a str,
    pub display_name: Option<&'a str>,
    pub created_at: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = app_admins)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AppAdmin {
    pub user_id: String,
    pub granted_at: String,
}

// ============================================================================
// Catalog Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = competencies)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CompetencyRow {
    pub id: String,
    pub name: String,
    pub difficulty: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = competencies)]
pub struct NewCompetency<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub difficulty: &'a str,
    pub created_at: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = competency_tags)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CompetencyTag {
    pub competency_id: String,
    pub tag: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = competency_tags)]
pub struct NewCompetencyTag<'a> {
    pub competency_id: &'a str,
    pub tag: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = questions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Question {
    pub id: String,
    pub competency_id: String,
    pub prompt: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = questions)]
pub struct NewQuestion<'a> {
    pub id: &'a str,
    pub competency_id: &'a str,
    pub prompt: &'a str,
    pub created_at: &'a str,
}

// ============================================================================
// Progress Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = competency_assignments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Assignment {
    pub student_id: String,
    pub competency_id: String,
    pub assigned_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = competency_assignments)]
pub struct NewAssignment<'a> {
    pub student_id: &'a str,
    pub competency_id: &'a str,
    pub assigned_at: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = student_answers)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StudentAnswer {
    pub student_id: String,
    pub question_id: String,
    pub is_correct: i32,
    pub answered_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = student_answers)]
pub struct NewStudentAnswer<'a> {
    pub student_id: &'a str,
    pub question_id: &'a str,
    pub is_correct: i32,
    pub answered_at: &'a str,
}

/// Materialized review override
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = student_competency_progress)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProgressOverrideRow {
    pub student_id: String,
    pub competency_id: String,
    pub total_questions: i32,
    pub answered_questions: i32,
    pub pct: i32,
    pub approved_by: Option<String>,
    pub approved_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = student_competency_progress)]
pub struct NewProgressOverride<'a> {
    pub student_id: &'a str,
    pub competency_id: &'a str,
    pub total_questions: i32,
    pub answered_questions: i32,
    pub pct: i32,
    pub approved_by: Option<&'a str>,
    pub approved_at: &'a str,
}

// ============================================================================
// Committee Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = competencies_stage)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StagedCompetency {
    pub id: String,
    pub name: String,
    pub difficulty: String,
    pub justification: String,
    pub proposed_by: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = competencies_stage)]
pub struct NewStagedCompetency<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub difficulty: &'a str,
    pub justification: &'a str,
    pub proposed_by: Option<&'a str>,
    pub created_at: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = competency_stage_tags)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StageTag {
    pub stage_id: String,
    pub tag: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = competency_stage_tags)]
pub struct NewStageTag<'a> {
    pub stage_id: &'a str,
    pub tag: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = committee_votes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CommitteeVote {
    pub stage_id: String,
    pub voter_id: String,
    pub vote: i32,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = committee_votes)]
pub struct NewCommitteeVote<'a> {
    pub stage_id: &'a str,
    pub voter_id: &'a str,
    pub vote: i32,
    pub updated_at: &'a str,
}

// ============================================================================
// Constants
// ============================================================================

/// Profile role strings as stored
pub mod roles {
    pub const LEARNER: &str = "learner";
    pub const SUPERVISOR: &str = "supervisor";
    pub const GOVERNANCE: &str = "governance";

    pub const ALL: &[&str] = &[LEARNER, SUPERVISOR, GOVERNANCE];

    pub fn is_valid(role: &str) -> bool {
        ALL.contains(&role)
    }
}

/// Competency difficulty strings as stored
pub mod difficulties {
    pub const BEGINNER: &str = "beginner";
    pub const INTERMEDIATE: &str = "intermediate";
    pub const EXPERT: &str = "expert";

    pub const ALL: &[&str] = &[BEGINNER, INTERMEDIATE, EXPERT];

    pub fn is_valid(difficulty: &str) -> bool {
        ALL.contains(&difficulty)
    }
}

/// Override sentinel written by the review workflow
pub const COMPLETED_PCT: i32 = 100;
