//! Review override operations using Diesel
//!
//! `student_competency_progress` only holds materialized overrides. Organic
//! progress is never stored; it is recomputed from answers on every query.

use diesel::prelude::*;
use tracing::{debug, info};

use super::diesel_schema::student_competency_progress;
use super::models::{current_timestamp, NewProgressOverride, ProgressOverrideRow, COMPLETED_PCT};
use super::{answers, assignments, competencies};
use crate::error::CompetencyError;

/// Get the override for a pair, if any
pub fn get_override(
    conn: &mut SqliteConnection,
    student_id: &str,
    competency_id: &str,
) -> Result<Option<ProgressOverrideRow>, CompetencyError> {
    Ok(student_competency_progress::table
        .filter(student_competency_progress::student_id.eq(student_id))
        .filter(student_competency_progress::competency_id.eq(competency_id))
        .select(ProgressOverrideRow::as_select())
        .first(conn)
        .optional()?)
}

/// All overrides for a student
pub fn list_overrides_for_student(
    conn: &mut SqliteConnection,
    student_id: &str,
) -> Result<Vec<ProgressOverrideRow>, CompetencyError> {
    Ok(student_competency_progress::table
        .filter(student_competency_progress::student_id.eq(student_id))
        .select(ProgressOverrideRow::as_select())
        .load(conn)?)
}

/// `instructor_mark_competency_complete`: pin a pair to the completed sentinel.
///
/// Runs as one transaction: the enrollment check, the count snapshot and the
/// insert either all happen or none do. An existing override is left as is,
/// so repeated approvals return the first approval unchanged.
pub fn mark_competency_complete(
    conn: &mut SqliteConnection,
    student_id: &str,
    competency_id: &str,
    approver_id: &str,
) -> Result<ProgressOverrideRow, CompetencyError> {
    conn.transaction(|conn| {
        if assignments::get_assignment(conn, student_id, competency_id)?.is_none() {
            return Err(CompetencyError::NotFound(format!(
                "enrollment {}/{}",
                student_id, competency_id
            )));
        }

        if let Some(existing) = get_override(conn, student_id, competency_id)? {
            debug!(
                student_id = %student_id,
                competency_id = %competency_id,
                "Competency already marked complete"
            );
            return Ok(existing);
        }

        let ids = [competency_id.to_string()];
        let total = competencies::question_totals(conn, &ids)?
            .get(competency_id)
            .copied()
            .unwrap_or(0);
        let answered = answers::answered_counts(conn, student_id, &ids)?
            .get(competency_id)
            .copied()
            .unwrap_or(0);
        let now = current_timestamp();

        diesel::insert_into(student_competency_progress::table)
            .values(&NewProgressOverride {
                student_id,
                competency_id,
                total_questions: total as i32,
                answered_questions: answered as i32,
                pct: COMPLETED_PCT,
                approved_by: Some(approver_id),
                approved_at: &now,
            })
            .on_conflict((
                student_competency_progress::student_id,
                student_competency_progress::competency_id,
            ))
            .do_nothing()
            .execute(conn)?;

        info!(
            student_id = %student_id,
            competency_id = %competency_id,
            approved_by = %approver_id,
            "Competency marked complete by review"
        );

        get_override(conn, student_id, competency_id)?
            .ok_or_else(|| CompetencyError::Internal("Failed to retrieve progress override".into()))
    })
}

/// Number of override rows for a pair (0 or 1)
pub fn count_for_pair(
    conn: &mut SqliteConnection,
    student_id: &str,
    competency_id: &str,
) -> Result<i64, CompetencyError> {
    Ok(student_competency_progress::table
        .filter(student_competency_progress::student_id.eq(student_id))
        .filter(student_competency_progress::competency_id.eq(competency_id))
        .count()
        .get_result(conn)?)
}
