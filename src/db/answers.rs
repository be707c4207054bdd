//! Student answer operations using Diesel

use std::collections::HashMap;

use diesel::prelude::*;

use super::diesel_schema::{questions, student_answers};
use super::models::{current_timestamp, NewStudentAnswer, StudentAnswer};
use crate::error::CompetencyError;

/// Record (or re-record) an answer; one row per (student, question)
pub fn record_answer(
    conn: &mut SqliteConnection,
    student_id: &str,
    question_id: &str,
    is_correct: bool,
) -> Result<StudentAnswer, CompetencyError> {
    let now = current_timestamp();
    let correct = if is_correct { 1 } else { 0 };

    diesel::insert_into(student_answers::table)
        .values(&NewStudentAnswer {
            student_id,
            question_id,
            is_correct: correct,
            answered_at: &now,
        })
        .on_conflict((student_answers::student_id, student_answers::question_id))
        .do_update()
        .set((
            student_answers::is_correct.eq(correct),
            student_answers::answered_at.eq(&now),
        ))
        .execute(conn)?;

    Ok(student_answers::table
        .filter(student_answers::student_id.eq(student_id))
        .filter(student_answers::question_id.eq(question_id))
        .select(StudentAnswer::as_select())
        .first(conn)?)
}

/// Distinct answered questions per competency for a student.
///
/// Joins through `questions`, so answers to deleted questions drop out and the
/// count can never exceed the competency's current total.
pub fn answered_counts(
    conn: &mut SqliteConnection,
    student_id: &str,
    competency_ids: &[String],
) -> Result<HashMap<String, i64>, CompetencyError> {
    if competency_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(String, i64)> = student_answers::table
        .inner_join(questions::table)
        .filter(student_answers::student_id.eq(student_id))
        .filter(questions::competency_id.eq_any(competency_ids))
        .group_by(questions::competency_id)
        .select((questions::competency_id, diesel::dsl::count_star()))
        .load(conn)?;

    Ok(rows.into_iter().collect())
}
