//! Competency assignment (enrollment) operations using Diesel
//!
//! The (student_id, competency_id) primary key is the concurrency primitive:
//! two racing enrolls for the same pair land on the same row.

use diesel::prelude::*;

use super::diesel_schema::competency_assignments;
use super::models::{current_timestamp, Assignment, NewAssignment};
use crate::error::CompetencyError;

// ============================================================================
// Read Operations
// ============================================================================

/// Get a single assignment
pub fn get_assignment(
    conn: &mut SqliteConnection,
    student_id: &str,
    competency_id: &str,
) -> Result<Option<Assignment>, CompetencyError> {
    Ok(competency_assignments::table
        .filter(competency_assignments::student_id.eq(student_id))
        .filter(competency_assignments::competency_id.eq(competency_id))
        .select(Assignment::as_select())
        .first(conn)
        .optional()?)
}

/// All assignments for a student
pub fn list_for_student(
    conn: &mut SqliteConnection,
    student_id: &str,
) -> Result<Vec<Assignment>, CompetencyError> {
    Ok(competency_assignments::table
        .filter(competency_assignments::student_id.eq(student_id))
        .order(competency_assignments::competency_id.asc())
        .select(Assignment::as_select())
        .load(conn)?)
}

/// Number of assignment rows for a pair (0 or 1)
pub fn count_for_pair(
    conn: &mut SqliteConnection,
    student_id: &str,
    competency_id: &str,
) -> Result<i64, CompetencyError> {
    Ok(competency_assignments::table
        .filter(competency_assignments::student_id.eq(student_id))
        .filter(competency_assignments::competency_id.eq(competency_id))
        .count()
        .get_result(conn)?)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Idempotent enroll: inserts the pair or refreshes `assigned_at`
pub fn upsert_assignment(
    conn: &mut SqliteConnection,
    student_id: &str,
    competency_id: &str,
) -> Result<Assignment, CompetencyError> {
    let now = current_timestamp();

    diesel::insert_into(competency_assignments::table)
        .values(&NewAssignment {
            student_id,
            competency_id,
            assigned_at: &now,
        })
        .on_conflict((
            competency_assignments::student_id,
            competency_assignments::competency_id,
        ))
        .do_update()
        .set(competency_assignments::assigned_at.eq(&now))
        .execute(conn)?;

    get_assignment(conn, student_id, competency_id)?
        .ok_or_else(|| CompetencyError::Internal("Failed to retrieve upserted assignment".into()))
}

/// Batched enroll: every pair is upserted in one transaction, or none is
pub fn bulk_upsert_assignments(
    conn: &mut SqliteConnection,
    student_id: &str,
    competency_ids: &[String],
) -> Result<Vec<Assignment>, CompetencyError> {
    conn.transaction(|conn| {
        competency_ids
            .iter()
            .map(|competency_id| upsert_assignment(conn, student_id, competency_id))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::competencies::{upsert_competency, CreateCompetencyInput};
    use crate::db::models::roles;
    use crate::db::profiles::{upsert_profile, CreateProfileInput};
    use crate::db::schema::init_schema;

    fn setup_test_db() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:")
            .expect("Failed to create in-memory database");
        init_schema(&mut conn).expect("Failed to init schema");

        upsert_profile(&mut conn, &CreateProfileInput {
            id: "ada".into(),
            role: roles::LEARNER.into(),
            display_name: None,
        })
        .unwrap();
        for id in ["ecg", "acls"] {
            upsert_competency(&mut conn, &CreateCompetencyInput {
                id: id.into(),
                name: id.to_uppercase(),
                difficulty: "beginner".into(),
                tags: vec![],
            })
            .unwrap();
        }
        conn
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut conn = setup_test_db();

        let first = upsert_assignment(&mut conn, "ada", "ecg").unwrap();
        let second = upsert_assignment(&mut conn, "ada", "ecg").unwrap();

        assert_eq!(count_for_pair(&mut conn, "ada", "ecg").unwrap(), 1);
        assert!(second.assigned_at >= first.assigned_at);
    }

    #[test]
    fn test_bulk_upsert() {
        let mut conn = setup_test_db();
        upsert_assignment(&mut conn, "ada", "ecg").unwrap();

        let ids = ["ecg".to_string(), "acls".to_string()];
        let rows = bulk_upsert_assignments(&mut conn, "ada", &ids).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(list_for_student(&mut conn, "ada").unwrap().len(), 2);
    }
}
