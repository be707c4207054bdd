//! Competency catalog operations using Diesel
//!
//! The catalog is read-only to the progress, enrollment, review and voting
//! components. Writes here exist for seeding and question authoring.

use std::collections::HashMap;

use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use super::diesel_schema::{competencies, competency_tags, questions};
use super::models::{
    current_timestamp, difficulties, CompetencyRow, CompetencyTag, NewCompetency,
    NewCompetencyTag, NewQuestion, Question,
};
use crate::error::CompetencyError;

// ============================================================================
// Query Types
// ============================================================================

/// Input for creating a competency
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCompetencyInput {
    pub id: String,
    pub name: String,
    pub difficulty: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Input for adding a question to a competency
#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuestionInput {
    #[serde(default)]
    pub id: Option<String>,
    pub competency_id: String,
    pub prompt: String,
}

/// Competency row with its tags attached
#[derive(Debug, Clone)]
pub struct CompetencyWithTags {
    pub competency: CompetencyRow,
    pub tags: Vec<String>,
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get competency by ID, with tags
pub fn get_competency(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<CompetencyWithTags>, CompetencyError> {
    let row: Option<CompetencyRow> = competencies::table
        .filter(competencies::id.eq(id))
        .select(CompetencyRow::as_select())
        .first(conn)
        .optional()?;

    match row {
        Some(competency) => {
            let tags = competency_tags::table
                .filter(competency_tags::competency_id.eq(id))
                .order(competency_tags::tag.asc())
                .select(competency_tags::tag)
                .load(conn)?;
            Ok(Some(CompetencyWithTags { competency, tags }))
        }
        None => Ok(None),
    }
}

/// List the full catalog ordered by name, with tags
pub fn list_competencies(
    conn: &mut SqliteConnection,
) -> Result<Vec<CompetencyWithTags>, CompetencyError> {
    let rows: Vec<CompetencyRow> = competencies::table
        .order((competencies::name.asc(), competencies::id.asc()))
        .select(CompetencyRow::as_select())
        .load(conn)?;

    let tag_rows: Vec<CompetencyTag> = competency_tags::table
        .order(competency_tags::tag.asc())
        .select(CompetencyTag::as_select())
        .load(conn)?;

    let mut tags_by_competency: HashMap<String, Vec<String>> = HashMap::new();
    for tag in tag_rows {
        tags_by_competency
            .entry(tag.competency_id)
            .or_default()
            .push(tag.tag);
    }

    Ok(rows
        .into_iter()
        .map(|competency| {
            let tags = tags_by_competency.remove(&competency.id).unwrap_or_default();
            CompetencyWithTags { competency, tags }
        })
        .collect())
}

pub fn get_question(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Question>, CompetencyError> {
    Ok(questions::table
        .filter(questions::id.eq(id))
        .select(Question::as_select())
        .first(conn)
        .optional()?)
}

/// Questions currently defined for a competency
pub fn list_questions(
    conn: &mut SqliteConnection,
    competency_id: &str,
) -> Result<Vec<Question>, CompetencyError> {
    Ok(questions::table
        .filter(questions::competency_id.eq(competency_id))
        .order(questions::created_at.asc())
        .select(Question::as_select())
        .load(conn)?)
}

/// Current question totals per competency.
///
/// Competencies without questions are absent from the result.
pub fn question_totals(
    conn: &mut SqliteConnection,
    competency_ids: &[String],
) -> Result<HashMap<String, i64>, CompetencyError> {
    if competency_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(String, i64)> = questions::table
        .filter(questions::competency_id.eq_any(competency_ids))
        .group_by(questions::competency_id)
        .select((questions::competency_id, diesel::dsl::count_star()))
        .load(conn)?;

    Ok(rows.into_iter().collect())
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create (or replace the name, difficulty and tags of) a competency
pub fn upsert_competency(
    conn: &mut SqliteConnection,
    input: &CreateCompetencyInput,
) -> Result<CompetencyWithTags, CompetencyError> {
    if input.name.trim().is_empty() {
        return Err(CompetencyError::Validation("Competency name is required".into()));
    }
    if !difficulties::is_valid(&input.difficulty) {
        return Err(CompetencyError::Validation(format!(
            "Invalid difficulty: {}. Valid difficulties: {:?}",
            input.difficulty,
            difficulties::ALL
        )));
    }

    conn.transaction(|conn| {
        let now = current_timestamp();
        diesel::insert_into(competencies::table)
            .values(&NewCompetency {
                id: &input.id,
                name: input.name.trim(),
                difficulty: &input.difficulty,
                created_at: &now,
            })
            .on_conflict(competencies::id)
            .do_update()
            .set((
                competencies::name.eq(input.name.trim()),
                competencies::difficulty.eq(&input.difficulty),
            ))
            .execute(conn)?;

        diesel::delete(competency_tags::table.filter(competency_tags::competency_id.eq(&input.id)))
            .execute(conn)?;

        for tag in normalized_tags(&input.tags) {
            diesel::insert_into(competency_tags::table)
                .values(&NewCompetencyTag {
                    competency_id: &input.id,
                    tag: &tag,
                })
                .on_conflict_do_nothing()
                .execute(conn)?;
        }

        get_competency(conn, &input.id)?.ok_or_else(|| {
            CompetencyError::Internal("Failed to retrieve created competency".into())
        })
    })
}

/// Add a question to a competency.
///
/// Raises the competency's current total, which lowers organic progress for
/// anyone who has not answered it yet.
pub fn add_question(
    conn: &mut SqliteConnection,
    input: &CreateQuestionInput,
) -> Result<Question, CompetencyError> {
    if input.prompt.trim().is_empty() {
        return Err(CompetencyError::Validation("Question prompt is required".into()));
    }

    let exists: i64 = competencies::table
        .filter(competencies::id.eq(&input.competency_id))
        .count()
        .get_result(conn)?;
    if exists == 0 {
        return Err(CompetencyError::NotFound(format!(
            "competency {}",
            input.competency_id
        )));
    }

    let id = input.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    let now = current_timestamp();

    diesel::insert_into(questions::table)
        .values(&NewQuestion {
            id: &id,
            competency_id: &input.competency_id,
            prompt: input.prompt.trim(),
            created_at: &now,
        })
        .execute(conn)?;

    Ok(questions::table
        .filter(questions::id.eq(&id))
        .select(Question::as_select())
        .first(conn)?)
}

/// Trim, drop empties and dedupe tags
pub fn normalized_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    fn setup_test_db() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:")
            .expect("Failed to create in-memory database");
        init_schema(&mut conn).expect("Failed to init schema");
        conn
    }

    fn competency(id: &str, name: &str, difficulty: &str, tags: &[&str]) -> CreateCompetencyInput {
        CreateCompetencyInput {
            id: id.to_string(),
            name: name.to_string(),
            difficulty: difficulty.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_upsert_and_list_with_tags() {
        let mut conn = setup_test_db();
        let ecg = competency("ecg", "ECG Basics", "beginner", &["Cardio", "ecg", " "]);
        upsert_competency(&mut conn, &ecg).unwrap();
        upsert_competency(&mut conn, &competency("acls", "ACLS", "expert", &["cardio"])).unwrap();

        let catalog = list_competencies(&mut conn).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].competency.id, "acls");
        assert_eq!(catalog[1].tags, vec!["cardio".to_string(), "ecg".to_string()]);
    }

    #[test]
    fn test_invalid_difficulty_rejected() {
        let mut conn = setup_test_db();
        let result = upsert_competency(&mut conn, &competency("x", "X", "legendary", &[]));
        assert!(matches!(result, Err(CompetencyError::Validation(_))));
    }

    #[test]
    fn test_question_totals_reflect_current_questions() {
        let mut conn = setup_test_db();
        upsert_competency(&mut conn, &competency("ecg", "ECG Basics", "beginner", &[])).unwrap();
        upsert_competency(&mut conn, &competency("empty", "Empty", "beginner", &[])).unwrap();

        for prompt in ["P wave?", "QRS?"] {
            add_question(&mut conn, &CreateQuestionInput {
                id: None,
                competency_id: "ecg".into(),
                prompt: prompt.into(),
            })
            .unwrap();
        }

        let ids = ["ecg".to_string(), "empty".to_string()];
        let totals = question_totals(&mut conn, &ids).unwrap();
        assert_eq!(totals.get("ecg"), Some(&2));
        assert_eq!(totals.get("empty"), None);
    }

    #[test]
    fn test_get_question() {
        let mut conn = setup_test_db();
        upsert_competency(&mut conn, &competency("ecg", "ECG Basics", "beginner", &[])).unwrap();
        let added = add_question(&mut conn, &CreateQuestionInput {
            id: Some("ecg-q1".into()),
            competency_id: "ecg".into(),
            prompt: "P wave?".into(),
        })
        .unwrap();

        let found = get_question(&mut conn, &added.id).unwrap().unwrap();
        assert_eq!(found.competency_id, "ecg");
        assert!(get_question(&mut conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_add_question_unknown_competency() {
        let mut conn = setup_test_db();
        let result = add_question(&mut conn, &CreateQuestionInput {
            id: None,
            competency_id: "nope".into(),
            prompt: "?".into(),
        });
        assert!(matches!(result, Err(CompetencyError::NotFound(_))));
    }
}
