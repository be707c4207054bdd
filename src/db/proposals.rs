//! Staged competency proposal operations using Diesel

use std::collections::HashMap;

use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use super::competencies::normalized_tags;
use super::diesel_schema::{competencies_stage, competency_stage_tags};
use super::models::{
    current_timestamp, NewStageTag, NewStagedCompetency, StageTag, StagedCompetency,
};
use crate::error::CompetencyError;

/// Input for staging a proposal
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProposalInput {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub difficulty: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub justification: String,
    #[serde(default)]
    pub proposed_by: Option<String>,
}

/// Staged proposal with tags attached
#[derive(Debug, Clone)]
pub struct StagedWithTags {
    pub stage: StagedCompetency,
    pub tags: Vec<String>,
}

/// Get a staged proposal with tags
pub fn get_proposal(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<StagedWithTags>, CompetencyError> {
    let stage: Option<StagedCompetency> = competencies_stage::table
        .filter(competencies_stage::id.eq(id))
        .select(StagedCompetency::as_select())
        .first(conn)
        .optional()?;

    match stage {
        Some(stage) => {
            let tags = competency_stage_tags::table
                .filter(competency_stage_tags::stage_id.eq(id))
                .order(competency_stage_tags::tag.asc())
                .select(competency_stage_tags::tag)
                .load(conn)?;
            Ok(Some(StagedWithTags { stage, tags }))
        }
        None => Ok(None),
    }
}

/// All staged proposals, newest first
pub fn list_proposals(conn: &mut SqliteConnection) -> Result<Vec<StagedWithTags>, CompetencyError> {
    let stages: Vec<StagedCompetency> = competencies_stage::table
        .order((competencies_stage::created_at.desc(), competencies_stage::id.asc()))
        .select(StagedCompetency::as_select())
        .load(conn)?;

    let tag_rows: Vec<StageTag> = competency_stage_tags::table
        .order(competency_stage_tags::tag.asc())
        .select(StageTag::as_select())
        .load(conn)?;

    let mut tags_by_stage: HashMap<String, Vec<String>> = HashMap::new();
    for row in tag_rows {
        tags_by_stage.entry(row.stage_id).or_default().push(row.tag);
    }

    Ok(stages
        .into_iter()
        .map(|stage| {
            let tags = tags_by_stage.remove(&stage.id).unwrap_or_default();
            StagedWithTags { stage, tags }
        })
        .collect())
}

/// Stage a new proposal with its tags.
///
/// Field validation happens before this is reached; the store only enforces shape.
pub fn create_proposal(
    conn: &mut SqliteConnection,
    input: &CreateProposalInput,
) -> Result<StagedWithTags, CompetencyError> {
    let id = input.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

    conn.transaction(|conn| {
        let now = current_timestamp();
        diesel::insert_into(competencies_stage::table)
            .values(&NewStagedCompetency {
                id: &id,
                name: input.name.trim(),
                difficulty: &input.difficulty,
                justification: input.justification.trim(),
                proposed_by: input.proposed_by.as_deref(),
                created_at: &now,
            })
            .execute(conn)?;

        for tag in normalized_tags(&input.tags) {
            diesel::insert_into(competency_stage_tags::table)
                .values(&NewStageTag {
                    stage_id: &id,
                    tag: &tag,
                })
                .on_conflict_do_nothing()
                .execute(conn)?;
        }

        get_proposal(conn, &id)?
            .ok_or_else(|| CompetencyError::Internal("Failed to retrieve staged proposal".into()))
    })
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

    #[test]
    fn test_create_and_get_proposal() {
        let mut conn = setup_test_db();

        let created = create_proposal(&mut conn, &CreateProposalInput {
            id: Some("x".into()),
            name: " Point-of-care Ultrasound ".into(),
            difficulty: "expert".into(),
            tags: vec!["Imaging".into(), "imaging".into()],
            justification: "Widely used at bedside".into(),
            proposed_by: Some("gov-a".into()),
        })
        .unwrap();

        assert_eq!(created.stage.name, "Point-of-care Ultrasound");
        assert_eq!(created.tags, vec!["imaging".to_string()]);
        assert!(get_proposal(&mut conn, "x").unwrap().is_some());
        assert!(get_proposal(&mut conn, "y").unwrap().is_none());
        assert_eq!(list_proposals(&mut conn).unwrap().len(), 1);
    }
}
