//! Catalog seeding from a JSON seed file
//!
//! ```json
//! {
//!   "profiles": [{ "id": "ada", "role": "learner" }],
//!   "admins": ["root"],
//!   "competencies": [{
//!     "id": "ecg", "name": "ECG Basics", "difficulty": "beginner",
//!     "tags": ["cardio"],
//!     "questions": [{ "id": "ecg-1", "prompt": "Identify the P wave" }]
//!   }]
//! }
//! ```

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::competencies::{self, CreateCompetencyInput, CreateQuestionInput};
use super::diesel_schema::questions;
use super::profiles::{self, CreateProfileInput};
use crate::error::CompetencyError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub profiles: Vec<CreateProfileInput>,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub competencies: Vec<SeedCompetency>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedCompetency {
    #[serde(flatten)]
    pub competency: CreateCompetencyInput,
    #[serde(default)]
    pub questions: Vec<SeedQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedQuestion {
    pub id: String,
    pub prompt: String,
}

/// Counts of what a seed run touched
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SeedSummary {
    pub profiles: usize,
    pub admins: usize,
    pub competencies: usize,
    pub questions_added: usize,
}

impl SeedFile {
    /// Parse a seed file from JSON text
    pub fn from_json(json: &str) -> Result<Self, CompetencyError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Apply a seed in one transaction. Re-running is safe: rows are upserted and
/// questions that already exist are skipped.
pub fn apply_seed(
    conn: &mut SqliteConnection,
    seed: &SeedFile,
) -> Result<SeedSummary, CompetencyError> {
    conn.transaction(|conn| {
        let mut summary = SeedSummary::default();

        for profile in &seed.profiles {
            profiles::upsert_profile(conn, profile)?;
            summary.profiles += 1;
        }

        for admin in &seed.admins {
            profiles::grant_admin(conn, admin)?;
            summary.admins += 1;
        }

        for entry in &seed.competencies {
            competencies::upsert_competency(conn, &entry.competency)?;
            summary.competencies += 1;

            for question in &entry.questions {
                let exists: i64 = questions::table
                    .filter(questions::id.eq(&question.id))
                    .count()
                    .get_result(conn)?;
                if exists > 0 {
                    continue;
                }
                competencies::add_question(conn, &CreateQuestionInput {
                    id: Some(question.id.clone()),
                    competency_id: entry.competency.id.clone(),
                    prompt: question.prompt.clone(),
                })?;
                summary.questions_added += 1;
            }
        }

        info!(
            profiles = summary.profiles,
            admins = summary.admins,
            competencies = summary.competencies,
            questions_added = summary.questions_added,
            "Seed applied"
        );

        Ok(summary)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    const SEED: &str = r#"{
        "profiles": [
            { "id": "ada", "role": "learner" },
            { "id": "root", "role": "learner", "display_name": "Root" }
        ],
        "admins": ["root"],
        "competencies": [{
            "id": "ecg", "name": "ECG Basics", "difficulty": "beginner",
            "tags": ["cardio"],
            "questions": [
                { "id": "ecg-1", "prompt": "Identify the P wave" },
                { "id": "ecg-2", "prompt": "Measure the QRS" }
            ]
        }]
    }"#;

    #[test]
    fn test_apply_seed_twice() {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        init_schema(&mut conn).unwrap();
        let seed = SeedFile::from_json(SEED).unwrap();

        let first = apply_seed(&mut conn, &seed).unwrap();
        let second = apply_seed(&mut conn, &seed).unwrap();

        assert_eq!(first.questions_added, 2);
        assert_eq!(second.questions_added, 0);
        assert_eq!(second.competencies, 1);
        assert!(profiles::is_app_admin(&mut conn, "root").unwrap());
        assert_eq!(competencies::list_questions(&mut conn, "ecg").unwrap().len(), 2);
    }
}
