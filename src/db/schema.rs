//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use tracing::info;

use crate::error::CompetencyError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
}

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), CompetencyError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, CompetencyError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")?;

    let row = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .get_result::<VersionRow>(conn)
        .optional()?;

    Ok(row.map(|r| r.version).unwrap_or(0))
}

/// Set schema version
fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), CompetencyError> {
    conn.batch_execute("DELETE FROM schema_version")?;
    diesel::sql_query("INSERT INTO schema_version (version) VALUES (?)")
        .bind::<Integer, _>(version)
        .execute(conn)?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &mut SqliteConnection) -> Result<(), CompetencyError> {
    conn.transaction(|conn| {
        conn.batch_execute(IDENTITY_SCHEMA)?;
        conn.batch_execute(CATALOG_SCHEMA)?;
        conn.batch_execute(PROGRESS_SCHEMA)?;
        conn.batch_execute(COMMITTEE_SCHEMA)?;
        conn.batch_execute(INDEXES_SCHEMA)?;
        Ok(())
    })
}

/// Profiles and the admin override allow-list
const IDENTITY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY NOT NULL,
    role TEXT NOT NULL,
    display_name TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS app_admins (
    user_id TEXT PRIMARY KEY NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    granted_at TEXT NOT NULL
);
"#;

/// Competency catalog and its questions
const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS competencies (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS competency_tags (
    competency_id TEXT NOT NULL REFERENCES competencies(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    PRIMARY KEY (competency_id, tag)
);

CREATE TABLE IF NOT EXISTS questions (
    id TEXT PRIMARY KEY NOT NULL,
    competency_id TEXT NOT NULL REFERENCES competencies(id) ON DELETE CASCADE,
    prompt TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Enrollment, answers and review overrides
const PROGRESS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS competency_assignments (
    student_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    competency_id TEXT NOT NULL REFERENCES competencies(id) ON DELETE CASCADE,
    assigned_at TEXT NOT NULL,
    PRIMARY KEY (student_id, competency_id)
);

CREATE TABLE IF NOT EXISTS student_answers (
    student_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    question_id TEXT NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
    is_correct INTEGER NOT NULL DEFAULT 0,
    answered_at TEXT NOT NULL,
    PRIMARY KEY (student_id, question_id)
);

CREATE TABLE IF NOT EXISTS student_competency_progress (
    student_id TEXT NOT NULL,
    competency_id TEXT NOT NULL,
    total_questions INTEGER NOT NULL DEFAULT 0,
    answered_questions INTEGER NOT NULL DEFAULT 0,
    pct INTEGER NOT NULL CHECK (pct BETWEEN 0 AND 100),
    approved_by TEXT,
    approved_at TEXT NOT NULL,
    PRIMARY KEY (student_id, competency_id),
    FOREIGN KEY (student_id, competency_id)
        REFERENCES competency_assignments(student_id, competency_id) ON DELETE CASCADE
);
"#;

/// Staged proposals and committee votes
const COMMITTEE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS competencies_stage (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    justification TEXT NOT NULL,
    proposed_by TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS competency_stage_tags (
    stage_id TEXT NOT NULL REFERENCES competencies_stage(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    PRIMARY KEY (stage_id, tag)
);

CREATE TABLE IF NOT EXISTS committee_votes (
    stage_id TEXT NOT NULL REFERENCES competencies_stage(id) ON DELETE CASCADE,
    voter_id TEXT NOT NULL,
    vote INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (stage_id, voter_id)
);
"#;

/// Indexes for common queries
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_profiles_role ON profiles(role);
CREATE INDEX IF NOT EXISTS idx_competencies_difficulty ON competencies(difficulty);
CREATE INDEX IF NOT EXISTS idx_competency_tags_tag ON competency_tags(tag);
CREATE INDEX IF NOT EXISTS idx_questions_competency ON questions(competency_id);
CREATE INDEX IF NOT EXISTS idx_assignments_competency ON competency_assignments(competency_id);
CREATE INDEX IF NOT EXISTS idx_votes_voter ON committee_votes(voter_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();

        init_schema(&mut conn).unwrap();
        init_schema(&mut conn).unwrap();

        assert_eq!(get_schema_version(&mut conn).unwrap(), SCHEMA_VERSION);
    }
}
