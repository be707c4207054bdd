//! Profile and admin allow-list operations using Diesel

use diesel::prelude::*;
use serde::Deserialize;

use super::diesel_schema::{app_admins, profiles};
use super::models::{current_timestamp, roles, AppAdmin, NewProfile, Profile};
use crate::error::CompetencyError;

/// Input for creating/updating a profile
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProfileInput {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get profile by ID
pub fn get_profile(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Profile>, CompetencyError> {
    Ok(profiles::table
        .filter(profiles::id.eq(id))
        .select(Profile::as_select())
        .first(conn)
        .optional()?)
}

/// List profiles holding a role, ordered by id
pub fn list_by_role(
    conn: &mut SqliteConnection,
    role: &str,
) -> Result<Vec<Profile>, CompetencyError> {
    Ok(profiles::table
        .filter(profiles::role.eq(role))
        .order(profiles::id.asc())
        .select(Profile::as_select())
        .load(conn)?)
}

/// Whether the user is on the admin override allow-list
pub fn is_app_admin(conn: &mut SqliteConnection, user_id: &str) -> Result<bool, CompetencyError> {
    let count: i64 = app_admins::table
        .filter(app_admins::user_id.eq(user_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create or update a profile
pub fn upsert_profile(
    conn: &mut SqliteConnection,
    input: &CreateProfileInput,
) -> Result<Profile, CompetencyError> {
    if !roles::is_valid(&input.role) {
        return Err(CompetencyError::Validation(format!(
            "Invalid role: {}. Valid roles: {:?}",
            input.role,
            roles::ALL
        )));
    }

    let now = current_timestamp();
    diesel::insert_into(profiles::table)
        .values(&NewProfile {
            id: &input.id,
            role: &input.role,
            display_name: input.display_name.as_deref(),
            created_at: &now,
        })
        .on_conflict(profiles::id)
        .do_update()
        .set((
            profiles::role.eq(&input.role),
            profiles::display_name.eq(input.display_name.as_deref()),
        ))
        .execute(conn)?;

    get_profile(conn, &input.id)?
        .ok_or_else(|| CompetencyError::Internal("Failed to retrieve upserted profile".into()))
}

/// Add a user to the admin allow-list (no-op when already present)
pub fn grant_admin(conn: &mut SqliteConnection, user_id: &str) -> Result<bool, CompetencyError> {
    let inserted = diesel::insert_into(app_admins::table)
        .values(&AppAdmin {
            user_id: user_id.to_string(),
            granted_at: current_timestamp(),
        })
        .on_conflict(app_admins::user_id)
        .do_nothing()
        .execute(conn)?;
    Ok(inserted > 0)
}

/// Remove a user from the admin allow-list
pub fn revoke_admin(conn: &mut SqliteConnection, user_id: &str) -> Result<bool, CompetencyError> {
    let deleted = diesel::delete(app_admins::table.filter(app_admins::user_id.eq(user_id)))
        .execute(conn)?;
    Ok(deleted > 0)
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

    fn profile(id: &str, role: &str) -> CreateProfileInput {
        CreateProfileInput {
            id: id.to_string(),
            role: role.to_string(),
            display_name: None,
        }
    }

    #[test]
    fn test_upsert_profile_updates_role() {
        let mut conn = setup_test_db();

        upsert_profile(&mut conn, &profile("ada", roles::LEARNER)).unwrap();
        let updated = upsert_profile(&mut conn, &profile("ada", roles::SUPERVISOR)).unwrap();

        assert_eq!(updated.role, roles::SUPERVISOR);
        assert_eq!(list_by_role(&mut conn, roles::LEARNER).unwrap().len(), 0);
    }

    #[test]
    fn test_invalid_role_rejected() {
        let mut conn = setup_test_db();
        let result = upsert_profile(&mut conn, &profile("ada", "superuser"));
        assert!(matches!(result, Err(CompetencyError::Validation(_))));
    }

    #[test]
    fn test_admin_allow_list() {
        let mut conn = setup_test_db();
        upsert_profile(&mut conn, &profile("root", roles::LEARNER)).unwrap();

        assert!(!is_app_admin(&mut conn, "root").unwrap());
        assert!(grant_admin(&mut conn, "root").unwrap());
        assert!(!grant_admin(&mut conn, "root").unwrap());
        assert!(is_app_admin(&mut conn, "root").unwrap());
        assert!(revoke_admin(&mut conn, "root").unwrap());
        assert!(!is_app_admin(&mut conn, "root").unwrap());
    }
}
