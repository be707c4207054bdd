//! SQLite database module for competency records
//!
//! ## Tables
//!
//! - `profiles`, `app_admins` - identities and the admin override allow-list
//! - `competencies`, `competency_tags`, `questions` - the read-only catalog
//! - `competency_assignments` - enrollments, unique per (student, competency)
//! - `student_answers` - answers, unique per (student, question)
//! - `student_competency_progress` - materialized review overrides
//! - `competencies_stage`, `competency_stage_tags` - staged proposals
//! - `committee_votes` - live votes, unique per (stage, voter)
//!
//! Repository modules are free functions over `&mut SqliteConnection`;
//! [`Database`] owns the r2d2 pool they run on.

pub mod answers;
pub mod assignments;
pub mod competencies;
pub mod diesel_schema;
pub mod models;
pub mod progress;
pub mod profiles;
pub mod proposals;
pub mod schema;
pub mod seed;
pub mod votes;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::error::CompetencyError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection pragmas applied on checkout
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout.as_millis()
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled SQLite database for competency records
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open or create the database file
    pub fn open(db_path: &Path, pool_size: u32) -> Result<Self, CompetencyError> {
        info!("Opening SQLite database at {:?}", db_path);

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout: Duration::from_secs(5),
            }))
            .build(manager)?;

        let db = Self { pool };

        // WAL is persistent per database file, so one connection is enough
        db.with_conn(|conn| {
            conn.batch_execute("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
            Ok(())
        })?;
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// Every `:memory:` connection is its own database, so the pool is pinned
    /// to a single connection.
    pub fn open_in_memory() -> Result<Self, CompetencyError> {
        debug!("Opening in-memory SQLite database");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout: Duration::from_secs(5),
            }))
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;

        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), CompetencyError> {
        self.with_conn(schema::init_schema)
    }

    /// Check out a pooled connection
    pub fn conn(&self) -> Result<PooledConn, CompetencyError> {
        Ok(self.pool.get()?)
    }

    /// Run a closure against a pooled connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CompetencyError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, CompetencyError>,
    {
        let mut conn = self.conn()?;
        f(&mut *conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, CompetencyError> {
        use diesel_schema::{
            committee_votes, competencies, competencies_stage, competency_assignments, profiles,
            questions,
        };

        self.with_conn(|conn| {
            Ok(DbStats {
                profile_count: profiles::table.count().get_result::<i64>(conn)? as u64,
                competency_count: competencies::table.count().get_result::<i64>(conn)? as u64,
                question_count: questions::table.count().get_result::<i64>(conn)? as u64,
                enrollment_count: competency_assignments::table
                    .count()
                    .get_result::<i64>(conn)? as u64,
                proposal_count: competencies_stage::table.count().get_result::<i64>(conn)? as u64,
                vote_count: committee_votes::table.count().get_result::<i64>(conn)? as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub profile_count: u64,
    pub competency_count: u64,
    pub question_count: u64,
    pub enrollment_count: u64,
    pub proposal_count: u64,
    pub vote_count: u64,
}
