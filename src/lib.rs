//! Lamad Competency - progress, enrollment, review and governance core
//!
//! Tracks learners moving through a catalog of competencies. Supervisors
//! review and force-complete progress; a governance body votes on proposed
//! competencies before promotion.
//!
//! ## Architecture
//!
//! - **Gate** (`gate`): the one place access is decided, for every entry point
//! - **Services** (`services`): enrollment, progress, voting and review rules
//! - **Optimistic views** (`optimistic`): apply, undo the change on failure
//! - **Store** (`store`, `db`): async seam over Diesel/SQLite repositories
//! - **Dashboards** (`dashboards`): role-scoped views with independent panels
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/lamad-competency/
//! ├── competency.db          # SQLite (WAL)
//! └── config.toml            # Configuration
//! ```

pub mod config;
pub mod dashboards;
pub mod db;
pub mod error;
pub mod gate;
pub mod optimistic;
pub mod records;
pub mod retry;
pub mod services;
pub mod store;
pub mod views;

pub use config::Config;
pub use dashboards::{
    DashboardEntry, GovernanceDashboard, LearnerDashboard, Panel, SupervisorDashboard,
};
pub use error::CompetencyError;
pub use gate::{Access, AuthorizationGate, Caller, Redirect, Surface};
pub use optimistic::{Settled, ViewState};
pub use records::{
    Competency, Difficulty, Enrollment, Identity, ProgressRecord, ProgressStatus, Role, Tally, Vote,
};
pub use retry::RetryPolicy;
pub use services::Services;
pub use store::{CompetencyStore, SqliteStore};
