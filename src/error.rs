//! Error types for lamad-competency

use thiserror::Error;

use crate::gate::Redirect;

/// Message shown when a failure carries nothing worth surfacing
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Error, Debug)]
pub enum CompetencyError {
    #[error("Access denied (redirect to {redirect})")]
    AuthzDenied { redirect: Redirect },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Remote failure: {0}")]
    Remote(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompetencyError {
    /// Store or transport failure, as opposed to a domain outcome.
    ///
    /// Only these are eligible for read retries and rollback reporting.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            CompetencyError::Remote(_)
                | CompetencyError::Database(_)
                | CompetencyError::Pool(_)
                | CompetencyError::Join(_)
                | CompetencyError::Io(_)
        )
    }

    /// Message suitable for a dashboard notice.
    ///
    /// Falls back to [`GENERIC_FAILURE_MESSAGE`] when the underlying error has no text.
    pub fn user_message(&self) -> String {
        let message = match self {
            CompetencyError::Remote(msg)
            | CompetencyError::NotFound(msg)
            | CompetencyError::Validation(msg) => msg.trim().to_string(),
            other => other.to_string(),
        };

        if message.is_empty() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            message
        }
    }
}
