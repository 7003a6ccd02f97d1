//! Error types for teamcal-engine operations.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TeamcalError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("All dates conflict with existing availability")]
    Conflict { details: String },

    #[error("Availability event not found: {0}")]
    NotFound(Uuid),

    #[error("Not authorized to modify this availability event")]
    Forbidden,

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TeamcalError {
    /// HTTP-equivalent status code for request-boundary rendering.
    pub fn status_code(&self) -> u16 {
        match self {
            TeamcalError::Validation(_) => 400,
            TeamcalError::Forbidden => 403,
            TeamcalError::NotFound(_) => 404,
            TeamcalError::Conflict { .. } => 409,
            TeamcalError::Storage(_) | TeamcalError::Config(_) => 500,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        TeamcalError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, TeamcalError>;
