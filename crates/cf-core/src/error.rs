//! # AppError
//!
//! Centralized error handling for the classfeed engines.
//! Maps store and collaborator failures to the outcomes callers act on.

use thiserror::Error;

/// The primary error type for all cf-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Course, Post, Submission)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., blank title, empty file handle)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The requested state change is not allowed from the current state
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A concurrent writer won the race and retries were exhausted
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing or unverifiable credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but lacking the capability for this action
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Store or collaborator unreachable (e.g., DB down, blob store I/O)
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl AppError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound(entity.to_string(), id.to_string())
    }

    /// Failures worth retrying on the caller's side.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::UpstreamUnavailable(_))
    }
}

/// Failure modes of the store ports.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The write was planned against state that has since changed.
    #[error("stale write rejected")]
    Conflict,

    #[error(transparent)]
    Unavailable(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AppError::Conflict("stale write rejected".into()),
            StoreError::Unavailable(source) => AppError::UpstreamUnavailable(format!("{source:#}")),
        }
    }
}

/// A specialized Result type for classfeed logic.
pub type Result<T> = std::result::Result<T, AppError>;
