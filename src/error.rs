use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::services::directory::DirectoryError;

/// Engine-level error taxonomy.
///
/// Every service and store method returns `Result<T, ServiceError>`; the HTTP
/// boundary maps variants to status codes and is responsible for collapsing
/// credential-existence failures into a generic response.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is temporarily locked")]
    AccountLocked { until: DateTime<Utc> },

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Session expired")]
    SessionExpired,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Token invalidated by password change")]
    TokenInvalidatedByPasswordChange,

    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Organization directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Validation error: {0}")]
    ValidationFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Variants the boundary collapses into a generic "invalid credentials"
    /// response so callers cannot distinguish unknown accounts from wrong
    /// passwords.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, ServiceError::InvalidCredentials)
    }

    /// Whether the failure came from the organization directory and should
    /// surface as service-unavailable rather than an auth failure.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, ServiceError::Directory(_))
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return ServiceError::Conflict(db_err.to_string());
            }
        }
        ServiceError::Database(anyhow::Error::new(err))
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(err: redis::RedisError) -> Self {
        ServiceError::Database(anyhow::Error::new(err))
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationFailed(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ServiceError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => ServiceError::TokenExpired,
            _ => ServiceError::InvalidToken,
        }
    }
}
