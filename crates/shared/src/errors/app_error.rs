use super::DomainError;
use thiserror::Error;

/// Application-level errors (includes infrastructure)
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Remote calendar error: {0}")]
    Gateway(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Permission denied")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Request timeout")]
    Timeout,
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Domain(e) => match e {
                DomainError::UserNotFound(_)
                | DomainError::AttachmentNotFound(_)
                | DomainError::MappingNotFound(_)
                | DomainError::CredentialNotFound
                | DomainError::NoMainCalendar
                | DomainError::BackupNotFound(_) => 404,
                DomainError::AttachmentInactive(_)
                | DomainError::SyncPaused
                | DomainError::AlreadyRunning
                | DomainError::JobLockHeld => 409,
                DomainError::TokenRevoked => 401,
                DomainError::InvalidRestoreTarget(_) => 422,
            },
            AppError::Database(_) | AppError::Internal(_) => 500,
            AppError::Gateway(_) => 503,
            AppError::Unauthorized => 401,
            AppError::Forbidden => 403,
            AppError::NotFound(_) => 404,
            AppError::Validation(_) => 422,
            AppError::Timeout => 504,
        }
    }

    /// Get a machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Domain(e) => match e {
                DomainError::UserNotFound(_) => "USER_NOT_FOUND",
                DomainError::AttachmentNotFound(_) => "ATTACHMENT_NOT_FOUND",
                DomainError::MappingNotFound(_) => "MAPPING_NOT_FOUND",
                DomainError::AttachmentInactive(_) => "ATTACHMENT_INACTIVE",
                DomainError::CredentialNotFound => "CREDENTIAL_NOT_FOUND",
                DomainError::NoMainCalendar => "NO_MAIN_CALENDAR",
                DomainError::TokenRevoked => "TOKEN_REVOKED",
                DomainError::SyncPaused => "SYNC_PAUSED",
                DomainError::AlreadyRunning => "ALREADY_RUNNING",
                DomainError::JobLockHeld => "JOB_LOCK_HELD",
                DomainError::BackupNotFound(_) => "BACKUP_NOT_FOUND",
                DomainError::InvalidRestoreTarget(_) => "INVALID_RESTORE_TARGET",
            },
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Gateway(_) => "GATEWAY_ERROR",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Timeout => "TIMEOUT",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(err.to_string())
    }
}

/// Result type alias for application operations
#[allow(dead_code)]
pub type AppResult<T> = Result<T, AppError>;
