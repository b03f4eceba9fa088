use thiserror::Error;

/// Domain-level errors: business-rule violations in the sync model, as
/// opposed to infrastructure failures (see [`super::AppError`]).
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("calendar attachment not found: {0}")]
    AttachmentNotFound(String),

    #[error("event mapping not found: {0}")]
    MappingNotFound(String),

    #[error("attachment is not active: {0}")]
    AttachmentInactive(String),

    #[error("no account credential for user/remote-account pair")]
    CredentialNotFound,

    #[error("user has no main calendar configured")]
    NoMainCalendar,

    #[error("refresh token is permanently invalid (invalid_grant)")]
    TokenRevoked,

    #[error("sync is paused")]
    SyncPaused,

    #[error("a sync for this calendar is already in flight")]
    AlreadyRunning,

    #[error("job lock is held by another worker")]
    JobLockHeld,

    #[error("backup not found: {0}")]
    BackupNotFound(String),

    #[error("restore target invalid: {0}")]
    InvalidRestoreTarget(String),
}
