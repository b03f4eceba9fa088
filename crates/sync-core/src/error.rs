use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("remote calendar error: {0}")]
    Gateway(#[from] gateway::GatewayError),

    #[error("domain error: {0}")]
    Domain(#[from] shared::DomainError),

    #[error("{0}")]
    Other(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
