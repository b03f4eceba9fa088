use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("remote calendar credential is no longer valid (invalid_grant)")]
    TokenRevoked,

    #[error("remote calendar denied the request (403): {0}")]
    PermissionDenied(String),

    #[error("rate limited by remote calendar, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("remote calendar resource not found: {0}")]
    NotFound(String),

    #[error("remote calendar request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected remote calendar response: {0}")]
    UnexpectedResponse(String),

    #[error("remote calendar is temporarily unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Whether retrying the same request later is worth attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. } | GatewayError::Unavailable(_)
        )
    }
}

/// Distinguishes "the sync token the caller presented is no longer valid"
/// from every other failure mode, so callers are never tempted to read an
/// expired token as a generic list error (see the gateway's list_events
/// contract).
pub enum ListOutcome<T> {
    Ok(T),
    TokenExpired,
}

pub type GatewayResult<T> = Result<T, GatewayError>;
