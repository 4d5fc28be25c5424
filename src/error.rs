//! Social manager error types.

use thiserror::Error;

/// Result type for social graph operations.
pub type SocialResult<T> = Result<T, SocialError>;

/// Errors that can occur in the social graph engine.
///
/// Variants are `Clone` because errors travel inside public events and are
/// resolved into completion promises as well as returned to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SocialError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    /// HTTP 424 from PeopleHub. Tolerated during `initialize`: the graph
    /// starts empty and converges on the next refresh.
    #[error("dependency failed: {0}")]
    DependencyFailed(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<reqwest::Error> for SocialError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 424 => {
                SocialError::DependencyFailed(err.to_string())
            }
            _ => SocialError::Http(err.to_string()),
        }
    }
}
