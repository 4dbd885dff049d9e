//! Error kinds surfaced by the engine and its collaborators.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyError {
    #[error("routing provider unavailable: {0}")]
    RoutingUnavailable(String),

    #[error("incident query failed: {0}")]
    IncidentQueryFailed(String),

    #[error("rating query failed: {0}")]
    RatingQueryFailed(String),

    #[error("location permission denied")]
    GeolocationDenied,

    #[error("location unavailable: {0}")]
    GeolocationUnavailable(String),

    #[error("location request timed out")]
    GeolocationTimeout,

    #[error("device store error: {0}")]
    Store(String),

    #[error("invalid zone: {}", .0.join("; "))]
    InvalidZone(Vec<String>),

    #[error("invalid route: {0}")]
    InvalidRoute(String),
}

impl SafetyError {
    /// Errors that should stop further automatic location resolution.
    pub fn blocks_location(&self) -> bool {
        matches!(
            self,
            SafetyError::GeolocationDenied | SafetyError::GeolocationUnavailable(_)
        )
    }
}

pub type SafetyResult<T> = Result<T, SafetyError>;
