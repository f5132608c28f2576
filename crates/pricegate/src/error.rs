use std::time::Duration;

use thiserror::Error;

/// An error produced while fetching from or writing to the remote API.
///
/// The variants are cheap to clone because every caller that joined an
/// in-flight request receives its own copy of the settlement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The circuit breaker is open and no network attempt was made.
    ///
    /// Carries the remaining duration of the current block episode. This error
    /// is never retried automatically.
    #[error("api is temporarily blocked, retry after {0:?}")]
    Blocked(Duration),
    /// The transport's own timeout fired before a response arrived.
    ///
    /// Counts as an ordinary failure for health tracking.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// A network failure or a non-2xx response from the backend.
    ///
    /// The attached string contains the root cause or the server's response.
    #[error("request failed: {0}")]
    Transport(String),
    /// The response body could not be interpreted as the expected structure.
    ///
    /// Counts as a failure for health tracking, but is surfaced distinctly
    /// to make backend contract changes easy to spot.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether this error means the circuit breaker refused the request.
    pub fn is_blocked(&self) -> bool {
        matches!(self, ApiError::Blocked(_))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
