use thiserror::Error;

/// Error taxonomy shared across the platform. HTTP handlers and the EA's
/// response handler both branch on these kinds, so every subsystem maps its
/// failures into one of them instead of raising free-form errors.
#[derive(Error, Debug)]
pub enum TradingError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Broker rejected: {0}")]
    BrokerRejected(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error text fragments the EA reports for conditions worth retrying.
const RETRIABLE_FRAGMENTS: [&str; 5] = ["timeout", "connection", "network", "temporary", "try again"];

impl TradingError {
    /// Whether a failed command carrying this error should be re-queued.
    pub fn retriable(&self) -> bool {
        matches!(self, TradingError::Transient(_) | TradingError::Timeout(_))
    }

    /// Classify raw EA error text as retriable or permanent.
    pub fn is_retriable_text(error_text: &str) -> bool {
        let lower = error_text.to_lowercase();
        RETRIABLE_FRAGMENTS.iter().any(|f| lower.contains(f))
    }
}
