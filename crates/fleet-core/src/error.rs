//! Shared error taxonomy for pool operations.
//!
//! Every variant maps to a distinct handling policy:
//!
//! - `Configuration` / `InvalidArgument` — rejected synchronously, never retried
//! - `NotFound` — surfaced to the caller immediately, never retried
//! - `Transient` — retried under the retry executor with bounded attempts
//! - `RetryLimitExceeded` — escalated to an alert; reconciliation continues
//! - `Driver` — contract violation; the single operation is abandoned and
//!   the tick continues with remaining work

use thiserror::Error;

use crate::driver::DriverError;

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by the pool API and the reconciliation engine.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("machine not found: {0}")]
    NotFound(String),

    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("retry limit exceeded after {attempts} attempts: {last_error}")]
    RetryLimitExceeded { attempts: u32, last_error: String },

    #[error("unexpected driver error: {0}")]
    Driver(String),

    #[error("pool is not configured")]
    NotConfigured,

    #[error("pool has been stopped")]
    Stopped,
}

impl PoolError {
    /// Whether a bounded-retry wrapper may re-attempt the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<DriverError> for PoolError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotFound(id) => Self::NotFound(id),
            DriverError::Transient(msg) => Self::Transient(msg),
            DriverError::Unexpected(msg) => Self::Driver(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(PoolError::Transient("rate limited".into()).is_retryable());
        assert!(!PoolError::NotFound("i-1".into()).is_retryable());
        assert!(!PoolError::InvalidArgument("bad".into()).is_retryable());
        assert!(!PoolError::Configuration("missing field".into()).is_retryable());
    }

    #[test]
    fn driver_error_mapping_preserves_class() {
        assert!(matches!(
            PoolError::from(DriverError::NotFound("i-1".into())),
            PoolError::NotFound(_)
        ));
        assert!(matches!(
            PoolError::from(DriverError::Transient("timeout".into())),
            PoolError::Transient(_)
        ));
        assert!(matches!(
            PoolError::from(DriverError::Unexpected("boom".into())),
            PoolError::Driver(_)
        ));
    }
}
