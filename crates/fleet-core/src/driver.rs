//! The `CloudPoolDriver` contract.
//!
//! A driver translates the uniform operations below into a specific vendor
//! SDK call sequence. The engine treats the driver purely as an interface;
//! provider identity is configuration data (endpoint, auth scheme), never a
//! type hierarchy.

use std::collections::HashMap;
use std::future::Future;

use serde_json::Value;
use thiserror::Error;

use crate::config::PoolConfig;
use crate::machine::{Machine, ServiceState};

/// Tag key carrying a machine's membership status.
pub const MEMBERSHIP_STATUS_TAG: &str = "fleetpool:membership-status";

/// Tag key carrying a machine's service state.
pub const SERVICE_STATE_TAG: &str = "fleetpool:service-state";

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors a driver reports back to the engine.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The referenced machine is gone.
    #[error("machine not found: {0}")]
    NotFound(String),

    /// Timeout, rate limit, or other condition worth retrying.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Anything else; the operation is abandoned.
    #[error("unexpected driver error: {0}")]
    Unexpected(String),
}

impl DriverError {
    /// Whether the engine's retry wrapper may re-attempt this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Uniform contract between the engine and a provider adapter.
///
/// Methods return `impl Future + Send` so the engine can stay generic over
/// the driver type and dispatch calls onto worker tasks.
pub trait CloudPoolDriver: Send + Sync + 'static {
    /// Apply a new driver configuration.
    fn configure(&self, config: &PoolConfig) -> impl Future<Output = DriverResult<()>> + Send;

    /// List the machines currently belonging to the pool.
    fn list_machines(&self) -> impl Future<Output = DriverResult<Vec<Machine>>> + Send;

    /// Request `count` new machines from the given provisioning template.
    ///
    /// Best effort: the driver may return fewer machines than requested and
    /// the engine must not assume exact fulfillment.
    fn provision(
        &self,
        count: u32,
        template: &Value,
    ) -> impl Future<Output = DriverResult<Vec<Machine>>> + Send;

    /// Terminate the named machine.
    fn terminate(&self, machine_id: &str) -> impl Future<Output = DriverResult<()>> + Send;

    /// Set tags on the named machine.
    fn tag(
        &self,
        machine_id: &str,
        tags: &HashMap<String, String>,
    ) -> impl Future<Output = DriverResult<()>> + Send;

    /// Remove tags from the named machine.
    fn untag(
        &self,
        machine_id: &str,
        tag_keys: &[String],
    ) -> impl Future<Output = DriverResult<()>> + Send;

    /// Record a machine's service state as provider-side metadata.
    fn set_service_state(
        &self,
        machine_id: &str,
        state: ServiceState,
    ) -> impl Future<Output = DriverResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(DriverError::Transient("throttled".into()).is_transient());
        assert!(!DriverError::NotFound("i-1".into()).is_transient());
        assert!(!DriverError::Unexpected("boom".into()).is_transient());
    }
}
