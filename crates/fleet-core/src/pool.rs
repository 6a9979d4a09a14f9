//! The `CloudPool` API surface.
//!
//! Implemented by the reconciliation engine (`fleetpool-engine`) and by the
//! splitter (`fleetpool-split`), and consumed by the REST front end and by
//! autoscalers. All effects of `set_desired_size` are observed
//! asynchronously through subsequent `get_machine_pool` calls.

use std::future::Future;

use crate::error::PoolResult;
use crate::machine::{MachinePool, PoolSizeSummary, ServiceState};

/// Operations every pool exposes to its callers.
pub trait CloudPool: Send + Sync {
    /// The most recent pool observation.
    fn get_machine_pool(&self) -> impl Future<Output = PoolResult<MachinePool>> + Send;

    /// Desired/allocated/active counts.
    fn get_pool_size(&self) -> impl Future<Output = PoolResult<PoolSizeSummary>> + Send;

    /// Set the desired pool size. Fails with `InvalidArgument` for negative
    /// sizes; returns once the new target is recorded, not once reconciled.
    fn set_desired_size(&self, size: i64) -> impl Future<Output = PoolResult<()>> + Send;

    /// Terminate a specific machine, bypassing victim selection. When
    /// `decrement_desired_size` is set the desired size is lowered first so
    /// the machine is not replaced on the next reconciliation pass.
    fn terminate_machine(
        &self,
        machine_id: &str,
        decrement_desired_size: bool,
    ) -> impl Future<Output = PoolResult<()>> + Send;

    /// Mark a machine as an active pool member.
    fn attach_machine(&self, machine_id: &str) -> impl Future<Output = PoolResult<()>> + Send;

    /// Mark a machine as evictable without destroying the resource.
    fn detach_machine(
        &self,
        machine_id: &str,
        decrement_desired_size: bool,
    ) -> impl Future<Output = PoolResult<()>> + Send;

    /// Record a machine's service state. Pure metadata; never influences
    /// scale decisions.
    fn set_service_state(
        &self,
        machine_id: &str,
        state: ServiceState,
    ) -> impl Future<Output = PoolResult<()>> + Send;
}
