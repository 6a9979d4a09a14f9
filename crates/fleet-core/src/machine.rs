//! Domain types for pool observations.
//!
//! A `MachinePool` is a point-in-time observation of the machines a driver
//! reports for one pool. The observation timestamp always reflects when the
//! data was actually obtained from the provider, even when the observation
//! is later served from a cache.

use serde::{Deserialize, Serialize};

/// Opaque provider-assigned machine identifier.
pub type MachineId = String;

/// Provider-reported lifecycle state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// Requested from the provider, not yet materialized.
    Requested,
    /// Being launched.
    Pending,
    /// Up and running.
    Running,
    /// Shutdown in progress.
    Terminating,
    /// Gone.
    Terminated,
}

impl MachineState {
    /// Whether the machine still holds (or will hold) provider resources.
    pub fn is_allocated(&self) -> bool {
        matches!(self, Self::Requested | Self::Pending | Self::Running)
    }

    /// Whether the machine is launched or launching.
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// Whether a machine currently counts toward pool capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// Counts toward the pool's capacity.
    Active,
    /// Marked for removal; the resource is still present.
    Evictable,
}

/// Operational readiness of the service running on a machine.
///
/// Set externally through `set_service_state`; the core never infers it
/// and scale decisions never key on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Booting,
    InService,
    OutOfService,
    Unhealthy,
    Unknown,
}

/// A single compute instance as observed from the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Machine {
    pub id: MachineId,
    pub machine_state: MachineState,
    pub membership_status: MembershipStatus,
    pub service_state: ServiceState,
    /// Unix timestamp (seconds) of launch; absent until the provider reports it.
    pub launch_time: Option<u64>,
    pub public_ips: Vec<String>,
    pub private_ips: Vec<String>,
    /// Provider-specific metadata, passed through unmodified.
    pub provider_metadata: serde_json::Value,
}

impl Machine {
    /// A machine with the given id and state, sensible defaults elsewhere.
    pub fn new(id: impl Into<MachineId>, machine_state: MachineState) -> Self {
        Self {
            id: id.into(),
            machine_state,
            membership_status: MembershipStatus::Active,
            service_state: ServiceState::Unknown,
            launch_time: None,
            public_ips: Vec::new(),
            private_ips: Vec::new(),
            provider_metadata: serde_json::Value::Null,
        }
    }

    /// Set the launch time (builder style, used heavily in tests).
    pub fn with_launch_time(mut self, launch_time: u64) -> Self {
        self.launch_time = Some(launch_time);
        self
    }

    /// Set the membership status (builder style).
    pub fn with_membership(mut self, status: MembershipStatus) -> Self {
        self.membership_status = status;
        self
    }

    /// Whether this machine counts as active pool capacity: launched or
    /// launching, and not marked evictable.
    pub fn is_active(&self) -> bool {
        self.machine_state.is_started() && self.membership_status == MembershipStatus::Active
    }
}

/// Point-in-time observation of the machines in a pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachinePool {
    /// Unix timestamp (seconds) when the observation was obtained.
    pub timestamp: u64,
    pub machines: Vec<Machine>,
}

impl MachinePool {
    /// An empty observation taken now.
    pub fn empty(timestamp: u64) -> Self {
        Self {
            timestamp,
            machines: Vec::new(),
        }
    }

    /// Look up a machine by id.
    pub fn machine(&self, id: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.id == id)
    }

    /// Machines holding provider resources (requested, pending or running).
    pub fn allocated(&self) -> impl Iterator<Item = &Machine> {
        self.machines.iter().filter(|m| m.machine_state.is_allocated())
    }

    /// Machines counting as active pool capacity.
    pub fn active(&self) -> impl Iterator<Item = &Machine> {
        self.machines.iter().filter(|m| m.is_active())
    }

    /// Summarize against a desired size.
    pub fn size_summary(&self, desired: u64) -> PoolSizeSummary {
        PoolSizeSummary {
            desired,
            allocated: self.allocated().count() as u64,
            active: self.active().count() as u64,
        }
    }
}

/// Pool size as reported to callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolSizeSummary {
    /// Target size set by the operator/autoscaler.
    pub desired: u64,
    /// Machines holding provider resources.
    pub allocated: u64,
    /// Machines counting toward capacity.
    pub active: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_state_classification() {
        assert!(MachineState::Requested.is_allocated());
        assert!(MachineState::Pending.is_allocated());
        assert!(MachineState::Running.is_allocated());
        assert!(!MachineState::Terminating.is_allocated());
        assert!(!MachineState::Terminated.is_allocated());

        assert!(!MachineState::Requested.is_started());
        assert!(MachineState::Pending.is_started());
        assert!(MachineState::Running.is_started());
    }

    #[test]
    fn evictable_machine_is_not_active() {
        let m = Machine::new("i-1", MachineState::Running)
            .with_membership(MembershipStatus::Evictable);
        assert!(!m.is_active());
    }

    #[test]
    fn pool_size_summary_counts() {
        let pool = MachinePool {
            timestamp: 1000,
            machines: vec![
                Machine::new("i-1", MachineState::Running),
                Machine::new("i-2", MachineState::Pending),
                Machine::new("i-3", MachineState::Requested),
                Machine::new("i-4", MachineState::Running)
                    .with_membership(MembershipStatus::Evictable),
                Machine::new("i-5", MachineState::Terminated),
            ],
        };

        let summary = pool.size_summary(3);
        assert_eq!(summary.desired, 3);
        // Requested/Pending/Running (including the evictable one) hold resources.
        assert_eq!(summary.allocated, 4);
        // Only the started, non-evictable ones count as capacity.
        assert_eq!(summary.active, 2);
    }

    #[test]
    fn machine_lookup_by_id() {
        let pool = MachinePool {
            timestamp: 1000,
            machines: vec![Machine::new("i-1", MachineState::Running)],
        };
        assert!(pool.machine("i-1").is_some());
        assert!(pool.machine("i-2").is_none());
    }

    #[test]
    fn machine_serializes_round_trip() {
        let m = Machine::new("i-1", MachineState::Running).with_launch_time(12345);
        let json = serde_json::to_string(&m).unwrap();
        let back: Machine = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
        assert!(json.contains("running"));
    }
}
