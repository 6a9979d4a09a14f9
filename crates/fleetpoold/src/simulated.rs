//! In-memory driver for local development and demos.
//!
//! Behaves like a tiny provider: provisioned machines appear in
//! subsequent listings, terminations remove them, tags drive membership.
//! With a boot delay configured, new machines pass through `Requested`
//! and `Pending` before listings report them `Running`. No pooled
//! resource survives a restart.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use fleet_core::{
    DriverError, DriverResult, Machine, MachineState, MembershipStatus, PoolConfig, ServiceState,
    epoch_secs, CloudPoolDriver, MEMBERSHIP_STATUS_TAG,
};

struct SimMachine {
    machine: Machine,
    created_at: Instant,
}

impl SimMachine {
    /// Walk a booting machine through `Requested` and `Pending` based on
    /// how long ago it was provisioned, relative to the boot delay.
    fn advance(&mut self, boot_delay: Duration) {
        if !matches!(
            self.machine.machine_state,
            MachineState::Requested | MachineState::Pending
        ) {
            return;
        }
        let elapsed = self.created_at.elapsed();
        if elapsed >= boot_delay {
            self.machine.machine_state = MachineState::Running;
            self.machine.launch_time = Some(epoch_secs());
        } else if elapsed >= boot_delay / 2 {
            self.machine.machine_state = MachineState::Pending;
        }
    }
}

pub struct SimulatedDriver {
    machines: Mutex<Vec<SimMachine>>,
    next_id: AtomicU64,
    boot_delay: Duration,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self {
            machines: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            boot_delay: Duration::ZERO,
        }
    }

    /// New machines spend half the delay in `Requested` and half in
    /// `Pending` before listings report them `Running`. A zero delay
    /// (the default) provisions straight into `Running`.
    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudPoolDriver for SimulatedDriver {
    async fn configure(&self, config: &PoolConfig) -> DriverResult<()> {
        debug!(pool = %config.pool_name, "simulated driver configured");
        Ok(())
    }

    async fn list_machines(&self) -> DriverResult<Vec<Machine>> {
        let mut machines = self.machines.lock().expect("machines lock poisoned");
        for sim in machines.iter_mut() {
            sim.advance(self.boot_delay);
        }
        Ok(machines.iter().map(|sim| sim.machine.clone()).collect())
    }

    async fn provision(&self, count: u32, _template: &Value) -> DriverResult<Vec<Machine>> {
        let mut machines = self.machines.lock().expect("machines lock poisoned");
        let mut created = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let machine = if self.boot_delay.is_zero() {
                Machine::new(format!("sim-{n}"), MachineState::Running)
                    .with_launch_time(epoch_secs())
            } else {
                Machine::new(format!("sim-{n}"), MachineState::Requested)
            };
            machines.push(SimMachine {
                machine: machine.clone(),
                created_at: Instant::now(),
            });
            created.push(machine);
        }
        debug!(count, "simulated machines provisioned");
        Ok(created)
    }

    async fn terminate(&self, machine_id: &str) -> DriverResult<()> {
        let mut machines = self.machines.lock().expect("machines lock poisoned");
        let before = machines.len();
        machines.retain(|sim| sim.machine.id != machine_id);
        if machines.len() == before {
            return Err(DriverError::NotFound(machine_id.to_string()));
        }
        debug!(machine_id, "simulated machine terminated");
        Ok(())
    }

    async fn tag(&self, machine_id: &str, tags: &HashMap<String, String>) -> DriverResult<()> {
        let mut machines = self.machines.lock().expect("machines lock poisoned");
        let machine = machines
            .iter_mut()
            .find(|sim| sim.machine.id == machine_id)
            .map(|sim| &mut sim.machine)
            .ok_or_else(|| DriverError::NotFound(machine_id.to_string()))?;
        if let Some(status) = tags.get(MEMBERSHIP_STATUS_TAG) {
            machine.membership_status = if status == "active" {
                MembershipStatus::Active
            } else {
                MembershipStatus::Evictable
            };
        }
        Ok(())
    }

    async fn untag(&self, machine_id: &str, tag_keys: &[String]) -> DriverResult<()> {
        let mut machines = self.machines.lock().expect("machines lock poisoned");
        let machine = machines
            .iter_mut()
            .find(|sim| sim.machine.id == machine_id)
            .map(|sim| &mut sim.machine)
            .ok_or_else(|| DriverError::NotFound(machine_id.to_string()))?;
        if tag_keys.iter().any(|k| k == MEMBERSHIP_STATUS_TAG) {
            machine.membership_status = MembershipStatus::Evictable;
        }
        Ok(())
    }

    async fn set_service_state(&self, machine_id: &str, state: ServiceState) -> DriverResult<()> {
        let mut machines = self.machines.lock().expect("machines lock poisoned");
        let machine = machines
            .iter_mut()
            .find(|sim| sim.machine.id == machine_id)
            .map(|sim| &mut sim.machine)
            .ok_or_else(|| DriverError::NotFound(machine_id.to_string()))?;
        machine.service_state = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn provisioned_machines_appear_in_listings() {
        let driver = SimulatedDriver::new();
        let created = driver.provision(2, &json!({})).await.unwrap();
        assert_eq!(created.len(), 2);

        let listed = driver.list_machines().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|m| m.machine_state == MachineState::Running));
        assert!(listed.iter().all(|m| m.launch_time.is_some()));
    }

    #[tokio::test]
    async fn boot_delay_walks_machines_through_lifecycle_states() {
        let driver = SimulatedDriver::new().with_boot_delay(Duration::from_secs(1));
        let created = driver.provision(1, &json!({})).await.unwrap();
        assert_eq!(created[0].machine_state, MachineState::Requested);
        assert!(created[0].launch_time.is_none());

        tokio::time::sleep(Duration::from_millis(600)).await;
        let listed = driver.list_machines().await.unwrap();
        assert_eq!(listed[0].machine_state, MachineState::Pending);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let listed = driver.list_machines().await.unwrap();
        assert_eq!(listed[0].machine_state, MachineState::Running);
        assert!(listed[0].launch_time.is_some());
    }

    #[tokio::test]
    async fn terminate_removes_machine() {
        let driver = SimulatedDriver::new();
        let created = driver.provision(1, &json!({})).await.unwrap();
        driver.terminate(&created[0].id).await.unwrap();
        assert!(driver.list_machines().await.unwrap().is_empty());

        assert!(matches!(
            driver.terminate(&created[0].id).await,
            Err(DriverError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn untag_membership_makes_machine_evictable() {
        let driver = SimulatedDriver::new();
        let created = driver.provision(1, &json!({})).await.unwrap();
        driver
            .untag(&created[0].id, &[MEMBERSHIP_STATUS_TAG.to_string()])
            .await
            .unwrap();

        let listed = driver.list_machines().await.unwrap();
        assert_eq!(listed[0].membership_status, MembershipStatus::Evictable);
    }
}
