//! The splitter: one `CloudPool` facade over several prioritized children.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use fleet_core::{
    epoch_secs, Alert, AlertSink, AlertTopic, CloudPool, LogSink, MachinePool, PoolError,
    PoolResult, PoolSizeSummary, ServiceState,
};

use crate::distribution::calculate_distribution;

/// Tuning knobs for child fan-out.
#[derive(Debug, Clone)]
pub struct SplitterSettings {
    /// Deadline per child call.
    pub call_timeout: Duration,
    /// Concurrent child calls per fan-out.
    pub worker_count: usize,
}

impl Default for SplitterSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            worker_count: 4,
        }
    }
}

/// One backend pool with its share of the total.
pub struct ChildPool<C> {
    pub name: String,
    /// Percentage of the splitter's desired size this child receives.
    pub priority: u32,
    pub pool: Arc<C>,
}

impl<C> ChildPool<C> {
    pub fn new(name: impl Into<String>, priority: u32, pool: Arc<C>) -> Self {
        Self {
            name: name.into(),
            priority,
            pool,
        }
    }
}

impl<C> Clone for ChildPool<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            priority: self.priority,
            pool: self.pool.clone(),
        }
    }
}

/// `CloudPool` facade dividing work among prioritized children.
///
/// Resizes are distributed with [`calculate_distribution`]; observations
/// are the union of child observations, stamped with the oldest child
/// timestamp so staleness is never understated. Machine-level operations
/// are routed to the child whose observation contains the machine.
pub struct Splitter<C> {
    children: std::sync::RwLock<Vec<ChildPool<C>>>,
    settings: SplitterSettings,
    workers: Arc<Semaphore>,
    alerts: Arc<dyn AlertSink>,
}

impl<C: CloudPool + 'static> Splitter<C> {
    /// A splitter over the given children. Fails with `InvalidArgument`
    /// unless the child priorities sum to exactly 100.
    pub fn new(children: Vec<ChildPool<C>>, settings: SplitterSettings) -> PoolResult<Self> {
        Self::validate(&children)?;
        let workers = Arc::new(Semaphore::new(settings.worker_count.max(1)));
        Ok(Self {
            children: std::sync::RwLock::new(children),
            settings,
            workers,
            alerts: Arc::new(LogSink),
        })
    }

    /// Replace the alert sink (default: tracing log).
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Replace the child list wholesale. The same validation as at
    /// construction applies; in-flight calls finish against the old list.
    pub fn replace_children(&self, children: Vec<ChildPool<C>>) -> PoolResult<()> {
        Self::validate(&children)?;
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        info!(children = ?names, "splitter children replaced");
        *self.children.write().expect("children lock poisoned") = children;
        Ok(())
    }

    fn validate(children: &[ChildPool<C>]) -> PoolResult<()> {
        let priorities: Vec<u32> = children.iter().map(|c| c.priority).collect();
        calculate_distribution(0, &priorities)?;
        Ok(())
    }

    fn snapshot(&self) -> Vec<ChildPool<C>> {
        self.children.read().expect("children lock poisoned").clone()
    }

    /// The highest-priority child; configuration order breaks ties.
    fn primary(&self) -> ChildPool<C> {
        self.snapshot()
            .into_iter()
            .reduce(|best, c| if c.priority > best.priority { c } else { best })
            .expect("validated non-empty at construction")
    }

    /// The child whose observation contains `machine_id`.
    async fn owner_of(&self, machine_id: &str) -> PoolResult<ChildPool<C>> {
        for child in self.snapshot() {
            match self.bounded(child.pool.get_machine_pool()).await {
                Ok(pool) if pool.machine(machine_id).is_some() => return Ok(child),
                Ok(_) => {}
                Err(e) => {
                    warn!(child = %child.name, error = %e, "child pool unreachable during lookup")
                }
            }
        }
        Err(PoolError::NotFound(machine_id.to_string()))
    }

    /// Apply the per-call deadline to one child call.
    async fn bounded<T>(&self, call: impl Future<Output = PoolResult<T>>) -> PoolResult<T> {
        match tokio::time::timeout(self.settings.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PoolError::Transient(format!(
                "child pool call timed out after {:?}",
                self.settings.call_timeout
            ))),
        }
    }

    /// Fan one call out to every child through the worker pool; results come
    /// back in child order paired with the child name.
    async fn fan_out<T, F, Fut>(&self, call: F) -> Vec<(String, PoolResult<T>)>
    where
        T: Send + 'static,
        F: Fn(Arc<C>) -> Fut,
        Fut: Future<Output = PoolResult<T>> + Send + 'static,
    {
        let children = self.snapshot();
        let mut handles = Vec::with_capacity(children.len());
        for child in children {
            let name = child.name;
            let workers = self.workers.clone();
            let timeout = self.settings.call_timeout;
            let fut = call(child.pool);
            handles.push(tokio::spawn(async move {
                let _permit = match workers.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (name, Err(PoolError::Stopped)),
                };
                let result = match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(PoolError::Transient(format!(
                        "child pool call timed out after {timeout:?}"
                    ))),
                };
                (name, result)
            }));
        }
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(entry) = handle.await {
                results.push(entry);
            }
        }
        results
    }
}

impl<C: CloudPool + 'static> CloudPool for Splitter<C> {
    async fn get_machine_pool(&self) -> PoolResult<MachinePool> {
        let results = self.fan_out(|pool| async move { pool.get_machine_pool().await }).await;

        let mut machines = Vec::new();
        let mut oldest: Option<u64> = None;
        let mut reachable = 0usize;
        let mut first_error = None;
        for (name, result) in results {
            match result {
                Ok(pool) => {
                    reachable += 1;
                    oldest = Some(oldest.map_or(pool.timestamp, |t| t.min(pool.timestamp)));
                    machines.extend(pool.machines);
                }
                Err(e) => {
                    warn!(child = %name, error = %e, "child pool unreachable");
                    self.alerts.publish(Alert::new(
                        AlertTopic::PoolFetch,
                        format!("child pool {name} unreachable: {e}"),
                    ));
                    first_error.get_or_insert(e);
                }
            }
        }
        if reachable == 0 {
            return Err(first_error.unwrap_or(PoolError::NotConfigured));
        }
        Ok(MachinePool {
            timestamp: oldest.unwrap_or_else(epoch_secs),
            machines,
        })
    }

    async fn get_pool_size(&self) -> PoolResult<PoolSizeSummary> {
        let results = self.fan_out(|pool| async move { pool.get_pool_size().await }).await;

        let mut summary = PoolSizeSummary {
            desired: 0,
            allocated: 0,
            active: 0,
        };
        let mut reachable = 0usize;
        let mut first_error = None;
        for (name, result) in results {
            match result {
                Ok(child) => {
                    reachable += 1;
                    summary.desired += child.desired;
                    summary.allocated += child.allocated;
                    summary.active += child.active;
                }
                Err(e) => {
                    warn!(child = %name, error = %e, "child pool size unavailable");
                    first_error.get_or_insert(e);
                }
            }
        }
        if reachable == 0 {
            return Err(first_error.unwrap_or(PoolError::NotConfigured));
        }
        Ok(summary)
    }

    async fn set_desired_size(&self, size: i64) -> PoolResult<()> {
        if size < 0 {
            return Err(PoolError::InvalidArgument(format!(
                "desired size must be non-negative, got {size}"
            )));
        }
        let children = self.snapshot();
        let priorities: Vec<u32> = children.iter().map(|c| c.priority).collect();
        let shares = calculate_distribution(size as u64, &priorities)?;
        debug!(total = size, ?shares, "distributing desired size");

        let mut handles = Vec::with_capacity(children.len());
        for (child, share) in children.into_iter().zip(shares) {
            let name = child.name;
            let pool = child.pool;
            let workers = self.workers.clone();
            let timeout = self.settings.call_timeout;
            handles.push(tokio::spawn(async move {
                let _permit = match workers.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (name, share, Err(PoolError::Stopped)),
                };
                let result =
                    match tokio::time::timeout(timeout, pool.set_desired_size(share as i64)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(PoolError::Transient(format!(
                            "child pool call timed out after {timeout:?}"
                        ))),
                    };
                (name, share, result)
            }));
        }

        let mut first_error = None;
        for handle in handles {
            let Ok((name, share, result)) = handle.await else {
                continue;
            };
            match result {
                Ok(()) => debug!(child = %name, share, "child resized"),
                Err(e) => {
                    warn!(child = %name, share, error = %e, "child resize failed");
                    self.alerts.publish(Alert::new(
                        AlertTopic::Resize,
                        format!("failed to set desired size {share} on child pool {name}: {e}"),
                    ));
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            // The other children keep their new shares; the caller retries
            // the whole resize.
            Some(e) => Err(e),
            None => {
                info!(total = size, "desired size distributed to all children");
                Ok(())
            }
        }
    }

    async fn terminate_machine(
        &self,
        machine_id: &str,
        decrement_desired_size: bool,
    ) -> PoolResult<()> {
        let child = self.owner_of(machine_id).await?;
        info!(child = %child.name, %machine_id, "routing termination to owning child");
        self.bounded(child.pool.terminate_machine(machine_id, decrement_desired_size))
            .await
    }

    async fn attach_machine(&self, machine_id: &str) -> PoolResult<()> {
        let child = self.primary();
        info!(child = %child.name, %machine_id, "attaching machine to highest-priority child");
        self.bounded(child.pool.attach_machine(machine_id)).await
    }

    async fn detach_machine(
        &self,
        machine_id: &str,
        decrement_desired_size: bool,
    ) -> PoolResult<()> {
        let child = self.owner_of(machine_id).await?;
        self.bounded(child.pool.detach_machine(machine_id, decrement_desired_size))
            .await
    }

    async fn set_service_state(&self, machine_id: &str, state: ServiceState) -> PoolResult<()> {
        let child = self.owner_of(machine_id).await?;
        self.bounded(child.pool.set_service_state(machine_id, state))
            .await
    }
}
