//! PoolController — the reconciliation loop and `CloudPool` surface.
//!
//! One periodic task per pool drives ticks; a bounded worker pool executes
//! the per-machine driver calls dispatched within a tick, each with its own
//! timeout, so a stuck provider call degrades one tick's completeness
//! rather than the whole scheduler. Desired size and the termination queue
//! are serialized through a single mutex shared by the tick and by direct
//! API calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use fleet_core::{
    epoch_secs, Alert, AlertSink, AlertTopic, CloudPool, CloudPoolDriver, DriverError, LogSink,
    Machine, MachinePool, PoolConfig, PoolError, PoolResult, PoolSizeSummary, ServiceState,
    MEMBERSHIP_STATUS_TAG,
};
use fleetpool_fetch::PoolFetcher;
use fleetpool_retry::{DelayPolicy, RetryError, Retryer};
use fleetpool_state::StateStore;

use crate::termination_queue::{ScheduledTermination, TerminationQueue};
use crate::victim::{ClosestToBillingBoundary, VictimSelectionStrategy};

/// Tuning knobs for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Interval between scheduled reconciliation passes.
    pub tick_interval: Duration,
    /// Staleness threshold for cached pool observations.
    pub fetch_ttl: Duration,
    /// Attempt budget for provisioning/termination driver calls.
    pub max_attempts: u32,
    /// Delay policy between retry attempts.
    pub retry_delay: DelayPolicy,
    /// Concurrent driver calls dispatched within one tick.
    pub worker_count: usize,
    /// Deadline per driver call.
    pub call_timeout: Duration,
    /// Grace period between victim selection and termination. Zero means
    /// immediate; a provider profile may defer to a billing-hour boundary.
    pub termination_delay: Duration,
    /// Consecutive termination failures for one machine before an alert.
    pub termination_alert_threshold: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(15),
            fetch_ttl: Duration::from_secs(30),
            max_attempts: 3,
            retry_delay: DelayPolicy::ExponentialBackoff {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(8),
            },
            worker_count: 4,
            call_timeout: Duration::from_secs(30),
            termination_delay: Duration::ZERO,
            termination_alert_threshold: 3,
        }
    }
}

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControllerState {
    Unconfigured,
    Configured,
    Started,
    Stopped,
}

/// State guarded by the single logical owner: the desired size, the
/// termination queue, and per-machine failure counters.
struct Inner {
    /// None until set explicitly or adopted from the first observation.
    desired_size: Option<u64>,
    queue: TerminationQueue,
    /// Consecutive termination failures per queued machine.
    termination_failures: HashMap<String, u32>,
}

/// What one reconciliation pass decided to do.
struct TickPlan {
    provision_count: u32,
    scheduled: Vec<String>,
    cancelled: usize,
    due: Vec<ScheduledTermination>,
}

/// The reconciliation engine for one pool.
///
/// Lifecycle: `Unconfigured → Configured → Started → Stopped`. `configure`
/// swaps the (pool identity, API settings, provisioning template) triple
/// without discarding the desired size or the termination queue.
pub struct PoolController<D> {
    driver: Arc<D>,
    fetcher: Arc<PoolFetcher<D>>,
    store: StateStore,
    settings: ControllerSettings,
    strategy: Arc<dyn VictimSelectionStrategy>,
    alerts: Arc<dyn AlertSink>,
    pool_config: Mutex<Option<PoolConfig>>,
    state: Mutex<ControllerState>,
    inner: Mutex<Inner>,
    tick_notify: Notify,
    workers: Arc<Semaphore>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    cancel_rx: Mutex<Option<watch::Receiver<bool>>>,
    run_task: Mutex<Option<JoinHandle<()>>>,
}

impl<D: CloudPoolDriver> PoolController<D> {
    /// A controller over the given driver and state store.
    pub fn new(driver: Arc<D>, store: StateStore, settings: ControllerSettings) -> Self {
        let fetcher = Arc::new(PoolFetcher::new(driver.clone(), settings.fetch_ttl));
        let workers = Arc::new(Semaphore::new(settings.worker_count.max(1)));
        Self {
            driver,
            fetcher,
            store,
            settings,
            strategy: Arc::new(ClosestToBillingBoundary),
            alerts: Arc::new(LogSink),
            pool_config: Mutex::new(None),
            state: Mutex::new(ControllerState::Unconfigured),
            inner: Mutex::new(Inner {
                desired_size: None,
                queue: TerminationQueue::new(),
                termination_failures: HashMap::new(),
            }),
            tick_notify: Notify::new(),
            workers,
            shutdown: Mutex::new(None),
            cancel_rx: Mutex::new(None),
            run_task: Mutex::new(None),
        }
    }

    /// Replace the victim-selection policy (default: closest to billing boundary).
    pub fn with_strategy(mut self, strategy: Arc<dyn VictimSelectionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the alert sink (default: tracing log).
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Validate and atomically swap in a new pool configuration. Callable
    /// from any state except `Stopped`; desired size and termination queue
    /// survive reconfiguration. The persisted desired size is loaded on the
    /// first successful configure.
    pub async fn configure(&self, config: PoolConfig) -> PoolResult<()> {
        if *self.state.lock().expect("state lock poisoned") == ControllerState::Stopped {
            return Err(PoolError::Stopped);
        }
        config.validate()?;
        self.driver.configure(&config).await?;

        {
            let mut inner = self.inner.lock().expect("inner lock poisoned");
            if inner.desired_size.is_none() {
                match self.store.load_desired_size(&config.pool_name) {
                    Ok(Some(size)) => {
                        info!(pool = %config.pool_name, size, "desired size restored from store");
                        inner.desired_size = Some(size);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "failed to load persisted desired size"),
                }
            }
        }

        *self.pool_config.lock().expect("config lock poisoned") = Some(config.clone());
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state == ControllerState::Unconfigured {
                *state = ControllerState::Configured;
            }
        }
        info!(pool = %config.pool_name, "pool configured");
        Ok(())
    }

    /// Begin periodic reconciliation. Only valid once configured; calling
    /// on an already started controller is a no-op.
    pub fn start(self: &Arc<Self>) -> PoolResult<()> {
        let mut state = self.state.lock().expect("state lock poisoned");
        match *state {
            ControllerState::Stopped => Err(PoolError::Stopped),
            ControllerState::Unconfigured => Err(PoolError::NotConfigured),
            ControllerState::Started => Ok(()),
            ControllerState::Configured => {
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                *self.shutdown.lock().expect("shutdown lock poisoned") = Some(shutdown_tx);
                *self.cancel_rx.lock().expect("cancel lock poisoned") = Some(shutdown_rx.clone());

                let controller = self.clone();
                let mut shutdown_rx = shutdown_rx;
                let tick_interval = self.settings.tick_interval;
                let handle = tokio::spawn(async move {
                    let mut interval = tokio::time::interval(tick_interval);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        tokio::select! {
                            _ = interval.tick() => controller.tick().await,
                            _ = controller.tick_notify.notified() => controller.tick().await,
                            _ = shutdown_rx.changed() => {
                                info!("reconciliation loop shutting down");
                                break;
                            }
                        }
                    }
                });
                *self.run_task.lock().expect("task lock poisoned") = Some(handle);

                // Keep the cached observation no staler than the ttl while
                // running. `stop` tears the task down through `fetcher.close`.
                if !self.settings.fetch_ttl.is_zero() {
                    self.fetcher.start_periodic_refresh(self.settings.fetch_ttl);
                }

                *state = ControllerState::Started;
                info!(interval_secs = tick_interval.as_secs(), "pool controller started");
                Ok(())
            }
        }
    }

    /// Stop reconciliation. No new ticks or retry attempts start; a tick
    /// already in progress finishes (its driver calls run to completion or
    /// time out on their own deadlines).
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state == ControllerState::Stopped {
                return;
            }
            *state = ControllerState::Stopped;
        }
        if let Some(tx) = self.shutdown.lock().expect("shutdown lock poisoned").take() {
            let _ = tx.send(true);
        }
        let handle = self.run_task.lock().expect("task lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.fetcher.close();
        info!("pool controller stopped");
    }

    /// One reconciliation pass: observe, plan, execute.
    async fn tick(&self) {
        let (pool_name, template) = {
            let config = self.pool_config.lock().expect("config lock poisoned");
            match config.as_ref() {
                Some(c) => (c.pool_name.clone(), c.provisioning_template.clone()),
                None => return,
            }
        };

        let observation = match self.fetcher.get(false).await {
            Ok(o) => o,
            Err(e) => {
                warn!(pool = %pool_name, error = %e, "failed to fetch pool observation");
                self.alerts.publish(Alert::new(
                    AlertTopic::PoolFetch,
                    format!("failed to fetch pool observation: {e}"),
                ));
                return;
            }
        };

        let now = epoch_secs();
        let plan = self.plan(&pool_name, &observation, now);

        if !plan.scheduled.is_empty() {
            info!(
                pool = %pool_name,
                victims = ?plan.scheduled,
                strategy = self.strategy.name(),
                "scale-in: scheduled terminations"
            );
            self.alerts.publish(Alert::new(
                AlertTopic::Resize,
                format!(
                    "scale-in: scheduled {} machine(s) for termination",
                    plan.scheduled.len()
                ),
            ));
        }
        if plan.cancelled > 0 {
            debug!(
                pool = %pool_name,
                cancelled = plan.cancelled,
                "desired size grew; cancelled most recent scheduled terminations"
            );
        }

        let mutated = plan.provision_count > 0 || !plan.due.is_empty();
        if plan.provision_count > 0 {
            self.provision(&pool_name, plan.provision_count, &template)
                .await;
        }
        if !plan.due.is_empty() {
            self.drain(&pool_name, plan.due).await;
        }

        // The tick just changed the pool; the next plan must not run
        // against the pre-mutation cache or it would redo this tick's work.
        if mutated {
            self.refresh_observation().await;
        }
    }

    /// Classify the observation and decide this tick's actions. Runs
    /// entirely under the owner mutex; performs no driver calls.
    fn plan(&self, pool_name: &str, observation: &MachinePool, now: u64) -> TickPlan {
        let mut inner = self.inner.lock().expect("inner lock poisoned");
        let Inner {
            desired_size,
            queue,
            termination_failures,
        } = &mut *inner;

        // Entries whose machine vanished or is already shutting down no
        // longer need tracking.
        queue.retain_machines(|id| {
            observation
                .machine(id)
                .map(|m| m.machine_state.is_allocated())
                .unwrap_or(false)
        });
        termination_failures.retain(|id, _| queue.contains(id));

        let active: Vec<Machine> = observation
            .machines
            .iter()
            .filter(|m| m.is_active() && !queue.contains(&m.id))
            .cloned()
            .collect();
        let draining = queue.len();
        let total = active.len() + draining;

        let desired = match *desired_size {
            Some(d) => d as usize,
            None => {
                // No explicit or persisted target yet: adopt the observed size.
                info!(pool = %pool_name, size = total, "initial desired size adopted from observation");
                *desired_size = Some(total as u64);
                if let Err(e) = self.store.save_desired_size(pool_name, total as u64) {
                    warn!(error = %e, "failed to persist desired size");
                }
                total
            }
        };

        let surplus = total.saturating_sub(desired);

        // Desired size grew since the surplus was scheduled: un-schedule the
        // most recently scheduled entries first, minimizing churn.
        let mut cancelled = 0;
        while queue.len() > surplus {
            match queue.cancel_most_recent() {
                Some(id) => {
                    termination_failures.remove(&id);
                    cancelled += 1;
                }
                None => break,
            }
        }

        // Remaining surplus needs fresh victims.
        let mut scheduled = Vec::new();
        if surplus > queue.len() {
            let count = (surplus - queue.len()).min(active.len());
            if count > 0 {
                match self.strategy.select_victims(&active, count) {
                    Ok(victims) => {
                        let due_at = now + self.settings.termination_delay.as_secs();
                        for victim in victims {
                            queue.schedule(victim.id.clone(), due_at);
                            scheduled.push(victim.id);
                        }
                    }
                    Err(e) => warn!(error = %e, "victim selection failed"),
                }
            }
        }

        let shortfall = desired.saturating_sub(total);
        TickPlan {
            provision_count: shortfall as u32,
            scheduled,
            cancelled,
            due: queue.due_by(now),
        }
    }

    /// Request machines from the driver under bounded retry. Failure leaves
    /// the gap for the next tick; a tick never blocks on provisioning
    /// beyond its retry budget.
    async fn provision(&self, pool_name: &str, count: u32, template: &Value) {
        let driver = self.driver.clone();
        let timeout = self.settings.call_timeout;
        let template = template.clone();
        let outcome = self
            .retryer("provision")
            .run(
                move || {
                    let driver = driver.clone();
                    let template = template.clone();
                    async move {
                        match tokio::time::timeout(timeout, driver.provision(count, &template))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(DriverError::Transient(format!(
                                "provision timed out after {timeout:?}"
                            ))),
                        }
                    }
                },
                DriverError::is_transient,
            )
            .await;

        match outcome {
            Ok(machines) => {
                info!(
                    pool = %pool_name,
                    requested = count,
                    granted = machines.len(),
                    "scale-out: provisioning requested"
                );
                if (machines.len() as u32) < count {
                    debug!(
                        pool = %pool_name,
                        "provider granted fewer machines than requested; remainder handled next tick"
                    );
                }
                self.alerts.publish(Alert::new(
                    AlertTopic::Resize,
                    format!("scale-out: requested {count} machine(s)"),
                ));
            }
            Err(e) => {
                warn!(pool = %pool_name, error = %e, "scale-out failed");
                self.alerts.publish(Alert::new(
                    AlertTopic::Resize,
                    format!("scale-out of {count} machine(s) failed: {e}"),
                ));
            }
        }
    }

    /// Terminate every due entry via the bounded worker pool. Failures keep
    /// their entry for the next tick.
    async fn drain(&self, pool_name: &str, due: Vec<ScheduledTermination>) {
        let mut handles = Vec::with_capacity(due.len());
        for entry in due {
            let driver = self.driver.clone();
            let workers = self.workers.clone();
            let retryer = self.retryer("terminate");
            let timeout = self.settings.call_timeout;
            let id = entry.machine_id;
            handles.push(tokio::spawn(async move {
                let _permit = match workers.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (id, Err(RetryError::Cancelled { attempts: 0 })),
                };
                let call_id = id.clone();
                let result = retryer
                    .run(
                        move || {
                            let driver = driver.clone();
                            let call_id = call_id.clone();
                            async move {
                                match tokio::time::timeout(timeout, driver.terminate(&call_id))
                                    .await
                                {
                                    Ok(result) => result,
                                    Err(_) => Err(DriverError::Transient(format!(
                                        "terminate timed out after {timeout:?}"
                                    ))),
                                }
                            }
                        },
                        DriverError::is_transient,
                    )
                    .await;
                (id, result)
            }));
        }

        for handle in handles {
            let Ok((id, result)) = handle.await else {
                continue;
            };
            match result {
                Ok(()) => self.finish_termination(pool_name, &id),
                Err(RetryError::Permanent(DriverError::NotFound(_))) => {
                    debug!(pool = %pool_name, machine_id = %id, "machine already gone");
                    self.finish_termination(pool_name, &id);
                }
                Err(e) => self.record_termination_failure(pool_name, &id, &e.to_string()),
            }
        }
    }

    fn finish_termination(&self, pool_name: &str, machine_id: &str) {
        let mut inner = self.inner.lock().expect("inner lock poisoned");
        inner.queue.cancel(machine_id);
        inner.termination_failures.remove(machine_id);
        drop(inner);
        info!(pool = %pool_name, %machine_id, "machine terminated");
    }

    fn record_termination_failure(&self, pool_name: &str, machine_id: &str, error: &str) {
        let failures = {
            let mut inner = self.inner.lock().expect("inner lock poisoned");
            let count = inner
                .termination_failures
                .entry(machine_id.to_string())
                .and_modify(|c| *c += 1)
                .or_insert(1);
            *count
        };
        warn!(pool = %pool_name, %machine_id, failures, error, "termination failed, entry kept for next tick");
        let threshold = self.settings.termination_alert_threshold.max(1);
        if failures % threshold == 0 {
            self.alerts.publish(Alert::new(
                AlertTopic::Termination,
                format!("termination of {machine_id} failed {failures} consecutive time(s): {error}"),
            ));
        }
    }

    fn retryer(&self, name: &str) -> Retryer {
        let retryer = Retryer::new(name, self.settings.max_attempts, self.settings.retry_delay);
        match self
            .cancel_rx
            .lock()
            .expect("cancel lock poisoned")
            .as_ref()
        {
            Some(rx) => retryer.with_cancel(rx.clone()),
            None => retryer,
        }
    }

    fn ensure_usable(&self) -> PoolResult<()> {
        match *self.state.lock().expect("state lock poisoned") {
            ControllerState::Stopped => Err(PoolError::Stopped),
            ControllerState::Unconfigured => Err(PoolError::NotConfigured),
            _ => Ok(()),
        }
    }

    fn pool_name(&self) -> Option<String> {
        self.pool_config
            .lock()
            .expect("config lock poisoned")
            .as_ref()
            .map(|c| c.pool_name.clone())
    }

    /// Persist the desired size, best effort: a failed save degrades
    /// durability, not reconciliation.
    fn persist_desired_size(&self, size: u64) {
        if let Some(pool_name) = self.pool_name() {
            if let Err(e) = self.store.save_desired_size(&pool_name, size) {
                warn!(error = %e, "failed to persist desired size");
            }
        }
    }

    /// Refresh the cached observation after a pool mutation, best effort.
    async fn refresh_observation(&self) {
        if let Err(e) = self.fetcher.get(true).await {
            debug!(error = %e, "post-mutation refresh failed");
        }
    }

    fn map_retry(err: RetryError<DriverError>) -> PoolError {
        match err {
            RetryError::Permanent(e) => e.into(),
            RetryError::LimitExceeded {
                attempts,
                last_error,
            } => PoolError::RetryLimitExceeded {
                attempts,
                last_error: last_error.to_string(),
            },
            RetryError::Cancelled { .. } => PoolError::Stopped,
            RetryError::UnmetPredicate { .. } => {
                PoolError::Driver("retry predicate rejected every result".into())
            }
        }
    }

    /// Run a single driver call under retry with the per-call deadline.
    async fn driver_call<T, F, Fut>(&self, name: &str, mut op: F) -> PoolResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let timeout = self.settings.call_timeout;
        self.retryer(name)
            .run(
                || {
                    let fut = op();
                    async move {
                        match tokio::time::timeout(timeout, fut).await {
                            Ok(result) => result,
                            Err(_) => Err(DriverError::Transient(format!(
                                "{name} timed out after {timeout:?}"
                            ))),
                        }
                    }
                },
                DriverError::is_transient,
            )
            .await
            .map_err(Self::map_retry)
    }
}

impl<D: CloudPoolDriver> CloudPool for PoolController<D> {
    async fn get_machine_pool(&self) -> PoolResult<MachinePool> {
        self.ensure_usable()?;
        self.fetcher.get(false).await
    }

    async fn get_pool_size(&self) -> PoolResult<PoolSizeSummary> {
        self.ensure_usable()?;
        let observation = self.fetcher.get(false).await?;
        let desired = {
            let inner = self.inner.lock().expect("inner lock poisoned");
            inner
                .desired_size
                .unwrap_or_else(|| observation.active().count() as u64)
        };
        Ok(observation.size_summary(desired))
    }

    async fn set_desired_size(&self, size: i64) -> PoolResult<()> {
        if size < 0 {
            return Err(PoolError::InvalidArgument(format!(
                "desired size must be non-negative, got {size}"
            )));
        }
        self.ensure_usable()?;
        let size = size as u64;
        {
            let mut inner = self.inner.lock().expect("inner lock poisoned");
            inner.desired_size = Some(size);
        }
        self.persist_desired_size(size);
        info!(size, "desired size updated");
        self.tick_notify.notify_one();
        Ok(())
    }

    async fn terminate_machine(
        &self,
        machine_id: &str,
        decrement_desired_size: bool,
    ) -> PoolResult<()> {
        self.ensure_usable()?;
        let observation = self.fetcher.get(false).await?;
        if observation.machine(machine_id).is_none() {
            return Err(PoolError::NotFound(machine_id.to_string()));
        }

        let new_desired = {
            let mut inner = self.inner.lock().expect("inner lock poisoned");
            inner.queue.cancel(machine_id);
            inner.termination_failures.remove(machine_id);
            if decrement_desired_size {
                // Lower the target first so the next tick does not replace
                // the machine.
                let lowered = inner.desired_size.map(|d| d.saturating_sub(1));
                inner.desired_size = lowered;
                lowered
            } else {
                None
            }
        };
        if let Some(size) = new_desired {
            self.persist_desired_size(size);
        }

        self.driver_call("terminate", || self.driver.terminate(machine_id))
            .await?;
        info!(%machine_id, decrement_desired_size, "machine terminated on request");
        self.alerts.publish(Alert::new(
            AlertTopic::Resize,
            format!("machine {machine_id} terminated on request"),
        ));
        self.refresh_observation().await;
        self.tick_notify.notify_one();
        Ok(())
    }

    async fn attach_machine(&self, machine_id: &str) -> PoolResult<()> {
        self.ensure_usable()?;
        let tags =
            HashMap::from([(MEMBERSHIP_STATUS_TAG.to_string(), "active".to_string())]);
        self.driver_call("attach", || self.driver.tag(machine_id, &tags))
            .await?;

        // The new member raises capacity; grow the target along with it so
        // the next tick does not scale the pool back in.
        let new_desired = {
            let mut inner = self.inner.lock().expect("inner lock poisoned");
            let grown = inner.desired_size.map(|d| d + 1);
            inner.desired_size = grown;
            grown
        };
        if let Some(size) = new_desired {
            self.persist_desired_size(size);
        }
        info!(%machine_id, "machine attached");
        self.refresh_observation().await;
        self.tick_notify.notify_one();
        Ok(())
    }

    async fn detach_machine(
        &self,
        machine_id: &str,
        decrement_desired_size: bool,
    ) -> PoolResult<()> {
        self.ensure_usable()?;
        let observation = self.fetcher.get(false).await?;
        if observation.machine(machine_id).is_none() {
            return Err(PoolError::NotFound(machine_id.to_string()));
        }

        let new_desired = {
            let mut inner = self.inner.lock().expect("inner lock poisoned");
            inner.queue.cancel(machine_id);
            inner.termination_failures.remove(machine_id);
            if decrement_desired_size {
                let lowered = inner.desired_size.map(|d| d.saturating_sub(1));
                inner.desired_size = lowered;
                lowered
            } else {
                None
            }
        };
        if let Some(size) = new_desired {
            self.persist_desired_size(size);
        }

        let tag_keys = vec![MEMBERSHIP_STATUS_TAG.to_string()];
        self.driver_call("detach", || self.driver.untag(machine_id, &tag_keys))
            .await?;
        info!(%machine_id, decrement_desired_size, "machine detached");
        self.refresh_observation().await;
        self.tick_notify.notify_one();
        Ok(())
    }

    async fn set_service_state(&self, machine_id: &str, state: ServiceState) -> PoolResult<()> {
        self.ensure_usable()?;
        let observation = self.fetcher.get(false).await?;
        if observation.machine(machine_id).is_none() {
            return Err(PoolError::NotFound(machine_id.to_string()));
        }

        self.driver_call("set-service-state", || {
            self.driver.set_service_state(machine_id, state)
        })
        .await?;
        info!(%machine_id, ?state, "service state recorded");
        self.alerts.publish(Alert::new(
            AlertTopic::ServiceState,
            format!("service state of {machine_id} set to {state:?}"),
        ));
        self.refresh_observation().await;
        Ok(())
    }
}
