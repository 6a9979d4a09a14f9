//! The caching, single-flight pool fetcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use fleet_core::{epoch_secs, CloudPoolDriver, MachinePool, PoolError, PoolResult};

/// Cache contents plus refresh bookkeeping.
struct CacheState {
    /// Last successful observation. Its timestamp is the time the data was
    /// obtained from the driver, never the time it was served.
    cache: Option<MachinePool>,
    /// Outcome of the most recently completed refresh.
    last_outcome: Option<PoolResult<MachinePool>>,
    /// Bumped after every completed refresh, success or failure.
    generation: u64,
}

/// Cached, single-flight fetcher of pool observations.
///
/// `get(false)` serves the cache while it is younger than the staleness
/// threshold. A refresh (forced, or triggered by a stale/absent cache)
/// performs exactly one driver listing call regardless of how many callers
/// are waiting on it: late arrivals block on the refresh lock and then
/// observe the same outcome as the call that triggered the refresh.
pub struct PoolFetcher<D> {
    driver: Arc<D>,
    /// Cache entries older than this require a refresh.
    ttl: Duration,
    state: Mutex<CacheState>,
    /// Held for the duration of a driver listing call.
    refresh_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
    /// Periodic refresh task, when one was started.
    refresh_task: Mutex<Option<RefreshTask>>,
}

struct RefreshTask {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl<D: CloudPoolDriver> PoolFetcher<D> {
    /// A fetcher over the given driver with the given staleness threshold.
    pub fn new(driver: Arc<D>, ttl: Duration) -> Self {
        Self {
            driver,
            ttl,
            state: Mutex::new(CacheState {
                cache: None,
                last_outcome: None,
                generation: 0,
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            refresh_task: Mutex::new(None),
        }
    }

    /// The current pool observation.
    ///
    /// With `force_refresh` unset a sufficiently fresh cache is returned
    /// without any driver call. On a failed refresh the error propagates to
    /// every waiter of that refresh; non-forced callers holding a stale
    /// cache fall back to it instead, so an unreachable provider degrades
    /// reads to stale data rather than failing them.
    pub async fn get(&self, force_refresh: bool) -> PoolResult<MachinePool> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Stopped);
        }

        let observed_generation = {
            let state = self.state.lock().expect("fetcher state lock poisoned");
            if !force_refresh {
                if let Some(cache) = &state.cache {
                    if self.age_of(cache) < self.ttl {
                        return Ok(cache.clone());
                    }
                }
            }
            state.generation
        };

        // Single-flight: at most one driver listing call at a time.
        let _guard = self.refresh_lock.lock().await;

        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Stopped);
        }

        // A refresh may have completed while we waited for the lock; its
        // outcome is ours too.
        let shared = {
            let state = self.state.lock().expect("fetcher state lock poisoned");
            if state.generation > observed_generation {
                state.last_outcome.clone()
            } else {
                None
            }
        };
        let outcome = match shared {
            Some(outcome) => outcome,
            None => self.refresh().await,
        };

        match outcome {
            Ok(pool) => Ok(pool),
            Err(err) if !force_refresh => {
                // Serve the stale cache if we still have one.
                let state = self.state.lock().expect("fetcher state lock poisoned");
                match &state.cache {
                    Some(cache) => {
                        warn!(
                            age_secs = self.age_of(cache).as_secs(),
                            error = %err,
                            "refresh failed, serving stale observation"
                        );
                        Ok(cache.clone())
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Perform one driver listing call and record its outcome.
    async fn refresh(&self) -> PoolResult<MachinePool> {
        let result = self.driver.list_machines().await;
        let obtained_at = epoch_secs();

        let mut state = self.state.lock().expect("fetcher state lock poisoned");
        state.generation += 1;
        match result {
            Ok(machines) => {
                debug!(machines = machines.len(), "pool observation refreshed");
                let pool = MachinePool {
                    timestamp: obtained_at,
                    machines,
                };
                state.cache = Some(pool.clone());
                state.last_outcome = Some(Ok(pool.clone()));
                Ok(pool)
            }
            Err(e) => {
                // Cache is left untouched on failure.
                let err = PoolError::from(e);
                state.last_outcome = Some(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Start a background task refreshing the cache on a fixed interval.
    /// Replaces any previously started task. Stopped by `close()`.
    pub fn start_periodic_refresh(self: &Arc<Self>, interval: Duration) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let fetcher = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = fetcher.get(true).await {
                            debug!(error = %e, "periodic refresh failed");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        let mut task = self.refresh_task.lock().expect("refresh task lock poisoned");
        if let Some(old) = task.replace(RefreshTask {
            handle,
            shutdown_tx,
        }) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }
    }

    /// Stop serving and release the periodic refresh task. Idempotent;
    /// `get` calls after close fail with a terminal error.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut task = self.refresh_task.lock().expect("refresh task lock poisoned");
        if let Some(task) = task.take() {
            let _ = task.shutdown_tx.send(true);
            task.handle.abort();
        }
        debug!("pool fetcher closed");
    }

    fn age_of(&self, cache: &MachinePool) -> Duration {
        Duration::from_secs(epoch_secs().saturating_sub(cache.timestamp))
    }
}

impl<D> Drop for PoolFetcher<D> {
    fn drop(&mut self) {
        if let Ok(mut task) = self.refresh_task.lock() {
            if let Some(task) = task.take() {
                task.handle.abort();
            }
        }
    }
}
