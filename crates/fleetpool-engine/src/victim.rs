//! Scale-in victim selection.
//!
//! Strategies are stateless, side-effect-free values injected into the
//! controller; no global singleton state. Each returns an ordered subset of
//! the candidates to terminate.

use fleet_core::{epoch_secs, Machine, PoolError, PoolResult};

const SECS_PER_HOUR: u64 = 3600;

/// Pure policy choosing which machines to terminate during scale-in.
pub trait VictimSelectionStrategy: Send + Sync {
    /// Name of the strategy, for logging.
    fn name(&self) -> &'static str;

    /// Select `count` victims from `candidates`, in termination order.
    ///
    /// Fails with `InvalidArgument` when `candidates` is empty or `count`
    /// exceeds the candidate set.
    fn select_victims(&self, candidates: &[Machine], count: usize) -> PoolResult<Vec<Machine>>;
}

fn check_args(candidates: &[Machine], count: usize) -> PoolResult<()> {
    if candidates.is_empty() {
        return Err(PoolError::InvalidArgument(
            "no termination candidates given".into(),
        ));
    }
    if count > candidates.len() {
        return Err(PoolError::InvalidArgument(format!(
            "cannot select {count} victims from {} candidates",
            candidates.len()
        )));
    }
    Ok(())
}

/// Prefers machines closest to completing a whole billing hour: the ones
/// about to lose a "free" partial hour go first. Ties are broken by earlier
/// launch time, for determinism. Machines that never reported a launch time
/// sort last.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClosestToBillingBoundary;

impl ClosestToBillingBoundary {
    /// Seconds remaining until the machine's next whole-hour mark.
    fn remaining(machine: &Machine, now: u64) -> u64 {
        match machine.launch_time {
            Some(launch) => {
                let elapsed = now.saturating_sub(launch);
                SECS_PER_HOUR - (elapsed % SECS_PER_HOUR)
            }
            None => u64::MAX,
        }
    }
}

impl VictimSelectionStrategy for ClosestToBillingBoundary {
    fn name(&self) -> &'static str {
        "closest-to-billing-boundary"
    }

    fn select_victims(&self, candidates: &[Machine], count: usize) -> PoolResult<Vec<Machine>> {
        check_args(candidates, count)?;
        let now = epoch_secs();
        let mut ordered: Vec<&Machine> = candidates.iter().collect();
        ordered.sort_by_key(|m| {
            (
                Self::remaining(m, now),
                m.launch_time.unwrap_or(u64::MAX),
                m.id.clone(),
            )
        });
        Ok(ordered.into_iter().take(count).cloned().collect())
    }
}

/// Terminates the longest-running machines first. Machines without a launch
/// time count as oldest.
#[derive(Debug, Default, Clone, Copy)]
pub struct OldestFirst;

impl VictimSelectionStrategy for OldestFirst {
    fn name(&self) -> &'static str {
        "oldest-first"
    }

    fn select_victims(&self, candidates: &[Machine], count: usize) -> PoolResult<Vec<Machine>> {
        check_args(candidates, count)?;
        let mut ordered: Vec<&Machine> = candidates.iter().collect();
        ordered.sort_by_key(|m| (m.launch_time.unwrap_or(0), m.id.clone()));
        Ok(ordered.into_iter().take(count).cloned().collect())
    }
}

/// Terminates the most recently launched machines first. Machines without a
/// launch time sort last.
#[derive(Debug, Default, Clone, Copy)]
pub struct NewestFirst;

impl VictimSelectionStrategy for NewestFirst {
    fn name(&self) -> &'static str {
        "newest-first"
    }

    fn select_victims(&self, candidates: &[Machine], count: usize) -> PoolResult<Vec<Machine>> {
        check_args(candidates, count)?;
        let mut ordered: Vec<&Machine> = candidates.iter().collect();
        ordered.sort_by_key(|m| {
            (
                std::cmp::Reverse(m.launch_time.unwrap_or(0)),
                m.id.clone(),
            )
        });
        Ok(ordered.into_iter().take(count).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::MachineState;

    fn machine(id: &str, launch_time: Option<u64>) -> Machine {
        let mut m = Machine::new(id, MachineState::Running);
        m.launch_time = launch_time;
        m
    }

    #[test]
    fn empty_candidates_are_rejected() {
        let strategy = ClosestToBillingBoundary;
        assert!(matches!(
            strategy.select_victims(&[], 1),
            Err(PoolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn count_beyond_candidates_is_rejected() {
        let strategy = ClosestToBillingBoundary;
        let candidates = vec![machine("i-1", Some(1000))];
        assert!(matches!(
            strategy.select_victims(&candidates, 2),
            Err(PoolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn billing_boundary_prefers_machine_closest_to_hour_mark() {
        let now = epoch_secs();
        // i-1 is 55 minutes into its hour (5 minutes remaining),
        // i-2 is 10 minutes into its hour (50 minutes remaining).
        let candidates = vec![
            machine("i-2", Some(now - 600)),
            machine("i-1", Some(now - 3300)),
        ];

        let strategy = ClosestToBillingBoundary;
        let victims = strategy.select_victims(&candidates, 1).unwrap();
        assert_eq!(victims[0].id, "i-1");
    }

    #[test]
    fn billing_boundary_breaks_ties_by_earlier_launch() {
        let now = epoch_secs();
        // Both are 30 minutes into their hour, but i-old launched earlier.
        let candidates = vec![
            machine("i-new", Some(now - 1800)),
            machine("i-old", Some(now - 1800 - 2 * 3600)),
        ];

        let strategy = ClosestToBillingBoundary;
        let victims = strategy.select_victims(&candidates, 2).unwrap();
        assert_eq!(victims[0].id, "i-old");
        assert_eq!(victims[1].id, "i-new");
    }

    #[test]
    fn billing_boundary_sorts_unknown_launch_last() {
        let now = epoch_secs();
        let candidates = vec![
            machine("i-unknown", None),
            machine("i-known", Some(now - 600)),
        ];

        let strategy = ClosestToBillingBoundary;
        let victims = strategy.select_victims(&candidates, 2).unwrap();
        assert_eq!(victims[0].id, "i-known");
        assert_eq!(victims[1].id, "i-unknown");
    }

    #[test]
    fn oldest_first_orders_by_launch_time() {
        let candidates = vec![
            machine("i-2", Some(2000)),
            machine("i-1", Some(1000)),
            machine("i-3", Some(3000)),
        ];

        let strategy = OldestFirst;
        let victims = strategy.select_victims(&candidates, 2).unwrap();
        assert_eq!(victims[0].id, "i-1");
        assert_eq!(victims[1].id, "i-2");
    }

    #[test]
    fn newest_first_orders_by_reverse_launch_time() {
        let candidates = vec![
            machine("i-2", Some(2000)),
            machine("i-1", Some(1000)),
            machine("i-3", Some(3000)),
        ];

        let strategy = NewestFirst;
        let victims = strategy.select_victims(&candidates, 2).unwrap();
        assert_eq!(victims[0].id, "i-3");
        assert_eq!(victims[1].id, "i-2");
    }

    #[test]
    fn selection_is_deterministic() {
        let now = epoch_secs();
        let candidates = vec![
            machine("i-1", Some(now - 600)),
            machine("i-2", Some(now - 1200)),
            machine("i-3", Some(now - 1800)),
        ];

        let strategy = ClosestToBillingBoundary;
        let first = strategy.select_victims(&candidates, 2).unwrap();
        let second = strategy.select_victims(&candidates, 2).unwrap();
        assert_eq!(first, second);
    }
}
