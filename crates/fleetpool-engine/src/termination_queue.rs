//! Time-ordered schedule of pending terminations.
//!
//! At most one entry exists per machine; re-scheduling replaces the entry
//! and makes it the most recently scheduled one. The queue is not
//! internally synchronized — the controller's single logical owner
//! serializes access against direct API calls.

use fleet_core::MachineId;

/// A single pending termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTermination {
    pub machine_id: MachineId,
    /// Unix timestamp (seconds) at which the machine becomes due.
    pub due_at: u64,
    /// Scheduling order, for LIFO cancellation.
    seq: u64,
}

/// Idempotent, due-time-ordered termination schedule.
#[derive(Debug, Default)]
pub struct TerminationQueue {
    entries: Vec<ScheduledTermination>,
    next_seq: u64,
}

impl TerminationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule (or re-schedule) a machine for termination at `due_at`.
    /// Replaces any existing entry for the same machine, which then counts
    /// as the most recently scheduled one.
    pub fn schedule(&mut self, machine_id: impl Into<MachineId>, due_at: u64) {
        let machine_id = machine_id.into();
        self.entries.retain(|e| e.machine_id != machine_id);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(ScheduledTermination {
            machine_id,
            due_at,
            seq,
        });
    }

    /// Remove a machine's entry. Returns true if one existed.
    pub fn cancel(&mut self, machine_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.machine_id != machine_id);
        self.entries.len() < before
    }

    /// Remove the most recently scheduled entry and return its machine id.
    pub fn cancel_most_recent(&mut self) -> Option<MachineId> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| e.seq)
            .map(|(i, _)| i)?;
        Some(self.entries.swap_remove(idx).machine_id)
    }

    /// All entries with `due_at <= now`, ascending by due time (scheduling
    /// order breaks ties).
    pub fn due_by(&self, now: u64) -> Vec<ScheduledTermination> {
        let mut due: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.due_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|e| (e.due_at, e.seq));
        due
    }

    pub fn contains(&self, machine_id: &str) -> bool {
        self.entries.iter().any(|e| e.machine_id == machine_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of all scheduled machines, in scheduling order.
    pub fn machine_ids(&self) -> Vec<MachineId> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|e| e.seq);
        entries.iter().map(|e| e.machine_id.clone()).collect()
    }

    /// Drop entries whose machine id fails the predicate (machines that
    /// vanished from the observation or already terminate on their own).
    pub fn retain_machines(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|e| keep(&e.machine_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_and_due() {
        let mut queue = TerminationQueue::new();
        queue.schedule("i-1", 100);
        queue.schedule("i-2", 50);
        queue.schedule("i-3", 200);

        let due = queue.due_by(100);
        assert_eq!(
            due.iter().map(|e| e.machine_id.as_str()).collect::<Vec<_>>(),
            vec!["i-2", "i-1"]
        );
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn reschedule_replaces_entry() {
        let mut queue = TerminationQueue::new();
        queue.schedule("i-1", 100);
        queue.schedule("i-1", 500);

        assert_eq!(queue.len(), 1);
        assert!(queue.due_by(100).is_empty());
        let due = queue.due_by(500);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].due_at, 500);
    }

    #[test]
    fn cancel_removes_entry() {
        let mut queue = TerminationQueue::new();
        queue.schedule("i-1", 100);
        assert!(queue.cancel("i-1"));
        assert!(!queue.cancel("i-1"));
        assert!(queue.is_empty());
    }

    #[test]
    fn cancel_most_recent_is_lifo() {
        let mut queue = TerminationQueue::new();
        queue.schedule("i-1", 100);
        queue.schedule("i-2", 100);
        queue.schedule("i-3", 100);

        assert_eq!(queue.cancel_most_recent().as_deref(), Some("i-3"));
        assert_eq!(queue.cancel_most_recent().as_deref(), Some("i-2"));
        assert_eq!(queue.cancel_most_recent().as_deref(), Some("i-1"));
        assert_eq!(queue.cancel_most_recent(), None);
    }

    #[test]
    fn rescheduling_makes_entry_most_recent() {
        let mut queue = TerminationQueue::new();
        queue.schedule("i-1", 100);
        queue.schedule("i-2", 100);
        queue.schedule("i-1", 100);

        assert_eq!(queue.cancel_most_recent().as_deref(), Some("i-1"));
        assert_eq!(queue.cancel_most_recent().as_deref(), Some("i-2"));
    }

    #[test]
    fn due_ties_preserve_scheduling_order() {
        let mut queue = TerminationQueue::new();
        queue.schedule("i-2", 100);
        queue.schedule("i-1", 100);

        let due = queue.due_by(100);
        assert_eq!(
            due.iter().map(|e| e.machine_id.as_str()).collect::<Vec<_>>(),
            vec!["i-2", "i-1"]
        );
    }

    #[test]
    fn retain_machines_prunes_vanished() {
        let mut queue = TerminationQueue::new();
        queue.schedule("i-1", 100);
        queue.schedule("i-2", 100);
        queue.retain_machines(|id| id == "i-2");

        assert!(!queue.contains("i-1"));
        assert!(queue.contains("i-2"));
    }
}
