//! fleetpool-engine — the reconciliation engine.
//!
//! The `PoolController` continuously reconciles the live machine set toward
//! the desired size, on a fixed schedule plus on-demand triggers:
//!
//! ```text
//! tick:
//!   observation ── partition ──┬── shortfall → provision (bounded retry)
//!                              └── surplus   → select victims → schedule
//!   drain: due terminations → terminate (worker pool, per-call timeout)
//! ```
//!
//! # Components
//!
//! - **`controller`** — the tick loop, state machine, and `CloudPool` surface
//! - **`termination_queue`** — time-ordered schedule of pending terminations
//! - **`victim`** — pure scale-in victim-selection policies

pub mod controller;
pub mod termination_queue;
pub mod victim;

pub use controller::{ControllerSettings, PoolController};
pub use termination_queue::{ScheduledTermination, TerminationQueue};
pub use victim::{
    ClosestToBillingBoundary, NewestFirst, OldestFirst, VictimSelectionStrategy,
};
