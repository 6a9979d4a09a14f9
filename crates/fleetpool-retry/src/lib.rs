//! fleetpool-retry — generic bounded-retry execution.
//!
//! One retry combinator replaces a hierarchy of per-operation retry
//! handlers: a `Retryer` is parameterized by an attempt budget, a delay
//! policy, and per-call classifiers. It is used both for engine-level
//! provisioning/termination calls and for "wait until the provider reports
//! the machine as addressed" loops.
//!
//! ```text
//! attempt 1 ── Err(transient) ── sleep(policy) ── attempt 2 ── ... ── budget
//!          └── Err(permanent)  → Permanent(e), no further attempts
//!          └── Ok(v), accepted → Ok(v)
//! ```
//!
//! Cancellation interrupts the sleep between attempts but never aborts an
//! in-flight attempt.

pub mod retry;

pub use retry::{DelayPolicy, RetryError, Retryer};
