//! fleet-core — shared domain model for the FleetPool controller.
//!
//! This crate defines everything the pool-management crates agree on:
//!
//! - **`machine`** — `Machine`, `MachinePool`, and the lifecycle enums
//! - **`driver`** — the `CloudPoolDriver` contract a provider adapter implements
//! - **`pool`** — the `CloudPool` API surface consumed by REST/autoscaler callers
//! - **`config`** — pool configuration (identity, API settings, provisioning template)
//! - **`alert`** — the fire-and-forget alert sink
//! - **`error`** — the shared error taxonomy
//!
//! # Architecture
//!
//! ```text
//! caller (REST / autoscaler)
//!   └── CloudPool (pool.rs)
//!         └── PoolController / Splitter (downstream crates)
//!               └── CloudPoolDriver (driver.rs)
//!                     └── provider SDK (out of scope)
//! ```

pub mod alert;
pub mod config;
pub mod driver;
pub mod error;
pub mod machine;
pub mod pool;
pub mod time;

pub use alert::{Alert, AlertSink, AlertTopic, ChannelSink, LogSink};
pub use config::PoolConfig;
pub use driver::{CloudPoolDriver, DriverError, DriverResult, MEMBERSHIP_STATUS_TAG, SERVICE_STATE_TAG};
pub use error::{PoolError, PoolResult};
pub use machine::{
    Machine, MachineId, MachinePool, MachineState, MembershipStatus, PoolSizeSummary,
    ServiceState,
};
pub use pool::CloudPool;
pub use time::epoch_secs;
