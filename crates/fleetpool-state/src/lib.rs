//! fleetpool-state — persisted pool state.
//!
//! The only thing the controller persists across restarts is the desired
//! size of each pool. Values are JSON-serialized into a redb table; the
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

pub mod error;
pub mod store;

pub use error::{StateError, StateResult};
pub use store::{DesiredSizeRecord, StateStore};
