//! Wall-clock helpers shared across the pool crates.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
