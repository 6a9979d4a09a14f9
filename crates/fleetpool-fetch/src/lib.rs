//! fleetpool-fetch — cached pool observations.
//!
//! The `PoolFetcher` owns the authoritative, time-stamped view of the live
//! machines in a pool. Reads within the staleness threshold are served from
//! cache without touching the (often rate-limited) provider listing API;
//! refreshes are single-flight, so any number of concurrent callers produce
//! at most one outstanding driver call.

pub mod fetcher;

pub use fetcher::PoolFetcher;
