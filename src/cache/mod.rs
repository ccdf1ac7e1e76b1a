//! Offline caching of network responses.
//!
//! This module intercepts outgoing requests and:
//! - Serves API reads network-first, falling back to the last stored copy or
//!   an offline placeholder
//! - Serves same-origin assets cache-first, populating on miss
//! - Passes everything else straight to the network
//! - Keeps responses in versioned generations, collecting stale ones when a
//!   new version activates

mod coordinator;
mod key;
mod layer;
mod registry;
mod result;
mod storage;

pub use coordinator::{
  BackgroundSync, CacheCoordinator, CoordinatorSettings, WorkerState, BACKGROUND_SYNC_TAG,
};
pub use registry::{CacheRegistry, CacheRole};
pub use result::CacheSource;
pub use storage::{CacheStorage, SqliteStorage};
