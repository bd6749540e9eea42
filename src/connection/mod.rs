//! Connection management for a single brick link
//!
//! This module handles:
//! - open/close lifecycle and connection-state notifications
//! - the bounded write queue with stale-command eviction
//! - the stream driver with its inter-write throttle
//! - report fan-out to registered observers

mod driver;
mod manager;
mod observer;
mod queue;

pub use manager::{ConnectionConfig, ConnectionManager, DEFAULT_INTER_WRITE_DELAY};
pub use observer::{ConnectionObserver, ReportObserver};
pub use queue::{WriteQueue, DEFAULT_MAX_PENDING_WRITES};
