//! Heartbeat loop - periodic liveness reports to the registry.

mod counters;
mod guard;
mod service;

pub use counters::{HeartbeatOverrides, LoadCounters, LoadSnapshot};
pub use guard::HeartbeatGuard;
pub use service::{HeartbeatLoop, HeartbeatSource, LoopState, LoopStats, MIN_HEARTBEAT_INTERVAL};
