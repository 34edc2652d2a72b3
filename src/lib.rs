//! Registry Agent - client-side agent for a central service registry
//!
//! Registers a service instance, keeps it alive with periodic heartbeats that
//! carry live resource metrics, reacts to signals the registry pushes back
//! (configuration updates, drain requests) and deregisters on shutdown.

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod metrics;
pub mod registry;
pub mod transport;

pub use config::{Capabilities, PerformanceSpec, RegistryConfig, ResourceSpec, ServiceProfile};
pub use error::{RegistryError, Result};
pub use heartbeat::{
    HeartbeatGuard, HeartbeatOverrides, LoadCounters, LoadSnapshot, LoopState, LoopStats,
};
pub use metrics::{MetricsProvider, StaticMetrics, SysinfoMetrics, SystemMetrics};
pub use registry::{
    ConfigUpdate, ConfigUpdateHook, DrainHook, HeartbeatResponse, RegisterOptions,
    RegistrationIdentity, RegistryClient, RegistryClientBuilder, ShutdownResponse,
};
pub use transport::{HttpTransport, Transport};
