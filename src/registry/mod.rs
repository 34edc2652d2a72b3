//! Registry session: registration, heartbeats, signal dispatch, shutdown.

mod client;
mod hooks;
mod types;

pub use client::{RegistryClient, RegistryClientBuilder};
pub use hooks::{ConfigUpdateHook, DrainHook};
pub use types::{
    decode_envelope, ApiResponse, ConfigUpdate, HeartbeatRequest, HeartbeatResponse,
    RegisterOptions, RegisterRequest, RegisterResponse, RegistrationIdentity, ShutdownRequest,
    ShutdownResponse,
};
