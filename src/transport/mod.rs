//! HTTP transport to the registry.
//!
//! The client talks to the registry only through the [`Transport`] trait, so
//! tests can substitute a scripted fake. [`HttpTransport`] is the production
//! implementation on top of `reqwest`.

mod http;

pub use http::HttpTransport;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Registration endpoint path.
pub const REGISTER_PATH: &str = "/api/v1/services/register";
/// Heartbeat endpoint path.
pub const HEARTBEAT_PATH: &str = "/api/v1/services/heartbeat";
/// Deregistration endpoint path.
pub const SHUTDOWN_PATH: &str = "/api/v1/services/shutdown";

/// Issues JSON POST requests to the registry.
///
/// Implementations must enforce `timeout` and return an error for transport
/// failures and non-2xx statuses. The returned value is the parsed response
/// body, envelope included.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, path: &str, body: Value, timeout: Duration) -> Result<Value>;
}
