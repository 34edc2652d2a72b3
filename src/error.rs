//! Error types for the registry agent
//!
//! Every fallible operation in the crate returns [`RegistryError`]. Uses
//! `thiserror` for `Display` and `Error` implementations.
//!
//! The variants are grouped by who is at fault:
//! - caller mistakes ([`RegistryError::NotRegistered`], [`RegistryError::Config`])
//! - the network ([`RegistryError::Http`], [`RegistryError::Timeout`])
//! - the registry ([`RegistryError::Status`], [`RegistryError::Rejected`],
//!   [`RegistryError::InvalidResponse`])

use std::time::Duration;

use thiserror::Error;

/// The primary error type for registry agent operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// `heartbeat` or `shutdown` called before a successful `register`.
    /// Raised before any I/O is attempted.
    #[error("Service not registered")]
    NotRegistered,

    /// Configuration errors (invalid env overrides, missing runtime, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Hostname or IP address resolution failed
    #[error("Resolve error: {0}")]
    Resolve(String),

    /// The request did not complete within its deadline
    #[error("Request to {path} timed out after {}s", timeout.as_secs_f64())]
    Timeout { path: String, timeout: Duration },

    /// HTTP transport errors (connection refused, TLS, body read, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx HTTP status from the registry
    #[error("Registry returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// HTTP 200 with a non-zero envelope code
    #[error("Registry rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error returned by a caller-supplied hook
    #[error("Hook error: {0}")]
    Hook(String),
}

impl RegistryError {
    /// Whether the error came from talking to the registry, as opposed to a
    /// caller-side precondition or configuration problem.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            RegistryError::Timeout { .. }
                | RegistryError::Http(_)
                | RegistryError::Status { .. }
                | RegistryError::Rejected { .. }
                | RegistryError::InvalidResponse(_)
        )
    }
}

/// A specialized `Result` type for registry agent operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
