//! Registry agent configuration
//!
//! [`RegistryConfig`] holds the registry base URL, per-endpoint timeouts and
//! the host identity overrides used at registration. Values come from (in
//! increasing priority) built-in defaults, a `.env` file, and the process
//! environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `SERVICE_REGISTRY_URL` | `http://service-registry.ai-platform.svc.cluster.local:80` |
//! | `SERVICE_REGISTRY_REGISTER_TIMEOUT_SECS` | `10` |
//! | `SERVICE_REGISTRY_HEARTBEAT_TIMEOUT_SECS` | `5` |
//! | `SERVICE_REGISTRY_SHUTDOWN_TIMEOUT_SECS` | `5` |
//! | `SERVICE_REGISTRY_STOP_TIMEOUT_SECS` | `5` |
//! | `SERVICE_REGISTRY_DEFAULT_INTERVAL_SECS` | `30` |
//! | `SERVICE_HOSTNAME` | local hostname |
//! | `SERVICE_IP_ADDRESS` | resolved from hostname |
//! | `SERVICE_PORT` | `8080` |

mod profile;

pub use profile::{Capabilities, PerformanceSpec, ResourceSpec, ServiceProfile};

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RegistryError, Result};

/// In-cluster address of the registry service.
pub const DEFAULT_REGISTRY_URL: &str = "http://service-registry.ai-platform.svc.cluster.local:80";

pub const ENV_REGISTRY_URL: &str = "SERVICE_REGISTRY_URL";
pub const ENV_REGISTER_TIMEOUT: &str = "SERVICE_REGISTRY_REGISTER_TIMEOUT_SECS";
pub const ENV_HEARTBEAT_TIMEOUT: &str = "SERVICE_REGISTRY_HEARTBEAT_TIMEOUT_SECS";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "SERVICE_REGISTRY_SHUTDOWN_TIMEOUT_SECS";
pub const ENV_STOP_TIMEOUT: &str = "SERVICE_REGISTRY_STOP_TIMEOUT_SECS";
pub const ENV_DEFAULT_INTERVAL: &str = "SERVICE_REGISTRY_DEFAULT_INTERVAL_SECS";
pub const ENV_HOSTNAME: &str = "SERVICE_HOSTNAME";
pub const ENV_IP_ADDRESS: &str = "SERVICE_IP_ADDRESS";
pub const ENV_PORT: &str = "SERVICE_PORT";

/// Registry client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry base URL, without a trailing slash.
    pub base_url: String,
    /// Timeout for `POST /register`, in seconds.
    pub register_timeout_secs: u64,
    /// Timeout for `POST /heartbeat`, in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Timeout for `POST /shutdown`, in seconds.
    pub shutdown_timeout_secs: u64,
    /// Upper bound on how long `stop()` waits for the heartbeat task.
    pub stop_timeout_secs: u64,
    /// Heartbeat interval used until the registry assigns one.
    pub default_heartbeat_interval_secs: u64,
    /// Hostname override. `None` resolves the local hostname.
    pub hostname: Option<String>,
    /// IP address override. `None` resolves from the hostname.
    pub ip_address: Option<String>,
    /// Port the service listens on.
    pub port: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REGISTRY_URL.to_string(),
            register_timeout_secs: 10,
            heartbeat_timeout_secs: 5,
            shutdown_timeout_secs: 5,
            stop_timeout_secs: 5,
            default_heartbeat_interval_secs: 30,
            hostname: None,
            ip_address: None,
            port: 8080,
        }
    }
}

impl RegistryConfig {
    /// Config pointing at `base_url` with every other value defaulted.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            ..Self::default()
        }
    }

    /// Build config from the process environment, after loading `.env` from
    /// the working directory if one exists.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {:?}", path);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from a specific env file without touching the process
    /// environment. Variables missing from the file keep their defaults.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let vars = dotenvy::from_path_iter(path)
            .map_err(|e| RegistryError::Config(format!("Failed to read {:?}: {}", path, e)))?
            .collect::<std::result::Result<Vec<(String, String)>, _>>()
            .map_err(|e| RegistryError::Config(format!("Failed to parse {:?}: {}", path, e)))?;
        Self::from_lookup(|key| {
            vars.iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
        })
    }

    /// Build config from an arbitrary key lookup. Empty values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();
        if let Some(url) = get(ENV_REGISTRY_URL) {
            config.base_url = normalize_base_url(url);
        }
        if let Some(v) = get(ENV_REGISTER_TIMEOUT) {
            config.register_timeout_secs = parse_var(ENV_REGISTER_TIMEOUT, &v)?;
        }
        if let Some(v) = get(ENV_HEARTBEAT_TIMEOUT) {
            config.heartbeat_timeout_secs = parse_var(ENV_HEARTBEAT_TIMEOUT, &v)?;
        }
        if let Some(v) = get(ENV_SHUTDOWN_TIMEOUT) {
            config.shutdown_timeout_secs = parse_var(ENV_SHUTDOWN_TIMEOUT, &v)?;
        }
        if let Some(v) = get(ENV_STOP_TIMEOUT) {
            config.stop_timeout_secs = parse_var(ENV_STOP_TIMEOUT, &v)?;
        }
        if let Some(v) = get(ENV_DEFAULT_INTERVAL) {
            config.default_heartbeat_interval_secs = parse_var(ENV_DEFAULT_INTERVAL, &v)?;
        }
        config.hostname = get(ENV_HOSTNAME);
        config.ip_address = get(ENV_IP_ADDRESS);
        if let Some(v) = get(ENV_PORT) {
            config.port = parse_var(ENV_PORT, &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the client unusable.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(RegistryError::Config(format!(
                "Registry URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        for (name, secs) in [
            ("register timeout", self.register_timeout_secs),
            ("heartbeat timeout", self.heartbeat_timeout_secs),
            ("shutdown timeout", self.shutdown_timeout_secs),
            ("stop timeout", self.stop_timeout_secs),
        ] {
            if secs == 0 {
                return Err(RegistryError::Config(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }

    pub fn register_timeout(&self) -> Duration {
        Duration::from_secs(self.register_timeout_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| RegistryError::Config(format!("Invalid value '{}' for {}: {}", value, key, e)))
}
