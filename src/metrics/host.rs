//! Hostname and IP resolution for registration.

use std::net::IpAddr;

use tracing::debug;

use crate::error::{RegistryError, Result};

/// The local machine's hostname.
pub fn local_hostname() -> Result<String> {
    hostname::get()
        .map_err(|e| RegistryError::Resolve(format!("Failed to read hostname: {}", e)))?
        .into_string()
        .map_err(|raw| RegistryError::Resolve(format!("Hostname is not valid UTF-8: {:?}", raw)))
}

/// Resolve `hostname` to an address, preferring IPv4.
///
/// A literal IP address is returned as-is without a lookup.
pub async fn resolve_ip(hostname: &str) -> Result<IpAddr> {
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs: Vec<IpAddr> = tokio::net::lookup_host((hostname, 0))
        .await
        .map_err(|e| RegistryError::Resolve(format!("Failed to resolve '{}': {}", hostname, e)))?
        .map(|addr| addr.ip())
        .collect();

    let ip = addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| RegistryError::Resolve(format!("No addresses for '{}'", hostname)))?;

    debug!("Resolved {} to {}", hostname, ip);
    Ok(ip)
}
