//! Registry client.
//!
//! # Example
//!
//! ```rust,ignore
//! use registry_agent::{RegisterOptions, RegistryClient, RegistryConfig};
//!
//! let client = RegistryClient::new(RegistryConfig::from_env()?)?;
//! client.register("text_to_image", RegisterOptions::default()).await?;
//!
//! client
//!     .run_with_heartbeat(async {
//!         serve_requests().await;
//!     })
//!     .await?;
//!
//! client.shutdown("Service stopping").await?;
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::hooks::{ConfigUpdateHook, DrainHook, HookSlots};
use super::types::{
    decode_envelope, ConfigUpdate, HeartbeatRequest, HeartbeatResponse, RegisterOptions,
    RegisterRequest, RegisterResponse, RegistrationIdentity, ShutdownRequest, ShutdownResponse,
};
use crate::config::{Capabilities, PerformanceSpec, RegistryConfig, ResourceSpec, ServiceProfile};
use crate::error::{RegistryError, Result};
use crate::heartbeat::{
    HeartbeatGuard, HeartbeatLoop, HeartbeatOverrides, HeartbeatSource, LoadCounters, LoopState,
    LoopStats,
};
use crate::metrics::{host, MetricsProvider, SysinfoMetrics};
use crate::transport::{HttpTransport, Transport, HEARTBEAT_PATH, REGISTER_PATH, SHUTDOWN_PATH};

const DEFAULT_SERVICE_VERSION: &str = "1.0.0";

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`RegistryClient`].
pub struct RegistryClientBuilder {
    config: RegistryConfig,
    transport: Option<Arc<dyn Transport>>,
    metrics: Option<Arc<dyn MetricsProvider>>,
    profile: ServiceProfile,
    config_update_hook: Option<Arc<dyn ConfigUpdateHook>>,
    drain_hook: Option<Arc<dyn DrainHook>>,
}

impl RegistryClientBuilder {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            transport: None,
            metrics: None,
            profile: ServiceProfile::default(),
            config_update_hook: None,
            drain_hook: None,
        }
    }

    /// Use a custom transport instead of HTTP to `config.base_url`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom metrics provider instead of sampling the local host.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn profile(mut self, profile: ServiceProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.profile.capabilities = capabilities;
        self
    }

    pub fn resources(mut self, resources: ResourceSpec) -> Self {
        self.profile.resources = resources;
        self
    }

    pub fn performance(mut self, performance: PerformanceSpec) -> Self {
        self.profile.performance = performance;
        self
    }

    pub fn on_config_update(mut self, hook: Arc<dyn ConfigUpdateHook>) -> Self {
        self.config_update_hook = Some(hook);
        self
    }

    pub fn on_drain(mut self, hook: Arc<dyn DrainHook>) -> Self {
        self.drain_hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        self.config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config.base_url)?),
        };
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(SysinfoMetrics::new()));

        let hooks = HookSlots::default();
        hooks.set_config_update(self.config_update_hook);
        hooks.set_drain(self.drain_hook);

        let heartbeat = HeartbeatLoop::new(self.config.stop_timeout());

        Ok(RegistryClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                transport,
                metrics,
                profile: self.profile,
                identity: RwLock::new(None),
                hooks,
                counters: LoadCounters::new(),
                heartbeat,
            }),
        })
    }
}

// ============================================================================
// Client
// ============================================================================

struct ClientInner {
    config: RegistryConfig,
    transport: Arc<dyn Transport>,
    metrics: Arc<dyn MetricsProvider>,
    profile: ServiceProfile,
    identity: RwLock<Option<RegistrationIdentity>>,
    hooks: HookSlots,
    counters: LoadCounters,
    heartbeat: HeartbeatLoop,
}

/// Client for one service instance's registry session.
///
/// Cheap to clone; clones share the identity, counters, hooks and heartbeat
/// loop. The loop holds no strong reference, so dropping the last clone ends
/// it.
#[derive(Clone)]
pub struct RegistryClient {
    inner: Arc<ClientInner>,
}

impl RegistryClient {
    /// Client with HTTP transport and local metrics.
    pub fn new(config: RegistryConfig) -> Result<Self> {
        RegistryClientBuilder::new(config).build()
    }

    /// Client configured from the environment (see [`RegistryConfig::from_env`]).
    pub fn from_env() -> Result<Self> {
        Self::new(RegistryConfig::from_env()?)
    }

    pub fn builder(config: RegistryConfig) -> RegistryClientBuilder {
        RegistryClientBuilder::new(config)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn profile(&self) -> &ServiceProfile {
        &self.inner.profile
    }

    /// Workload counters reported with every heartbeat.
    pub fn counters(&self) -> &LoadCounters {
        &self.inner.counters
    }

    /// Identity from the last successful registration.
    pub async fn identity(&self) -> Option<RegistrationIdentity> {
        self.inner.identity.read().await.clone()
    }

    pub async fn is_registered(&self) -> bool {
        self.inner.identity.read().await.is_some()
    }

    pub fn set_config_update_hook(&self, hook: Arc<dyn ConfigUpdateHook>) {
        self.inner.hooks.set_config_update(Some(hook));
    }

    pub fn set_drain_hook(&self, hook: Arc<dyn DrainHook>) {
        self.inner.hooks.set_drain(Some(hook));
    }

    /// Remove both hooks, restoring the default signal handling.
    pub fn clear_hooks(&self) {
        self.inner.hooks.set_config_update(None);
        self.inner.hooks.set_drain(None);
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Register this instance with the registry.
    ///
    /// On success the returned identity replaces any previous one. On any
    /// failure the stored identity is left as it was. No retries.
    pub async fn register(
        &self,
        service_type: &str,
        options: RegisterOptions,
    ) -> Result<RegistrationIdentity> {
        let service_type = service_type.trim();
        if service_type.is_empty() {
            return Err(RegistryError::Config(
                "service_type must not be empty".to_string(),
            ));
        }

        let config = &self.inner.config;
        let hostname = match options.hostname.or_else(|| config.hostname.clone()) {
            Some(hostname) => hostname,
            None => host::local_hostname()?,
        };
        let ip_address = match options.ip_address.or_else(|| config.ip_address.clone()) {
            Some(ip) => ip,
            None => host::resolve_ip(&hostname).await?.to_string(),
        };

        let request = RegisterRequest {
            service_type: service_type.to_string(),
            version: options
                .version
                .unwrap_or_else(|| DEFAULT_SERVICE_VERSION.to_string()),
            hostname,
            ip_address,
            port: options.port.unwrap_or(config.port),
            capabilities: options
                .capabilities
                .unwrap_or_else(|| self.inner.profile.capabilities.clone()),
            resources: options
                .resources
                .unwrap_or_else(|| self.inner.profile.resources.clone()),
            performance: options
                .performance
                .unwrap_or_else(|| self.inner.profile.performance.clone()),
            extra: options.extra,
        };

        debug!(
            service_type = %request.service_type,
            hostname = %request.hostname,
            ip = %request.ip_address,
            "Registering service"
        );

        let body = serde_json::to_value(&request)?;
        let response = self
            .inner
            .transport
            .post_json(REGISTER_PATH, body, config.register_timeout())
            .await?;
        let data: RegisterResponse = decode_envelope(REGISTER_PATH, response)?;
        let identity = RegistrationIdentity::from(data);

        *self.inner.identity.write().await = Some(identity.clone());
        info!(
            service_id = %identity.service_id,
            heartbeat_interval = identity.heartbeat_interval,
            "Service registered"
        );
        Ok(identity)
    }

    // ------------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------------

    /// Send one heartbeat now and dispatch any signals in the response.
    ///
    /// Counters not set in `overrides` come from [`counters`](Self::counters).
    pub async fn heartbeat(&self, overrides: HeartbeatOverrides) -> Result<HeartbeatResponse> {
        let identity = self.identity().await.ok_or(RegistryError::NotRegistered)?;

        let metrics = self.inner.metrics.sample().await;
        let load = overrides.apply(self.inner.counters.snapshot());
        let request = HeartbeatRequest::new(&identity, &metrics, load, Utc::now());

        let body = serde_json::to_value(&request)?;
        let response = self
            .inner
            .transport
            .post_json(HEARTBEAT_PATH, body, self.inner.config.heartbeat_timeout())
            .await?;
        let response: HeartbeatResponse = decode_envelope(HEARTBEAT_PATH, response)?;

        if let Some(update) = response.config_update.as_ref().filter(|u| !u.is_empty()) {
            self.handle_config_update(update).await;
        }
        if response.drain_requested {
            self.handle_drain_request().await;
        }

        Ok(response)
    }

    async fn handle_config_update(&self, update: &ConfigUpdate) {
        let Some(hook) = self.inner.hooks.config_update() else {
            info!(
                "Config update received with no hook installed: {}",
                serde_json::Value::Object(update.clone())
            );
            return;
        };

        let outcome = AssertUnwindSafe(hook.on_config_update(update))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => debug!("Config update hook completed"),
            Ok(Err(e)) => warn!("Config update hook failed: {}", e),
            Err(_) => error!("Config update hook panicked"),
        }
    }

    async fn handle_drain_request(&self) {
        let Some(hook) = self.inner.hooks.drain() else {
            warn!("Drain requested, stopping heartbeat loop");
            self.stop_heartbeat_loop().await;
            return;
        };

        info!("Drain requested, invoking drain hook");
        let outcome = AssertUnwindSafe(hook.on_drain(self)).catch_unwind().await;
        match outcome {
            Ok(Ok(())) => debug!("Drain hook completed"),
            Ok(Err(e)) => warn!("Drain hook failed: {}", e),
            Err(_) => error!("Drain hook panicked"),
        }
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Deregister this instance. Does not stop the heartbeat loop.
    pub async fn shutdown(&self, reason: &str) -> Result<ShutdownResponse> {
        let identity = self.identity().await.ok_or(RegistryError::NotRegistered)?;

        let request = ShutdownRequest {
            service_id: identity.service_id,
            reason: reason.to_string(),
        };
        let body = serde_json::to_value(&request)?;
        let response = self
            .inner
            .transport
            .post_json(SHUTDOWN_PATH, body, self.inner.config.shutdown_timeout())
            .await?;
        let response: ShutdownResponse = decode_envelope(SHUTDOWN_PATH, response)?;

        info!(
            service_id = %request.service_id,
            grace_period_seconds = response.grace_period_seconds,
            "Service deregistered"
        );
        Ok(response)
    }

    // ------------------------------------------------------------------------
    // Heartbeat loop
    // ------------------------------------------------------------------------

    /// Start periodic heartbeats in the background.
    ///
    /// Returns `Ok(false)` if a loop is already running. Register first: the
    /// loop does not wait for an identity, it just logs "not registered"
    /// failures until one exists.
    pub fn start_heartbeat_loop(&self) -> Result<bool> {
        self.inner.heartbeat.start(Arc::downgrade(&self.inner))
    }

    /// Stop the heartbeat loop, waiting up to the configured stop timeout.
    pub async fn stop_heartbeat_loop(&self) -> bool {
        self.inner.heartbeat.stop().await
    }

    /// Signal the heartbeat loop to stop without waiting for it.
    pub fn request_heartbeat_stop(&self) -> bool {
        self.inner.heartbeat.request_stop()
    }

    pub fn heartbeat_state(&self) -> LoopState {
        self.inner.heartbeat.state()
    }

    pub fn heartbeat_stats(&self) -> LoopStats {
        self.inner.heartbeat.stats()
    }

    /// Start the loop and return a guard that stops it when the scope ends.
    ///
    /// If the loop was already running the guard does not own it and will
    /// not stop it.
    pub fn start_heartbeat_guarded(&self) -> Result<HeartbeatGuard> {
        let started = self.start_heartbeat_loop()?;
        Ok(HeartbeatGuard::new(self.clone(), started))
    }

    /// Run `work` with the heartbeat loop running, then stop the loop.
    ///
    /// The loop is stopped even if `work` panics. A loop that was already
    /// running before the call is left running.
    pub async fn run_with_heartbeat<F, T>(&self, work: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let guard = self.start_heartbeat_guarded()?;
        let output = work.await;
        guard.stop().await;
        Ok(output)
    }
}

#[async_trait]
impl HeartbeatSource for ClientInner {
    async fn beat(self: Arc<Self>) -> Result<()> {
        let client = RegistryClient { inner: self };
        client.heartbeat(HeartbeatOverrides::default()).await?;
        Ok(())
    }

    async fn interval(&self) -> Duration {
        let secs = self
            .identity
            .read()
            .await
            .as_ref()
            .map(|identity| identity.heartbeat_interval)
            .unwrap_or(self.config.default_heartbeat_interval_secs);
        Duration::from_secs(secs)
    }
}
